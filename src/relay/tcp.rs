use crate::error::AppError;
use crate::listener::socket::create_tcp_listener;
use crate::listener::ListenerHandle;
use crate::mapping::{ForwardAddr, ListenerKey, Transport};
use crate::metrics::METRICS;
use crate::r#const::{error_labels, relay_limits};
use crate::relay::{next_flow_id, ActiveFlowGuard, FlowStats, RelaySettings};
use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// 转发流结束原因
#[derive(Debug)]
enum FlowEnd {
    // 双方正常关闭
    Completed,
    // 被强制关闭
    Cancelled,
    // 一方关闭后另一方未在时限内结束
    HalfCloseTimeout,
    // IO 错误
    Failed(io::Error),
}

/// 拨号后端，超时或失败均返回 `BackendUnreachable`
pub async fn connect_backend(
    target: &ForwardAddr,
    connect_timeout: Duration,
) -> Result<TcpStream, AppError> {
    match timeout(
        connect_timeout,
        TcpStream::connect((target.host(), target.port())),
    )
    .await
    {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY for backend {}: {}", target, e);
            }
            Ok(stream)
        }
        Ok(Err(e)) => Err(AppError::BackendUnreachable {
            target: target.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(AppError::BackendUnreachable {
            target: target.to_string(),
            reason: format!("connect timed out after {:?}", connect_timeout),
        }),
    }
}

/// 单方向搬运数据，读到 EOF 后关闭对端写方向
///
/// 上一次写完成之前不会继续读，缓冲区大小固定。
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    counter: &AtomicU64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.shutdown().await?;
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// 一个方向结束后，等待另一个方向在半关闭时限内结束
async fn finish_flow<F>(
    first: io::Result<()>,
    remaining: Pin<&mut F>,
    half_close_timeout: Duration,
    cancel: &CancellationToken,
) -> FlowEnd
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = first {
        return FlowEnd::Failed(e);
    }

    tokio::select! {
        _ = cancel.cancelled() => FlowEnd::Cancelled,
        result = timeout(half_close_timeout, remaining) => match result {
            Ok(Ok(())) => FlowEnd::Completed,
            Ok(Err(e)) => FlowEnd::Failed(e),
            Err(_) => FlowEnd::HalfCloseTimeout,
        },
    }
}

/// 在客户端与后端之间双向转发，返回时两个连接都已关闭
async fn relay_streams(
    mut client: TcpStream,
    mut backend: TcpStream,
    stats: &FlowStats,
    settings: &RelaySettings,
    cancel: &CancellationToken,
) -> FlowEnd {
    let (client_read, client_write) = client.split();
    let (backend_read, backend_write) = backend.split();

    let upstream = pump(
        client_read,
        backend_write,
        settings.buffer_size,
        stats.upstream_counter(),
    );
    let downstream = pump(
        backend_read,
        client_write,
        settings.buffer_size,
        stats.downstream_counter(),
    );
    tokio::pin!(upstream);
    tokio::pin!(downstream);

    tokio::select! {
        _ = cancel.cancelled() => FlowEnd::Cancelled,
        result = &mut upstream => {
            finish_flow(result, downstream.as_mut(), settings.half_close_timeout, cancel).await
        }
        result = &mut downstream => {
            finish_flow(result, upstream.as_mut(), settings.half_close_timeout, cancel).await
        }
    }
}

/// 处理一个已接受的 TCP 连接
async fn handle_connection(
    client: TcpStream,
    peer: SocketAddr,
    target: ForwardAddr,
    label: Arc<str>,
    settings: Arc<RelaySettings>,
    cancel: CancellationToken,
) {
    let _guard = ActiveFlowGuard::new(Transport::Tcp);
    let stats = FlowStats::new(next_flow_id(), peer, target);

    let backend = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Flow #{} cancelled before backend was connected", stats.id);
            return;
        }
        result = connect_backend(&stats.backend, settings.connect_timeout) => match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Flow #{} from {} on {}: {}", stats.id, peer, label, e);
                METRICS
                    .relay_errors_total()
                    .with_label_values(&[&label, error_labels::BACKEND_UNREACHABLE])
                    .inc();
                return;
            }
        }
    };

    debug!(
        "Flow #{} established: {} -> {} via {}",
        stats.id, peer, stats.backend, label
    );

    let end = relay_streams(client, backend, &stats, &settings, &cancel).await;
    stats.record(&label);

    let error_label = match &end {
        FlowEnd::Completed => None,
        FlowEnd::Cancelled => Some(error_labels::FORCED_CLOSE),
        FlowEnd::HalfCloseTimeout => Some(error_labels::HALF_CLOSE_TIMEOUT),
        FlowEnd::Failed(e) => {
            debug!("Flow #{} terminated by I/O error: {}", stats.id, e);
            Some(error_labels::IO_ERROR)
        }
    };
    if let Some(error_label) = error_label {
        METRICS
            .relay_errors_total()
            .with_label_values(&[&label, error_label])
            .inc();
    }

    debug!(
        "Flow #{} closed ({:?}): {} bytes up, {} bytes down, {:?}",
        stats.id,
        end,
        stats.upstream_bytes(),
        stats.downstream_bytes(),
        stats.started.elapsed()
    );
}

/// 接受连接的循环
async fn accept_loop(
    listener: TcpListener,
    label: Arc<str>,
    target_rx: watch::Receiver<ForwardAddr>,
    settings: Arc<RelaySettings>,
    accept_token: CancellationToken,
    flow_token: CancellationToken,
    flows: TaskTracker,
) {
    let backoff = Duration::from_millis(relay_limits::ACCEPT_ERROR_BACKOFF_MS);

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = accept_token.cancelled() => break,
            result = listener.accept() => match result {
                Ok(conn) => conn,
                Err(e) => {
                    // 例如文件描述符耗尽，短暂退避后重试
                    warn!("Failed to accept connection on {}: {}", label, e);
                    METRICS
                        .relay_errors_total()
                        .with_label_values(&[&label, error_labels::ACCEPT_ERROR])
                        .inc();
                    tokio::select! {
                        _ = accept_token.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => continue,
                    }
                }
            }
        };

        METRICS
            .connections_total()
            .with_label_values(&[&label, Transport::Tcp.as_str()])
            .inc();

        let target = target_rx.borrow().clone();
        flows.spawn(handle_connection(
            stream,
            peer,
            target,
            label.clone(),
            settings.clone(),
            flow_token.clone(),
        ));
    }

    debug!("Accept loop on {} stopped", label);
}

/// TCP 转发监听器
pub struct TcpRelayListener {
    key: ListenerKey,
    local_addr: SocketAddr,
    target_tx: watch::Sender<ForwardAddr>,
    accept_token: CancellationToken,
    flow_token: CancellationToken,
    flows: TaskTracker,
    accept_task: Option<JoinHandle<()>>,
}

impl TcpRelayListener {
    /// 绑定监听地址并启动 accept 循环，需要在 tokio 运行时中调用
    pub fn bind(
        key: ListenerKey,
        target: ForwardAddr,
        settings: Arc<RelaySettings>,
    ) -> Result<Self, AppError> {
        let listener =
            create_tcp_listener(key.addr, settings.backlog).map_err(|e| AppError::BindFailure {
                addr: key.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        info!("Listening on {} and forwarding to {}", key, target);

        let (target_tx, target_rx) = watch::channel(target);
        let accept_token = CancellationToken::new();
        let flow_token = CancellationToken::new();
        let flows = TaskTracker::new();

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::from(key.to_string()),
            target_rx,
            settings,
            accept_token.clone(),
            flow_token.clone(),
            flows.clone(),
        ));

        Ok(Self {
            key,
            local_addr,
            target_tx,
            accept_token,
            flow_token,
            flows,
            accept_task: Some(accept_task),
        })
    }

    /// 当前存活的转发流数量
    pub fn active_flows(&self) -> usize {
        self.flows.len()
    }
}

#[async_trait]
impl ListenerHandle for TcpRelayListener {
    fn key(&self) -> ListenerKey {
        self.key
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn retarget(&self, target: ForwardAddr) {
        info!("Listener {} now forwarding to {}", self.key, target);
        self.target_tx.send_replace(target);
    }

    async fn stop_accepting(&mut self) {
        self.accept_token.cancel();
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        info!("Listener {} stopped accepting connections", self.key);
    }

    async fn drain(self: Box<Self>, grace: Duration) -> usize {
        self.flows.close();
        if timeout(grace, self.flows.wait()).await.is_ok() {
            return 0;
        }

        let remaining = self.flows.len();
        warn!(
            "Listener {}: forcing {} flow(s) closed after {:?} grace period",
            self.key, remaining, grace
        );
        self.flow_token.cancel();
        self.flows.wait().await;
        remaining
    }
}

impl Drop for TcpRelayListener {
    fn drop(&mut self) {
        self.accept_token.cancel();
        self.flow_token.cancel();
    }
}
