use crate::error::AppError;
use crate::listener::socket::create_udp_socket;
use crate::listener::ListenerHandle;
use crate::mapping::{ForwardAddr, ListenerKey, Transport};
use crate::metrics::METRICS;
use crate::r#const::{drop_labels, error_labels, relay_limits};
use crate::relay::{next_flow_id, ActiveFlowGuard, FlowStats, RelaySettings};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

// 会话表中的条目
struct SessionHandle {
    id: u64,
    tx: mpsc::Sender<Bytes>,
}

type SessionTable = Arc<DashMap<SocketAddr, SessionHandle>>;

/// 为会话创建已连接到后端的 UDP 套接字
async fn connect_udp_backend(
    target: &ForwardAddr,
    connect_timeout: Duration,
) -> Result<UdpSocket, AppError> {
    let unreachable = |reason: String| AppError::BackendUnreachable {
        target: target.to_string(),
        reason,
    };

    let connect = async {
        let addr = lookup_host((target.host(), target.port()))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")
            })?;
        let local: SocketAddr = if addr.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;
        Ok::<_, std::io::Error>(socket)
    };

    match timeout(connect_timeout, connect).await {
        Ok(Ok(socket)) => Ok(socket),
        Ok(Err(e)) => Err(unreachable(e.to_string())),
        Err(_) => Err(unreachable(format!(
            "connect timed out after {:?}",
            connect_timeout
        ))),
    }
}

/// 单个客户端会话
struct Session {
    stats: FlowStats,
    listener: Arc<UdpSocket>,
    inbound: mpsc::Receiver<Bytes>,
    sessions: SessionTable,
    label: Arc<str>,
    settings: Arc<RelaySettings>,
    cancel: CancellationToken,
}

impl Session {
    async fn run(mut self) {
        let _guard = ActiveFlowGuard::new(Transport::Udp);
        let id = self.stats.id;
        let peer = self.stats.client;

        let backend = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = connect_udp_backend(&self.stats.backend, self.settings.connect_timeout) => match result {
                Ok(socket) => Some(socket),
                Err(e) => {
                    warn!("Session #{} from {} on {}: {}", id, peer, self.label, e);
                    METRICS
                        .relay_errors_total()
                        .with_label_values(&[&self.label, error_labels::BACKEND_UNREACHABLE])
                        .inc();
                    None
                }
            }
        };

        if let Some(backend) = backend {
            debug!(
                "Session #{} established: {} -> {} via {}",
                id, peer, self.stats.backend, self.label
            );
            self.relay(backend).await;
        }

        self.sessions.remove_if(&peer, |_, handle| handle.id == id);
        self.stats.record(&self.label);

        debug!(
            "Session #{} closed: {} bytes up, {} bytes down, {:?}",
            id,
            self.stats.upstream_bytes(),
            self.stats.downstream_bytes(),
            self.stats.started.elapsed()
        );
    }

    async fn relay(&mut self, backend: UdpSocket) {
        let idle_timeout = self.settings.udp_idle_timeout;
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);

        let mut buf = vec![0u8; relay_limits::UDP_DATAGRAM_SIZE];
        let peer = self.stats.client;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    METRICS
                        .relay_errors_total()
                        .with_label_values(&[&self.label, error_labels::FORCED_CLOSE])
                        .inc();
                    break;
                }
                _ = &mut idle => {
                    debug!("Session #{} idle for {:?}", self.stats.id, idle_timeout);
                    break;
                }
                datagram = self.inbound.recv() => {
                    let Some(datagram) = datagram else { break };
                    if let Err(e) = backend.send(&datagram).await {
                        debug!("Session #{} failed to send to backend: {}", self.stats.id, e);
                        self.io_error();
                        break;
                    }
                    self.stats
                        .upstream_counter()
                        .fetch_add(datagram.len() as u64, Ordering::Relaxed);
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                }
                result = backend.recv(&mut buf) => {
                    let n = match result {
                        Ok(n) => n,
                        Err(e) => {
                            debug!("Session #{} failed to receive from backend: {}", self.stats.id, e);
                            self.io_error();
                            break;
                        }
                    };
                    if let Err(e) = self.listener.send_to(&buf[..n], peer).await {
                        debug!("Session #{} failed to reply to {}: {}", self.stats.id, peer, e);
                        self.io_error();
                        break;
                    }
                    self.stats
                        .downstream_counter()
                        .fetch_add(n as u64, Ordering::Relaxed);
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                }
            }
        }
    }

    fn io_error(&self) {
        METRICS
            .relay_errors_total()
            .with_label_values(&[&self.label, error_labels::IO_ERROR])
            .inc();
    }
}

/// 接收循环的共享状态
struct Dispatcher {
    socket: Arc<UdpSocket>,
    sessions: SessionTable,
    target_rx: watch::Receiver<ForwardAddr>,
    label: Arc<str>,
    settings: Arc<RelaySettings>,
    session_token: CancellationToken,
    tracker: TaskTracker,
}

impl Dispatcher {
    /// 把数据报交给所属会话，必要时创建新会话
    fn dispatch(&self, mut datagram: Bytes, peer: SocketAddr) {
        // 先克隆发送端，避免持有 DashMap 的读锁
        let existing = self.sessions.get(&peer).map(|handle| handle.tx.clone());
        if let Some(tx) = existing {
            match tx.try_send(datagram) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) => {
                    self.drop_datagram(drop_labels::QUEUE_FULL);
                    return;
                }
                Err(TrySendError::Closed(returned)) => {
                    // 会话刚结束，用同一个数据报建立新会话
                    datagram = returned;
                    self.sessions
                        .remove_if(&peer, |_, handle| handle.tx.same_channel(&tx));
                }
            }
        }

        if self.sessions.len() >= self.settings.udp_max_sessions {
            debug!(
                "Session limit {} reached on {}, dropping datagram from {}",
                self.settings.udp_max_sessions, self.label, peer
            );
            self.drop_datagram(drop_labels::SESSION_LIMIT);
            return;
        }

        let (tx, inbound) = mpsc::channel(self.settings.udp_queue_depth);
        // 新队列至少能容纳一个数据报
        let _ = tx.try_send(datagram);

        let id = next_flow_id();
        self.sessions.insert(peer, SessionHandle { id, tx });
        METRICS
            .connections_total()
            .with_label_values(&[&self.label, Transport::Udp.as_str()])
            .inc();

        let target = self.target_rx.borrow().clone();
        let session = Session {
            stats: FlowStats::new(id, peer, target),
            listener: self.socket.clone(),
            inbound,
            sessions: self.sessions.clone(),
            label: self.label.clone(),
            settings: self.settings.clone(),
            cancel: self.session_token.clone(),
        };
        self.tracker.spawn(session.run());
    }

    fn drop_datagram(&self, reason: &str) {
        METRICS
            .dropped_datagrams_total()
            .with_label_values(&[&self.label, reason])
            .inc();
    }

    async fn run(self, accept_token: CancellationToken) {
        let mut buf = vec![0u8; relay_limits::UDP_DATAGRAM_SIZE];
        let backoff = Duration::from_millis(relay_limits::ACCEPT_ERROR_BACKOFF_MS);

        loop {
            let (n, peer) = tokio::select! {
                biased;
                _ = accept_token.cancelled() => break,
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("Failed to receive datagram on {}: {}", self.label, e);
                        METRICS
                            .relay_errors_total()
                            .with_label_values(&[&self.label, error_labels::IO_ERROR])
                            .inc();
                        // ICMP 错误可能连续出现，短暂退避
                        tokio::select! {
                            _ = accept_token.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => continue,
                        }
                    }
                }
            };

            self.dispatch(Bytes::copy_from_slice(&buf[..n]), peer);
        }

        debug!("Receive loop on {} stopped", self.label);
    }
}

/// UDP 转发监听器
pub struct UdpRelayListener {
    key: ListenerKey,
    local_addr: SocketAddr,
    target_tx: watch::Sender<ForwardAddr>,
    accept_token: CancellationToken,
    session_token: CancellationToken,
    sessions: SessionTable,
    tracker: TaskTracker,
    accept_task: Option<JoinHandle<()>>,
}

impl UdpRelayListener {
    /// 绑定监听地址并启动接收循环，需要在 tokio 运行时中调用
    pub fn bind(
        key: ListenerKey,
        target: ForwardAddr,
        settings: Arc<RelaySettings>,
    ) -> Result<Self, AppError> {
        let socket = create_udp_socket(key.addr).map_err(|e| AppError::BindFailure {
            addr: key.to_string(),
            reason: e.to_string(),
        })?;
        let local_addr = socket.local_addr()?;

        info!("Listening on {} and forwarding to {}", key, target);

        let (target_tx, target_rx) = watch::channel(target);
        let accept_token = CancellationToken::new();
        let session_token = CancellationToken::new();
        let sessions: SessionTable = Arc::new(DashMap::new());
        let tracker = TaskTracker::new();

        let dispatcher = Dispatcher {
            socket: Arc::new(socket),
            sessions: sessions.clone(),
            target_rx,
            label: Arc::from(key.to_string()),
            settings,
            session_token: session_token.clone(),
            tracker: tracker.clone(),
        };
        let accept_task = tokio::spawn(dispatcher.run(accept_token.clone()));

        Ok(Self {
            key,
            local_addr,
            target_tx,
            accept_token,
            session_token,
            sessions,
            tracker,
            accept_task: Some(accept_task),
        })
    }

    /// 当前会话数量
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl ListenerHandle for UdpRelayListener {
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

    // 会话持有监听套接字的引用，必须全部结束后端口才会释放
    async fn stop_accepting(&mut self) {
        self.accept_token.cancel();
        self.session_token.cancel();
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.sessions.clear();
        info!("Listener {} stopped", self.key);
    }

    async fn drain(self: Box<Self>, _grace: Duration) -> usize {
        0
    }
}

impl Drop for UdpRelayListener {
    fn drop(&mut self) {
        self.accept_token.cancel();
        self.session_token.cancel();
    }
}
