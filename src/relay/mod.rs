// 转发引擎
pub mod tcp;
pub mod udp;

pub use self::tcp::{connect_backend, TcpRelayListener};
pub use self::udp::UdpRelayListener;

use crate::config::RelayConfig;
use crate::mapping::{ForwardAddr, Transport};
use crate::metrics::METRICS;
use crate::r#const::direction_labels;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static FLOW_COUNTER: AtomicU64 = AtomicU64::new(1);

/// 生成下一个转发流 ID
pub fn next_flow_id() -> u64 {
    FLOW_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// 转发引擎运行参数
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub connect_timeout: Duration,
    pub half_close_timeout: Duration,
    pub udp_idle_timeout: Duration,
    pub udp_max_sessions: usize,
    pub udp_queue_depth: usize,
    pub buffer_size: usize,
    pub backlog: i32,
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout),
            half_close_timeout: Duration::from_secs(config.half_close_timeout),
            udp_idle_timeout: Duration::from_secs(config.udp_idle_timeout),
            udp_max_sessions: config.udp_max_sessions,
            udp_queue_depth: config.udp_queue_depth,
            buffer_size: config.buffer_size,
            backlog: config.backlog,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// 单条转发流（TCP 连接或 UDP 会话）的统计
#[derive(Debug)]
pub struct FlowStats {
    pub id: u64,
    pub client: SocketAddr,
    pub backend: ForwardAddr,
    pub started: Instant,
    // 客户端 -> 后端
    upstream: AtomicU64,
    // 后端 -> 客户端
    downstream: AtomicU64,
}

impl FlowStats {
    pub fn new(id: u64, client: SocketAddr, backend: ForwardAddr) -> Self {
        Self {
            id,
            client,
            backend,
            started: Instant::now(),
            upstream: AtomicU64::new(0),
            downstream: AtomicU64::new(0),
        }
    }

    pub fn upstream_counter(&self) -> &AtomicU64 {
        &self.upstream
    }

    pub fn downstream_counter(&self) -> &AtomicU64 {
        &self.downstream
    }

    pub fn upstream_bytes(&self) -> u64 {
        self.upstream.load(Ordering::Relaxed)
    }

    pub fn downstream_bytes(&self) -> u64 {
        self.downstream.load(Ordering::Relaxed)
    }

    /// 将字节数写入指标
    pub fn record(&self, listener: &str) {
        METRICS
            .bytes_total()
            .with_label_values(&[listener, direction_labels::UPSTREAM])
            .inc_by(self.upstream_bytes() as f64);
        METRICS
            .bytes_total()
            .with_label_values(&[listener, direction_labels::DOWNSTREAM])
            .inc_by(self.downstream_bytes() as f64);
    }
}

/// 活跃流计数守卫，析构时自动减一
pub(crate) struct ActiveFlowGuard {
    transport: Transport,
}

impl ActiveFlowGuard {
    pub(crate) fn new(transport: Transport) -> Self {
        METRICS
            .active_flows()
            .with_label_values(&[transport.as_str()])
            .inc();
        Self { transport }
    }
}

impl Drop for ActiveFlowGuard {
    fn drop(&mut self) {
        METRICS
            .active_flows()
            .with_label_values(&[self.transport.as_str()])
            .dec();
    }
}
