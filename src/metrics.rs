use once_cell::sync::Lazy;
use prometheus::{CounterVec, IntCounterVec, IntGaugeVec, Opts, Registry};

/// 应用指标
pub struct Metrics {
    registry: Registry,
    // 接受的连接/会话计数
    connections_total: IntCounterVec,
    // 活跃的转发流
    active_flows: IntGaugeVec,
    // 转发字节数
    bytes_total: CounterVec,
    // 转发错误计数
    relay_errors_total: IntCounterVec,
    // 丢弃的 UDP 数据报
    dropped_datagrams_total: IntCounterVec,
    // 监听器绑定失败计数
    bind_failures_total: IntCounterVec,
    // 管理接口请求计数
    api_requests_total: IntCounterVec,
}

impl Metrics {
    /// 创建新的指标收集器
    fn new() -> Self {
        let registry = Registry::new();

        // 接受的连接/会话计数
        let connections_total = IntCounterVec::new(
            Opts::new(
                "portrelay_connections_total",
                "Total number of TCP connections accepted or UDP sessions created by relay listeners.",
            ),
            &["listener", "protocol"],
        )
        .unwrap();

        // 活跃的转发流
        let active_flows = IntGaugeVec::new(
            Opts::new(
                "portrelay_active_flows",
                "Number of relay flows (TCP) or sessions (UDP) currently alive.",
            ),
            &["protocol"],
        )
        .unwrap();

        // 转发字节数
        let bytes_total = CounterVec::new(
            Opts::new(
                "portrelay_bytes_total",
                "Total number of bytes relayed, by listener and direction.",
            ),
            &["listener", "direction"],
        )
        .unwrap();

        // 转发错误计数
        let relay_errors_total = IntCounterVec::new(
            Opts::new(
                "portrelay_relay_errors_total",
                "Total number of relay flows terminated by an error.",
            ),
            &["listener", "error"],
        )
        .unwrap();

        // 丢弃的 UDP 数据报
        let dropped_datagrams_total = IntCounterVec::new(
            Opts::new(
                "portrelay_dropped_datagrams_total",
                "Total number of UDP datagrams dropped by the relay.",
            ),
            &["listener", "reason"],
        )
        .unwrap();

        // 监听器绑定失败计数
        let bind_failures_total = IntCounterVec::new(
            Opts::new(
                "portrelay_bind_failures_total",
                "Total number of listener bind failures during reconciliation.",
            ),
            &["protocol"],
        )
        .unwrap();

        // 管理接口请求计数
        let api_requests_total = IntCounterVec::new(
            Opts::new(
                "portrelay_api_requests_total",
                "Total number of control API requests, by endpoint and outcome.",
            ),
            &["endpoint", "status"],
        )
        .unwrap();

        // 注册指标
        registry
            .register(Box::new(connections_total.clone()))
            .unwrap();
        registry.register(Box::new(active_flows.clone())).unwrap();
        registry.register(Box::new(bytes_total.clone())).unwrap();
        registry
            .register(Box::new(relay_errors_total.clone()))
            .unwrap();
        registry
            .register(Box::new(dropped_datagrams_total.clone()))
            .unwrap();
        registry
            .register(Box::new(bind_failures_total.clone()))
            .unwrap();
        registry
            .register(Box::new(api_requests_total.clone()))
            .unwrap();

        Self {
            registry,
            connections_total,
            active_flows,
            bytes_total,
            relay_errors_total,
            dropped_datagrams_total,
            bind_failures_total,
            api_requests_total,
        }
    }

    /// 获取注册表
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 接受的连接/会话计数
    pub fn connections_total(&self) -> &IntCounterVec {
        &self.connections_total
    }

    /// 活跃的转发流
    pub fn active_flows(&self) -> &IntGaugeVec {
        &self.active_flows
    }

    /// 转发字节数
    pub fn bytes_total(&self) -> &CounterVec {
        &self.bytes_total
    }

    /// 转发错误计数
    pub fn relay_errors_total(&self) -> &IntCounterVec {
        &self.relay_errors_total
    }

    /// 丢弃的 UDP 数据报
    pub fn dropped_datagrams_total(&self) -> &IntCounterVec {
        &self.dropped_datagrams_total
    }

    /// 监听器绑定失败计数
    pub fn bind_failures_total(&self) -> &IntCounterVec {
        &self.bind_failures_total
    }

    /// 管理接口请求计数
    pub fn api_requests_total(&self) -> &IntCounterVec {
        &self.api_requests_total
    }
}

/// 全局指标实例
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);
