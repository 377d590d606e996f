use crate::config::defaults::{
    default_backlog, default_buffer_size, default_connect_timeout, default_grace_period,
    default_half_close_timeout, default_reconcile_wait, default_udp_idle_timeout,
    default_udp_max_sessions, default_udp_queue_depth,
};
use crate::r#const::relay_limits;
use serde::{Deserialize, Serialize};
use validator::Validate;

// 转发引擎配置，时间单位均为秒
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct RelayConfig {
    // 后端连接超时
    #[serde(default = "default_connect_timeout")]
    #[validate(range(
        min = relay_limits::MIN_CONNECT_TIMEOUT,
        max = relay_limits::MAX_CONNECT_TIMEOUT
    ))]
    pub connect_timeout: u64,
    // 删除规则后，存量连接的宽限期
    #[serde(default = "default_grace_period")]
    #[validate(range(
        min = relay_limits::MIN_GRACE_PERIOD,
        max = relay_limits::MAX_GRACE_PERIOD
    ))]
    pub grace_period: u64,
    // 一个方向结束后，另一个方向的最长等待时间
    #[serde(default = "default_half_close_timeout")]
    #[validate(range(
        min = relay_limits::MIN_HALF_CLOSE_TIMEOUT,
        max = relay_limits::MAX_HALF_CLOSE_TIMEOUT
    ))]
    pub half_close_timeout: u64,
    // UDP 会话空闲超时
    #[serde(default = "default_udp_idle_timeout")]
    #[validate(range(
        min = relay_limits::MIN_UDP_IDLE_TIMEOUT,
        max = relay_limits::MAX_UDP_IDLE_TIMEOUT
    ))]
    pub udp_idle_timeout: u64,
    // 每个 UDP 监听器的会话上限
    #[serde(default = "default_udp_max_sessions")]
    #[validate(range(
        min = relay_limits::MIN_UDP_MAX_SESSIONS,
        max = relay_limits::MAX_UDP_MAX_SESSIONS
    ))]
    pub udp_max_sessions: usize,
    // UDP 会话入站队列深度
    #[serde(default = "default_udp_queue_depth")]
    #[validate(range(
        min = relay_limits::MIN_UDP_QUEUE_DEPTH,
        max = relay_limits::MAX_UDP_QUEUE_DEPTH
    ))]
    pub udp_queue_depth: usize,
    // TCP 单方向缓冲区大小（字节）
    #[serde(default = "default_buffer_size")]
    #[validate(range(
        min = relay_limits::MIN_BUFFER_SIZE,
        max = relay_limits::MAX_BUFFER_SIZE
    ))]
    pub buffer_size: usize,
    // TCP 监听队列长度
    #[serde(default = "default_backlog")]
    #[validate(range(min = relay_limits::MIN_BACKLOG, max = relay_limits::MAX_BACKLOG))]
    pub backlog: i32,
    // 管理接口等待调和结果的时间
    #[serde(default = "default_reconcile_wait")]
    #[validate(range(
        min = relay_limits::MIN_RECONCILE_WAIT,
        max = relay_limits::MAX_RECONCILE_WAIT
    ))]
    pub reconcile_wait: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            grace_period: default_grace_period(),
            half_close_timeout: default_half_close_timeout(),
            udp_idle_timeout: default_udp_idle_timeout(),
            udp_max_sessions: default_udp_max_sessions(),
            udp_queue_depth: default_udp_queue_depth(),
            buffer_size: default_buffer_size(),
            backlog: default_backlog(),
            reconcile_wait: default_reconcile_wait(),
        }
    }
}
