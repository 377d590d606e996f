use crate::mapping::MappingType;
use crate::r#const::{admin_limits, relay_limits};

// 默认值函数
pub fn default_admin_address() -> String {
    admin_limits::DEFAULT_ADDRESS.to_string()
}

pub fn default_admin_port() -> u16 {
    admin_limits::DEFAULT_PORT
}

pub fn default_admin_timeout() -> u64 {
    admin_limits::DEFAULT_TIMEOUT
}

pub fn default_connect_timeout() -> u64 {
    relay_limits::DEFAULT_CONNECT_TIMEOUT
}

pub fn default_grace_period() -> u64 {
    relay_limits::DEFAULT_GRACE_PERIOD
}

pub fn default_half_close_timeout() -> u64 {
    relay_limits::DEFAULT_HALF_CLOSE_TIMEOUT
}

pub fn default_udp_idle_timeout() -> u64 {
    relay_limits::DEFAULT_UDP_IDLE_TIMEOUT
}

pub fn default_udp_max_sessions() -> usize {
    relay_limits::DEFAULT_UDP_MAX_SESSIONS
}

pub fn default_udp_queue_depth() -> usize {
    relay_limits::DEFAULT_UDP_QUEUE_DEPTH
}

pub fn default_buffer_size() -> usize {
    relay_limits::DEFAULT_BUFFER_SIZE
}

pub fn default_backlog() -> i32 {
    relay_limits::DEFAULT_BACKLOG
}

pub fn default_reconcile_wait() -> u64 {
    relay_limits::DEFAULT_RECONCILE_WAIT
}

// 未指定映射类型时同时转发 TCP 与 UDP
pub fn default_mapping_type() -> MappingType {
    MappingType::TcpUdp
}
