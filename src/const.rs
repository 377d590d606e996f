// 应用常量定义

//
// 配置参数限制常量
//

// 应用关闭等待时间限制
pub mod shutdown_timeout {
    // 默认值
    pub const DEFAULT: u64 = 30;
    // 最小值
    pub const MIN: u64 = 1;
    // 最大值
    pub const MAX: u64 = 120;
    // 留给其他子系统的关闭时间
    pub const RESERVED: u64 = 2;
}

// 管理服务配置限制
pub mod admin_limits {
    // 默认监听地址（仅本机）
    pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
    // 默认监听端口
    pub const DEFAULT_PORT: u16 = 7655;
    // 默认请求超时（秒）
    pub const DEFAULT_TIMEOUT: u64 = 30;
    // 最小请求超时（秒）
    pub const MIN_TIMEOUT: u64 = 1;
    // 最大请求超时（秒）
    pub const MAX_TIMEOUT: u64 = 600;
}

// 转发引擎配置限制
pub mod relay_limits {
    // 默认后端连接超时（秒）
    pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;
    // 最小后端连接超时（秒）
    pub const MIN_CONNECT_TIMEOUT: u64 = 1;
    // 最大后端连接超时（秒）
    pub const MAX_CONNECT_TIMEOUT: u64 = 120;
    // 默认优雅关闭宽限期（秒）
    pub const DEFAULT_GRACE_PERIOD: u64 = 20;
    // 最小优雅关闭宽限期（秒）
    pub const MIN_GRACE_PERIOD: u64 = 0;
    // 最大优雅关闭宽限期（秒）
    pub const MAX_GRACE_PERIOD: u64 = 600;
    // 默认半关闭等待时间（秒）
    pub const DEFAULT_HALF_CLOSE_TIMEOUT: u64 = 30;
    // 最小半关闭等待时间（秒）
    pub const MIN_HALF_CLOSE_TIMEOUT: u64 = 1;
    // 最大半关闭等待时间（秒）
    pub const MAX_HALF_CLOSE_TIMEOUT: u64 = 3600;
    // 默认 UDP 会话空闲超时（秒）
    pub const DEFAULT_UDP_IDLE_TIMEOUT: u64 = 60;
    // 最小 UDP 会话空闲超时（秒）
    pub const MIN_UDP_IDLE_TIMEOUT: u64 = 1;
    // 最大 UDP 会话空闲超时（秒）
    pub const MAX_UDP_IDLE_TIMEOUT: u64 = 3600;
    // 默认每个监听器的 UDP 会话上限
    pub const DEFAULT_UDP_MAX_SESSIONS: usize = 1024;
    // 最小 UDP 会话上限
    pub const MIN_UDP_MAX_SESSIONS: usize = 1;
    // 最大 UDP 会话上限
    pub const MAX_UDP_MAX_SESSIONS: usize = 65536;
    // 默认 UDP 会话入站队列深度
    pub const DEFAULT_UDP_QUEUE_DEPTH: usize = 64;
    // 最小 UDP 会话入站队列深度
    pub const MIN_UDP_QUEUE_DEPTH: usize = 1;
    // 最大 UDP 会话入站队列深度
    pub const MAX_UDP_QUEUE_DEPTH: usize = 4096;
    // 默认 TCP 缓冲区大小（字节）
    pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;
    // 最小 TCP 缓冲区大小（字节）
    pub const MIN_BUFFER_SIZE: usize = 1024;
    // 最大 TCP 缓冲区大小（字节）
    pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;
    // 默认 TCP 监听队列长度
    pub const DEFAULT_BACKLOG: i32 = 1024;
    // 最小 TCP 监听队列长度
    pub const MIN_BACKLOG: i32 = 1;
    // 最大 TCP 监听队列长度
    pub const MAX_BACKLOG: i32 = 65535;
    // 默认等待调和结果时间（秒）
    pub const DEFAULT_RECONCILE_WAIT: u64 = 10;
    // 最小等待调和结果时间（秒）
    pub const MIN_RECONCILE_WAIT: u64 = 1;
    // 最大等待调和结果时间（秒）
    pub const MAX_RECONCILE_WAIT: u64 = 120;
    // UDP 数据报最大长度
    pub const UDP_DATAGRAM_SIZE: usize = 65535;
    // accept 失败后的退避时间（毫秒）
    pub const ACCEPT_ERROR_BACKOFF_MS: u64 = 100;
}

// 映射类型取值
pub mod mapping_types {
    pub const TCP: &str = "tcp";
    pub const UDP: &str = "udp";
    pub const TCP_UDP: &str = "tcpudp";
}

// API 常量
pub mod api {
    // 认证头
    pub const AUTHORIZATION_HEADER: &str = "Authorization";

    // 路由
    pub const ADD_PATH: &str = "/api/add";
    pub const DELETE_PATH: &str = "/api/delete";
    pub const QUERY_PATH: &str = "/api/query";
    pub const DOCS_PATH: &str = "/api/docs";

    // 响应状态
    pub mod response_status {
        pub const SUCCESS: &str = "success";
        pub const ERROR: &str = "error";
    }

    // 错误类型
    pub mod error_types {
        pub const INVALID_ADDRESS: &str = "InvalidAddress";
        pub const PORT_CONFLICT: &str = "PortConflict";
        pub const NOT_FOUND: &str = "NotFound";
        pub const BIND_FAILURE: &str = "BindFailure";
        pub const BACKEND_UNREACHABLE: &str = "BackendUnreachable";
        pub const TIMEOUT: &str = "Timeout";
        pub const AUTH_REJECTED: &str = "AuthRejected";
        pub const BAD_REQUEST: &str = "BadRequest";
        pub const INTERNAL: &str = "InternalError";
    }
}

//
// 指标标签常量
//

// 错误类型标签
pub mod error_labels {
    // 后端不可达
    pub const BACKEND_UNREACHABLE: &str = "backend_unreachable";
    // 转发过程中 IO 错误
    pub const IO_ERROR: &str = "io_error";
    // 接受连接失败
    pub const ACCEPT_ERROR: &str = "accept_error";
    // 半关闭超时
    pub const HALF_CLOSE_TIMEOUT: &str = "half_close_timeout";
    // 被强制关闭
    pub const FORCED_CLOSE: &str = "forced_close";
}

// 流量方向标签
pub mod direction_labels {
    // 客户端 -> 后端
    pub const UPSTREAM: &str = "upstream";
    // 后端 -> 客户端
    pub const DOWNSTREAM: &str = "downstream";
}

// 丢弃数据报原因标签
pub mod drop_labels {
    // 会话数量达到上限
    pub const SESSION_LIMIT: &str = "session_limit";
    // 会话队列已满
    pub const QUEUE_FULL: &str = "queue_full";
}
