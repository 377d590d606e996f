use crate::r#const::api::error_types;
use std::io;
use thiserror::Error;

/// 应用错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 地址无法解析或不合法
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// 监听地址已被其他协议的规则占用
    #[error("Port conflict: {0}")]
    PortConflict(String),

    /// 映射规则不存在
    #[error("Mapping not found: {0}")]
    NotFound(String),

    /// 监听器绑定失败
    #[error("Failed to bind {addr}: {reason}")]
    BindFailure { addr: String, reason: String },

    /// 后端不可达
    #[error("Backend {target} unreachable: {reason}")]
    BackendUnreachable { target: String, reason: String },

    /// 超时
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 认证失败
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// 持久化错误
    #[error("Persistence error: {0}")]
    Persist(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),

    /// 序列化/反序列化错误
    #[error("Serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl AppError {
    /// 返回 API 响应中使用的错误类型名
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::InvalidAddress(_) => error_types::INVALID_ADDRESS,
            AppError::PortConflict(_) => error_types::PORT_CONFLICT,
            AppError::NotFound(_) => error_types::NOT_FOUND,
            AppError::BindFailure { .. } => error_types::BIND_FAILURE,
            AppError::BackendUnreachable { .. } => error_types::BACKEND_UNREACHABLE,
            AppError::Timeout(_) => error_types::TIMEOUT,
            AppError::AuthRejected(_) => error_types::AUTH_REJECTED,
            AppError::SerdeError(_) => error_types::BAD_REQUEST,
            AppError::Io(_) | AppError::Config(_) | AppError::Persist(_) | AppError::Internal(_) => {
                error_types::INTERNAL
            }
        }
    }
}
