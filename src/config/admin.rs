use crate::config::defaults::{default_admin_address, default_admin_port, default_admin_timeout};
use crate::config::validation;
use crate::r#const::admin_limits;
use serde::{Deserialize, Serialize};
use validator::Validate;

// 管理服务配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct AdminConfig {
    // 监听地址
    #[serde(default = "default_admin_address")]
    #[validate(custom(function = "validation::validate_ip_address"))]
    pub address: String,
    // 监听端口
    #[serde(default = "default_admin_port")]
    #[validate(range(min = 1, message = "Admin port cannot be 0"))]
    pub port: u16,
    // API 访问授权码
    #[serde(default, skip_serializing)]
    pub auth_code: String,
    // 请求超时（秒）
    #[serde(default = "default_admin_timeout")]
    #[validate(range(min = admin_limits::MIN_TIMEOUT, max = admin_limits::MAX_TIMEOUT))]
    pub timeout: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            address: default_admin_address(),
            port: default_admin_port(),
            auth_code: String::new(),
            timeout: default_admin_timeout(),
        }
    }
}
