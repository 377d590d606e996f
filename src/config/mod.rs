// 导出子模块
pub mod admin;
pub mod defaults;
pub mod mapping;
pub mod relay;
pub mod validation;

// 重新导出常用类型
pub use self::admin::AdminConfig;
pub use self::mapping::MappingConfig;
pub use self::relay::RelayConfig;

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use validator::Validate;

// 配置文件结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    // 管理服务配置
    #[serde(default)]
    #[validate(nested)]
    pub admin: AdminConfig,
    // 转发引擎配置
    #[serde(default)]
    #[validate(nested)]
    pub relay: RelayConfig,
    // 映射规则状态文件，未配置时不持久化
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    // 启动时加载的映射规则
    #[serde(default)]
    #[validate(nested)]
    pub mappings: Vec<MappingConfig>,
}

impl Config {
    // 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        debug!("Attempting to load configuration from file: {:?}", path);

        // 打开并读取文件
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!(
                "Unable to open configuration file {:?}: {}",
                path, e
            ))
        })?;

        let mut content = String::new();
        file.read_to_string(&mut content).map_err(|e| {
            AppError::Config(format!(
                "Unable to read configuration file {:?}: {}",
                path, e
            ))
        })?;

        Self::from_yaml(&content)
    }

    // 配置文件不存在时使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Configuration file {:?} not found, using default configuration",
                path
            );
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    // 解析并验证 YAML 配置
    pub fn from_yaml(content: &str) -> Result<Self, AppError> {
        // 空文件视为默认配置
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| AppError::Config(format!("Configuration file parsing error: {}", e)))?;

        config.check()?;
        Ok(config)
    }

    // 验证配置
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()
            .map_err(|e| AppError::Config(format!("Configuration validation failed: {}", e)))
    }

    // 授权码必须在配置文件或命令行中提供
    pub fn check_auth_code(&self) -> Result<(), AppError> {
        if self.admin.auth_code.trim().is_empty() {
            return Err(AppError::Config(
                "API auth code is required (admin.auth_code or --code)".to_string(),
            ));
        }
        Ok(())
    }

    // 管理服务监听地址
    pub fn admin_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.admin.address, self.admin.port)
            .parse::<SocketAddr>()
            .or_else(|_| {
                format!("[{}]:{}", self.admin.address, self.admin.port).parse::<SocketAddr>()
            })
            .map_err(|e| AppError::Config(format!("Invalid admin server address: {}", e)))
    }
}
