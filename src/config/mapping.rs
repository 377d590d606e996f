use crate::config::defaults::default_mapping_type;
use crate::config::validation;
use crate::mapping::{MappingRule, MappingType, NewMapping};
use serde::{Deserialize, Serialize};
use validator::Validate;

// 配置文件中的映射规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct MappingConfig {
    // 监听地址，如 ":80" 或 "127.0.0.1:8080"
    #[validate(custom(function = "validation::validate_listen_addr"))]
    pub listen_addr: String,
    // 转发目标，如 "192.168.8.1:80"
    #[validate(custom(function = "validation::validate_forward_addr"))]
    pub forward_addr: String,
    // 映射类型
    #[serde(default = "default_mapping_type")]
    pub mapping_type: MappingType,
}

impl From<&MappingConfig> for NewMapping {
    fn from(config: &MappingConfig) -> Self {
        NewMapping::new(
            config.listen_addr.clone(),
            config.forward_addr.clone(),
            config.mapping_type,
        )
    }
}

impl From<&MappingRule> for MappingConfig {
    fn from(rule: &MappingRule) -> Self {
        Self {
            listen_addr: rule.listen_addr.to_string(),
            forward_addr: rule.forward_addr.to_string(),
            mapping_type: rule.mapping_type,
        }
    }
}
