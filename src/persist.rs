use crate::config::MappingConfig;
use crate::error::AppError;
use crate::registry::{MappingRegistry, RegistrySnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tracing::{debug, error, info, warn};
use validator::Validate;

/// 映射状态文件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct MappingFile {
    #[serde(default)]
    #[validate(nested)]
    pub mappings: Vec<MappingConfig>,
}

impl MappingFile {
    /// 从快照中提取非临时规则
    pub fn from_snapshot(snapshot: &RegistrySnapshot) -> Self {
        Self {
            mappings: snapshot
                .rules
                .iter()
                .filter(|rule| !rule.temporary)
                .map(MappingConfig::from)
                .collect(),
        }
    }

    /// 读取状态文件，文件不存在时返回空集合
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("State file {:?} does not exist yet", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Persist(format!("Unable to read state file {:?}: {}", path, e))
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let file: MappingFile = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Persist(format!("State file {:?} parsing error: {}", path, e))
        })?;
        file.validate().map_err(|e| {
            AppError::Persist(format!("State file {:?} validation failed: {}", path, e))
        })?;
        Ok(file)
    }

    pub fn to_yaml(&self) -> Result<String, AppError> {
        serde_yaml::to_string(self)
            .map_err(|e| AppError::Persist(format!("Unable to serialize mappings: {}", e)))
    }

    /// 先写临时文件再重命名，避免留下写了一半的状态文件
    pub async fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), AppError> {
        write_atomic(path.as_ref(), &self.to_yaml()?).await
    }
}

async fn write_atomic(path: &Path, content: &str) -> Result<(), AppError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            AppError::Persist(format!("Unable to create directory {:?}: {}", parent, e))
        })?;
    }
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| AppError::Persist(format!("Unable to write {:?}: {}", tmp, e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::Persist(format!("Unable to replace {:?}: {}", path, e)))
}

/// 将规则加载到注册表，返回成功加载的数量
///
/// 单条规则失败只记录日志，不影响其他规则。
pub fn restore(registry: &MappingRegistry, mappings: &[MappingConfig], source: &str) -> usize {
    let mut loaded = 0;
    for mapping in mappings {
        match registry.add(mapping.into()) {
            Ok(_) => loaded += 1,
            Err(e) => warn!(
                "Skipping mapping {} -> {} from {}: {}",
                mapping.listen_addr, mapping.forward_addr, source, e
            ),
        }
    }
    if loaded > 0 {
        info!("Loaded {} mapping(s) from {}", loaded, source);
    }
    loaded
}

/// 映射持久化服务
///
/// 注册表每次变化后把非临时规则写入状态文件，内容不变时跳过。
pub struct MappingPersister {
    registry: Arc<MappingRegistry>,
    path: PathBuf,
    last_written: Option<String>,
}

impl MappingPersister {
    pub fn new(registry: Arc<MappingRegistry>, path: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            path: path.into(),
            last_written: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 写入当前快照，返回是否真正写了文件
    pub async fn persist(&mut self) -> Result<bool, AppError> {
        let snapshot = self.registry.snapshot();
        let content = MappingFile::from_snapshot(&snapshot).to_yaml()?;
        if self.last_written.as_deref() == Some(content.as_str()) {
            return Ok(false);
        }

        write_atomic(&self.path, &content).await?;
        debug!(
            "Revision {} persisted to {:?}",
            snapshot.revision, self.path
        );
        self.last_written = Some(content);
        Ok(true)
    }

    async fn persist_logged(&mut self) {
        if let Err(e) = self.persist().await {
            error!("Failed to persist mappings: {}", e);
        }
    }

    pub async fn run_with_shutdown<F>(mut self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        let mut revisions = self.registry.subscribe();
        tokio::pin!(shutdown);
        info!("Persisting mappings to {:?}", self.path);

        loop {
            revisions.borrow_and_update();
            self.persist_logged().await;

            tokio::select! {
                _ = &mut shutdown => break,
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.persist_logged().await;
        info!("Mapping persister stopped");
        Ok(())
    }
}

#[async_trait]
impl IntoSubsystem<AppError> for MappingPersister {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        self.run_with_shutdown(subsys.on_shutdown_requested()).await
    }
}
