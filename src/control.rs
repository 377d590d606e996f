use crate::error::AppError;
use crate::listener::ReconcileReport;
use crate::mapping::{MappingType, MappingView, NewMapping};
use crate::registry::MappingRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;

/// 控制面：修改注册表并等待监听器管理器应用该修改
pub struct ControlPlane {
    registry: Arc<MappingRegistry>,
    reports: watch::Receiver<ReconcileReport>,
    reconcile_wait: Duration,
}

impl ControlPlane {
    pub fn new(
        registry: Arc<MappingRegistry>,
        reports: watch::Receiver<ReconcileReport>,
        reconcile_wait: Duration,
    ) -> Self {
        Self {
            registry,
            reports,
            reconcile_wait,
        }
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    // 等待不早于 `revision` 的调和结果
    async fn wait_for(&self, revision: u64) -> Result<ReconcileReport, AppError> {
        let mut reports = self.reports.clone();
        let waited = timeout(self.reconcile_wait, async move {
            reports
                .wait_for(|report| report.revision >= revision)
                .await
                .map(|report| report.clone())
        })
        .await;

        match waited {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(_)) => Err(AppError::Internal(
                "listener manager is not running".to_string(),
            )),
            Err(_) => Err(AppError::Timeout(format!(
                "revision {} was not applied within {:?}",
                revision, self.reconcile_wait
            ))),
        }
    }

    /// 新增或替换规则，返回监听器已启动后的规则视图
    ///
    /// 任一监听器绑定失败时返回 `BindFailure`，规则仍保留在注册表中，
    /// 状态为 `failed`。
    pub async fn add(&self, request: NewMapping) -> Result<MappingView, AppError> {
        let outcome = self.registry.add(request)?;
        let report = self.wait_for(outcome.revision).await?;

        for key in outcome.rule.listener_keys() {
            if let Some(failure) = report.failures.get(&key) {
                if failure.generation >= outcome.rule.generation {
                    return Err(AppError::BindFailure {
                        addr: key.to_string(),
                        reason: failure.reason.clone(),
                    });
                }
            }
        }

        self.registry.view(&outcome.rule.id).ok_or_else(|| {
            // 等待期间被并发删除
            AppError::NotFound(format!("mapping {} was removed", outcome.rule.listen_addr))
        })
    }

    /// 删除规则，返回时对应端口已不再接受新连接
    ///
    /// 未指定映射类型时删除该地址上的所有协议。
    pub async fn delete(
        &self,
        listen_addr: &str,
        mapping_type: Option<MappingType>,
    ) -> Result<Vec<String>, AppError> {
        let outcome = match mapping_type {
            Some(mapping_type) => self.registry.delete(listen_addr, mapping_type)?,
            None => self.registry.delete_address(listen_addr)?,
        };
        self.wait_for(outcome.revision).await?;
        debug!(
            "Revision {} applied, {} listener(s) removed",
            outcome.revision,
            outcome.removed.len()
        );
        Ok(outcome.removed.iter().map(|key| key.to_string()).collect())
    }

    /// 按插入顺序返回所有规则
    pub fn query(&self) -> Vec<MappingView> {
        self.registry.query()
    }
}
