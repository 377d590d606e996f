use crate::error::AppError;
use crate::listener::{ListenerFactory, ListenerHandle};
use crate::mapping::{ForwardAddr, ListenerKey, ListenerState, ListenerStatus};
use crate::metrics::METRICS;
use crate::registry::MappingRegistry;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tracing::{debug, error, info, warn};

/// 绑定失败记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindFailureRecord {
    // 失败时规则的版本，规则被重新添加后才会重试
    pub generation: u64,
    pub reason: String,
}

/// 一次调和完成后发布的结果
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    // 本次调和基于的注册表版本
    pub revision: u64,
    // 当前处于失败状态的监听器
    pub failures: HashMap<ListenerKey, BindFailureRecord>,
}

/// 单次调和的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: usize,
    pub stopped: usize,
    pub retargeted: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

// 运行中的监听器
struct ActiveListener {
    target: ForwardAddr,
    generation: u64,
    handle: Box<dyn ListenerHandle>,
}

/// 监听器管理器
///
/// 订阅注册表版本，每次版本变化后取快照并与运行中的监听器比对：
/// 多余的停止并在后台排空，新增的绑定，目标变化的原地切换。
pub struct ListenerManager {
    registry: Arc<MappingRegistry>,
    factory: Arc<dyn ListenerFactory>,
    grace_period: Duration,
    // 进程退出时的排空时间，不超过整体关闭超时
    shutdown_grace: Duration,
    active: HashMap<ListenerKey, ActiveListener>,
    failed: HashMap<ListenerKey, BindFailureRecord>,
    draining: JoinSet<()>,
    report_tx: watch::Sender<ReconcileReport>,
}

impl ListenerManager {
    pub fn new(
        registry: Arc<MappingRegistry>,
        factory: Arc<dyn ListenerFactory>,
        grace_period: Duration,
    ) -> Self {
        let (report_tx, _) = watch::channel(ReconcileReport::default());
        Self {
            registry,
            factory,
            grace_period,
            shutdown_grace: grace_period,
            active: HashMap::new(),
            failed: HashMap::new(),
            draining: JoinSet::new(),
            report_tx,
        }
    }

    /// 限制进程退出时的排空时间
    ///
    /// 退出时所有监听器（包括此前已在后台排空的）都在该时间内结束。
    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace.min(self.grace_period);
        self
    }

    /// 订阅调和结果
    pub fn reports(&self) -> watch::Receiver<ReconcileReport> {
        self.report_tx.subscribe()
    }

    pub fn active_keys(&self) -> Vec<ListenerKey> {
        let mut keys: Vec<_> = self.active.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn failed_keys(&self) -> Vec<ListenerKey> {
        let mut keys: Vec<_> = self.failed.keys().copied().collect();
        keys.sort();
        keys
    }

    /// 监听器实际绑定的地址
    pub fn local_addr(&self, key: &ListenerKey) -> Option<SocketAddr> {
        self.active.get(key).map(|active| active.handle.local_addr())
    }

    /// 执行一次调和
    ///
    /// 返回时被移除的监听器已停止接受新连接，端口已释放；
    /// 存量连接在后台排空。
    pub async fn reconcile(&mut self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        // 回收已完成的排空任务
        while let Some(result) = self.draining.try_join_next() {
            if let Err(e) = result {
                warn!("Listener drain task failed: {}", e);
            }
        }

        let snapshot = self.registry.snapshot();
        let mut desired: BTreeMap<ListenerKey, (ForwardAddr, u64)> = BTreeMap::new();
        for rule in &snapshot.rules {
            for key in rule.listener_keys() {
                desired.insert(key, (rule.forward_addr.clone(), rule.generation));
            }
        }

        // 停止不再需要的监听器
        let mut undesired: Vec<ListenerKey> = self
            .active
            .keys()
            .filter(|key| !desired.contains_key(key))
            .copied()
            .collect();
        undesired.sort();
        for key in undesired {
            if let Some(active) = self.active.remove(&key) {
                self.stop_listener(active, self.grace_period).await;
                summary.stopped += 1;
            }
        }

        // 规则被删除或重新添加后，旧的失败记录作废
        self.failed.retain(|key, record| {
            desired
                .get(key)
                .map_or(false, |(_, generation)| *generation == record.generation)
        });

        for (key, (target, generation)) in desired {
            if let Some(active) = self.active.get_mut(&key) {
                if active.target != target {
                    active.handle.retarget(target.clone());
                    active.target = target;
                    summary.retargeted += 1;
                }
                if active.generation != generation {
                    active.generation = generation;
                    self.registry
                        .set_listener_status(key, ListenerStatus::new(ListenerState::Running));
                }
                continue;
            }

            if self.failed.contains_key(&key) {
                continue;
            }

            match self.factory.bind(key, target.clone()).await {
                Ok(handle) => {
                    self.registry
                        .set_listener_status(key, ListenerStatus::new(ListenerState::Running));
                    self.active.insert(
                        key,
                        ActiveListener {
                            target,
                            generation,
                            handle,
                        },
                    );
                    summary.started += 1;
                }
                Err(e) => {
                    let reason = match e {
                        AppError::BindFailure { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    error!("Failed to start listener {}: {}", key, reason);
                    METRICS
                        .bind_failures_total()
                        .with_label_values(&[key.transport.as_str()])
                        .inc();
                    self.registry
                        .set_listener_status(key, ListenerStatus::failed(reason.clone()));
                    self.failed
                        .insert(key, BindFailureRecord { generation, reason });
                    summary.failed += 1;
                }
            }
        }

        if !summary.is_noop() {
            info!(
                "Reconciled revision {}: {} started, {} stopped, {} retargeted, {} failed",
                snapshot.revision,
                summary.started,
                summary.stopped,
                summary.retargeted,
                summary.failed
            );
        }

        self.report_tx.send_replace(ReconcileReport {
            revision: snapshot.revision,
            failures: self.failed.clone(),
        });

        summary
    }

    // 关闭监听套接字，然后在后台排空存量流
    async fn stop_listener(&mut self, active: ActiveListener, grace: Duration) {
        let key = active.handle.key();
        self.registry
            .set_listener_status(key, ListenerStatus::new(ListenerState::Stopping));
        let mut handle = active.handle;
        handle.stop_accepting().await;

        self.draining.spawn(async move {
            let forced = handle.drain(grace).await;
            if forced > 0 {
                warn!("Listener {} forced {} flow(s) closed", key, forced);
            } else {
                debug!("Listener {} drained", key);
            }
        });
    }

    /// 停止所有监听器并等待排空完成
    ///
    /// 超过退出排空时间仍未结束的排空任务被中止，其监听器随之关闭所有流。
    pub async fn shutdown(&mut self) {
        let mut keys: Vec<_> = self.active.keys().copied().collect();
        keys.sort();
        info!(
            "Stopping {} listener(s), grace period {:?}",
            keys.len(),
            self.shutdown_grace
        );

        let grace = self.shutdown_grace;
        for key in keys {
            if let Some(active) = self.active.remove(&key) {
                self.stop_listener(active, grace).await;
                self.registry
                    .set_listener_status(key, ListenerStatus::new(ListenerState::Stopped));
            }
        }

        let draining = &mut self.draining;
        let drained = timeout(grace, async {
            while let Some(result) = draining.join_next().await {
                if let Err(e) = result {
                    warn!("Listener drain task failed: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Aborting {} listener drain(s) after {:?}",
                self.draining.len(),
                grace
            );
            self.draining.abort_all();
            while self.draining.join_next().await.is_some() {}
        }
        info!("All listeners stopped");
    }

    /// 持续调和直到 `shutdown` 完成
    pub async fn run_with_shutdown<F>(mut self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        let mut revisions = self.registry.subscribe();
        tokio::pin!(shutdown);

        loop {
            // 先标记已读，快照之后的修改会再次触发调和
            revisions.borrow_and_update();
            self.reconcile().await;

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping listener manager");
                    break;
                }
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }
}

#[async_trait]
impl IntoSubsystem<AppError> for ListenerManager {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        self.run_with_shutdown(subsys.on_shutdown_requested()).await
    }
}
