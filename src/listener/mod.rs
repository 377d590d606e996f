// 监听器管理
pub mod manager;
pub mod socket;

pub use self::manager::{BindFailureRecord, ListenerManager, ReconcileReport, ReconcileSummary};
pub use self::socket::SocketListenerFactory;

use crate::error::AppError;
use crate::mapping::{ForwardAddr, ListenerKey};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

/// 已绑定的监听器
///
/// 停止分两步：`stop_accepting` 关闭监听套接字并等待 accept 循环退出，
/// 返回后端口即被释放；`drain` 在宽限期内等待存量流结束，超时后强制关闭，
/// 返回被强制关闭的流数量。
#[async_trait]
pub trait ListenerHandle: Send + Sync {
    // 监听器标识
    fn key(&self) -> ListenerKey;

    // 实际绑定的地址
    fn local_addr(&self) -> SocketAddr;

    // 切换转发目标，只影响之后建立的流
    fn retarget(&self, target: ForwardAddr);

    async fn stop_accepting(&mut self);

    async fn drain(self: Box<Self>, grace: Duration) -> usize;
}

/// 监听器工厂，测试中可替换为不绑定真实端口的实现
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    async fn bind(
        &self,
        key: ListenerKey,
        target: ForwardAddr,
    ) -> Result<Box<dyn ListenerHandle>, AppError>;
}
