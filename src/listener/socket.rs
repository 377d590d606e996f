use crate::error::AppError;
use crate::listener::{ListenerFactory, ListenerHandle};
use crate::mapping::{ForwardAddr, ListenerKey, Transport};
use crate::relay::{RelaySettings, TcpRelayListener, UdpRelayListener};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};

fn domain_for(addr: &SocketAddr) -> Domain {
    if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    }
}

/// 创建 TCP 监听器
///
/// 设置 SO_REUSEADDR，以便删除规则后能立即在同一端口重新绑定。
/// 不设置 SO_REUSEPORT，否则同一端口的重复绑定不会报错。
pub fn create_tcp_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    // 创建 socket
    let socket = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))?;

    // 设置 SO_REUSEADDR 选项
    #[cfg(unix)]
    socket.set_reuse_address(true)?;

    // 绑定并开始监听
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;

    // 将 socket2::Socket 转换为 tokio::net::TcpListener
    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// 创建 UDP 套接字
pub fn create_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(domain_for(&addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// 绑定真实套接字的监听器工厂
pub struct SocketListenerFactory {
    settings: Arc<RelaySettings>,
}

impl SocketListenerFactory {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

#[async_trait]
impl ListenerFactory for SocketListenerFactory {
    async fn bind(
        &self,
        key: ListenerKey,
        target: ForwardAddr,
    ) -> Result<Box<dyn ListenerHandle>, AppError> {
        match key.transport {
            Transport::Tcp => Ok(Box::new(TcpRelayListener::bind(
                key,
                target,
                self.settings.clone(),
            )?)),
            Transport::Udp => Ok(Box::new(UdpRelayListener::bind(
                key,
                target,
                self.settings.clone(),
            )?)),
        }
    }
}
