//! 控制面到转发引擎的完整流程
use super::common::{
    fast_settings, free_port, read_to_end, spawn_tcp_echo, spawn_udp_echo, udp_round_trip,
};
use portrelay::control::ControlPlane;
use portrelay::error::AppError;
use portrelay::listener::{ListenerManager, SocketListenerFactory};
use portrelay::mapping::{ListenerState, MappingType, NewMapping};
use portrelay::registry::MappingRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Daemon {
    control: ControlPlane,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), AppError>>,
}

impl Daemon {
    fn start() -> Self {
        let registry = Arc::new(MappingRegistry::new());
        let factory = Arc::new(SocketListenerFactory::new(fast_settings()));
        let manager = ListenerManager::new(registry.clone(), factory, Duration::from_millis(200));
        let control = ControlPlane::new(registry, manager.reports(), Duration::from_secs(5));

        let (shutdown, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(manager.run_with_shutdown(async {
            let _ = rx.await;
        }));
        Self {
            control,
            shutdown,
            handle,
        }
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

async fn echo_via(port: u16, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn test_added_mapping_relays_immediately() {
    let daemon = Daemon::start();
    let echo = spawn_tcp_echo().await;
    let port = free_port().await;

    let view = daemon
        .control
        .add(NewMapping::new(
            format!("127.0.0.1:{}", port),
            echo.to_string(),
            MappingType::Tcp,
        ))
        .await
        .unwrap();
    assert_eq!(view.listeners[0].state, ListenerState::Running);

    // 返回成功时端口已经在监听
    assert_eq!(echo_via(port, b"GET / HTTP/1.0\r\n\r\n").await, b"GET / HTTP/1.0\r\n\r\n");

    daemon
        .control
        .delete(&format!("127.0.0.1:{}", port), Some(MappingType::Tcp))
        .await
        .unwrap();

    // 删除返回后不再接受新连接
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());

    daemon.stop().await;
}

#[tokio::test]
async fn test_tcpudp_mapping_serves_both_transports() {
    let daemon = Daemon::start();
    let tcp_echo = spawn_tcp_echo().await;
    let udp_echo = spawn_udp_echo().await;
    let port = free_port().await;

    // 同一端口上 TCP 与 UDP 分别转发到不同后端
    daemon
        .control
        .add(NewMapping::new(
            format!("127.0.0.1:{}", port),
            tcp_echo.to_string(),
            MappingType::Tcp,
        ))
        .await
        .unwrap();
    daemon
        .control
        .add(NewMapping::new(
            format!("127.0.0.1:{}", port),
            udp_echo.to_string(),
            MappingType::Udp,
        ))
        .await
        .unwrap();

    assert_eq!(echo_via(port, b"tcp").await, b"tcp");
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let reply = udp_round_trip(&client, format!("127.0.0.1:{}", port).parse().unwrap(), b"udp")
        .await
        .unwrap();
    assert_eq!(reply, b"udp");

    daemon
        .control
        .delete(&format!("127.0.0.1:{}", port), None)
        .await
        .unwrap();
    assert!(daemon.control.query().is_empty());

    daemon.stop().await;
}

#[tokio::test]
async fn test_port_in_use_is_reported_as_bind_failure() {
    let daemon = Daemon::start();
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listen = taken.local_addr().unwrap().to_string();

    let err = daemon
        .control
        .add(NewMapping::new(listen.clone(), "127.0.0.1:9", MappingType::Tcp))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BindFailure { .. }));

    let views = daemon.control.query();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].listeners[0].state, ListenerState::Failed);
    assert!(views[0].listeners[0].error.is_some());

    // 端口释放后重新添加即可成功
    drop(taken);
    let view = daemon
        .control
        .add(NewMapping::new(listen, "127.0.0.1:9", MappingType::Tcp))
        .await
        .unwrap();
    assert_eq!(view.listeners[0].state, ListenerState::Running);

    daemon.stop().await;
}

#[tokio::test]
async fn test_shutdown_with_open_flow_ends_within_shutdown_grace() {
    let registry = Arc::new(MappingRegistry::new());
    let factory = Arc::new(SocketListenerFactory::new(fast_settings()));
    let mut manager = ListenerManager::new(registry.clone(), factory, Duration::from_secs(30))
        .with_shutdown_grace(Duration::from_millis(300));

    let echo = spawn_tcp_echo().await;
    let port = free_port().await;
    registry
        .add(NewMapping::new(
            format!("127.0.0.1:{}", port),
            echo.to_string(),
            MappingType::Tcp,
        ))
        .unwrap();
    manager.reconcile().await;

    // 保持一个空闲的存量连接
    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();

    let started = Instant::now();
    manager.shutdown().await;
    assert!(started.elapsed() < Duration::from_millis(300) + Duration::from_secs(1));

    // 存量连接被强制关闭
    assert!(read_to_end(&mut client).await.is_empty());
}
