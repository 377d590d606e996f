//! TCP 转发测试
use super::common::{
    fast_settings, forward_to, free_port, loopback_key, read_to_end, spawn_tcp_banner,
    spawn_tcp_echo,
};
use portrelay::error::AppError;
use portrelay::listener::ListenerHandle;
use portrelay::mapping::Transport;
use portrelay::relay::{connect_backend, TcpRelayListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn bind_relay(target: std::net::SocketAddr) -> TcpRelayListener {
    TcpRelayListener::bind(
        loopback_key(Transport::Tcp),
        forward_to(target),
        Arc::new(fast_settings()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_tcp_relay_round_trip() {
    let echo = spawn_tcp_echo().await;
    let relay = bind_relay(echo);

    let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
    client.write_all(b"hello through the relay").await.unwrap();

    let mut buf = [0u8; 23];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello through the relay");
}

#[tokio::test]
async fn test_tcp_relay_propagates_half_close() {
    let echo = spawn_tcp_echo().await;
    let relay = bind_relay(echo);

    let payload = vec![7u8; 64 * 1024];
    let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
    let (mut reader, mut writer) = client.split();

    let write = async {
        writer.write_all(&payload).await.unwrap();
        // 客户端关闭写方向，后端读到 EOF 后回显完毕并关闭
        writer.shutdown().await.unwrap();
    };
    let (_, echoed) = tokio::join!(write, read_to_end(&mut reader));
    assert_eq!(echoed.len(), payload.len());
    assert!(echoed.iter().all(|b| *b == 7));
}

#[tokio::test]
async fn test_tcp_relay_closes_client_when_backend_unreachable() {
    let closed_port = free_port().await;
    let relay = bind_relay(format!("127.0.0.1:{}", closed_port).parse().unwrap());

    let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
    let received = read_to_end(&mut client).await;
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_connect_backend_errors() {
    let closed_port = free_port().await;
    let target = format!("127.0.0.1:{}", closed_port).parse().unwrap();
    let err = connect_backend(&target, Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BackendUnreachable { .. }));
    assert_eq!(err.error_type(), "BackendUnreachable");
}

#[tokio::test]
async fn test_tcp_bind_conflict_is_bind_failure() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let key = portrelay::mapping::ListenerKey::new(taken.local_addr().unwrap(), Transport::Tcp);

    let err = TcpRelayListener::bind(
        key,
        "127.0.0.1:1".parse().unwrap(),
        Arc::new(fast_settings()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, AppError::BindFailure { .. }));
}

#[tokio::test]
async fn test_retarget_affects_only_new_flows() {
    let first = spawn_tcp_banner("first").await;
    let second = spawn_tcp_banner("second").await;
    let relay = bind_relay(first);

    let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
    assert_eq!(read_to_end(&mut client).await, b"first");

    relay.retarget(forward_to(second));
    let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
    assert_eq!(read_to_end(&mut client).await, b"second");
}

#[tokio::test]
async fn test_stop_accepting_releases_port_and_keeps_flows() {
    let echo = spawn_tcp_echo().await;
    let mut relay = bind_relay(echo);
    let addr = relay.local_addr();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();

    relay.stop_accepting().await;

    // 端口已释放，可以立即重新绑定
    let rebound = TcpListener::bind(addr).await.unwrap();
    drop(rebound);

    // 存量连接仍然可用
    client.write_all(b"pong").await.unwrap();
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    // 连接保持打开，宽限期结束后被强制关闭
    let forced = Box::new(relay).drain(Duration::from_millis(100)).await;
    assert_eq!(forced, 1);
    let rest = read_to_end(&mut client).await;
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_drain_returns_immediately_when_idle() {
    let echo = spawn_tcp_echo().await;
    let mut relay = bind_relay(echo);

    let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
    client.write_all(b"bye").await.unwrap();
    client.shutdown().await.unwrap();
    assert_eq!(read_to_end(&mut client).await, b"bye");

    relay.stop_accepting().await;
    let forced = tokio::time::timeout(
        Duration::from_secs(2),
        Box::new(relay).drain(Duration::from_secs(30)),
    )
    .await
    .unwrap();
    assert_eq!(forced, 0);
}
