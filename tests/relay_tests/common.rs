//! 转发测试辅助模块

use portrelay::mapping::{ForwardAddr, ListenerKey, Transport};
use portrelay::relay::RelaySettings;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

// 缩短各类超时，便于测试
pub fn fast_settings() -> RelaySettings {
    RelaySettings {
        connect_timeout: Duration::from_millis(500),
        half_close_timeout: Duration::from_millis(500),
        udp_idle_timeout: Duration::from_millis(300),
        udp_max_sessions: 16,
        udp_queue_depth: 8,
        buffer_size: 4096,
        backlog: 128,
    }
}

pub fn loopback_key(transport: Transport) -> ListenerKey {
    ListenerKey::new("127.0.0.1:0".parse().unwrap(), transport)
}

pub fn forward_to(addr: SocketAddr) -> ForwardAddr {
    addr.to_string().parse().unwrap()
}

// 获取一个当前空闲的端口
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// TCP 回显服务，读到 EOF 后关闭连接
pub async fn spawn_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    addr
}

// 发送固定内容后关闭连接的 TCP 服务
pub async fn spawn_tcp_banner(banner: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = stream.write_all(banner.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

// UDP 回显服务
pub async fn spawn_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let _ = socket.send_to(&buf[..n], peer).await;
        }
    });
    addr
}

// 读取直到 EOF，带超时
pub async fn read_to_end<R: AsyncReadExt + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), reader.read_to_end(&mut out))
        .await
        .expect("read timed out")
        .unwrap_or_default();
    out
}

// 发送数据报并等待回复
pub async fn udp_round_trip(socket: &UdpSocket, to: SocketAddr, payload: &[u8]) -> Option<Vec<u8>> {
    socket.send_to(payload, to).await.unwrap();
    let mut buf = vec![0u8; 65535];
    match tokio::time::timeout(Duration::from_millis(500), socket.recv_from(&mut buf)).await {
        Ok(Ok((n, _))) => Some(buf[..n].to_vec()),
        _ => None,
    }
}
