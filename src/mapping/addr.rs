use crate::error::AppError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

/// 拆分 `host:port`，支持 `[v6]:port` 与 `:port`
fn split_host_port(s: &str) -> Result<(&str, &str), AppError> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, port) = rest
            .split_once("]:")
            .ok_or_else(|| AppError::InvalidAddress(format!("'{}' is missing a port", s)))?;
        return Ok((host, port));
    }

    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| AppError::InvalidAddress(format!("'{}' is missing a port", s)))?;

    // 未加方括号的 IPv6 地址无法与端口区分
    if host.contains(':') {
        return Err(AppError::InvalidAddress(format!(
            "IPv6 host in '{}' must be enclosed in brackets",
            s
        )));
    }

    Ok((host, port))
}

fn parse_port(s: &str, port: &str) -> Result<u16, AppError> {
    let port: u16 = port
        .parse()
        .map_err(|_| AppError::InvalidAddress(format!("'{}' has an invalid port", s)))?;
    if port == 0 {
        return Err(AppError::InvalidAddress(format!(
            "'{}' must use a non-zero port",
            s
        )));
    }
    Ok(port)
}

/// 监听地址：`host:port` 或 `:port`（所有网卡）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    raw: String,
    socket: SocketAddr,
}

impl ListenAddr {
    pub fn socket_addr(&self) -> SocketAddr {
        self.socket
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ListenAddr {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AppError::InvalidAddress(
                "listen address cannot be empty".to_string(),
            ));
        }

        let (host, port) = split_host_port(s)?;
        let port = parse_port(s, port)?;

        let ip = if host.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else if host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            host.parse().map_err(|_| {
                AppError::InvalidAddress(format!(
                    "listen host '{}' must be an IP address or 'localhost'",
                    host
                ))
            })?
        };

        Ok(Self {
            raw: s.to_string(),
            socket: SocketAddr::new(ip, port),
        })
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for ListenAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// 转发目标地址：`host:port`，host 可以是域名，在拨号时解析
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForwardAddr {
    host: String,
    port: u16,
}

impl ForwardAddr {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// 判断目标是否指回监听地址本身
    pub fn points_to(&self, listen: &ListenAddr) -> bool {
        let listen_socket = listen.socket_addr();
        if self.port != listen_socket.port() {
            return false;
        }

        let target_ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            match self.host.parse::<IpAddr>() {
                Ok(ip) => ip,
                // 域名只能在拨号时才知道
                Err(_) => return false,
            }
        };

        if listen_socket.ip().is_unspecified() {
            target_ip.is_loopback() || target_ip.is_unspecified()
        } else {
            target_ip == listen_socket.ip()
        }
    }
}

impl FromStr for ForwardAddr {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AppError::InvalidAddress(
                "forward address cannot be empty".to_string(),
            ));
        }

        let (host, port) = split_host_port(s)?;
        if host.is_empty() {
            return Err(AppError::InvalidAddress(format!(
                "forward address '{}' must include a host",
                s
            )));
        }
        let port = parse_port(s, port)?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ForwardAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Serialize for ForwardAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
