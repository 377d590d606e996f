// 映射规则数据模型
mod addr;

pub use self::addr::{ForwardAddr, ListenAddr};

use crate::r#const::mapping_types;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use utoipa::ToSchema;

/// 传输层协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => mapping_types::TCP,
            Transport::Udp => mapping_types::UDP,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 映射类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum MappingType {
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "udp")]
    Udp,
    #[serde(rename = "tcpudp", alias = "udptcp")]
    TcpUdp,
}

impl MappingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingType::Tcp => mapping_types::TCP,
            MappingType::Udp => mapping_types::UDP,
            MappingType::TcpUdp => mapping_types::TCP_UDP,
        }
    }

    /// 映射类型包含的传输协议
    pub fn transports(&self) -> &'static [Transport] {
        match self {
            MappingType::Tcp => &[Transport::Tcp],
            MappingType::Udp => &[Transport::Udp],
            MappingType::TcpUdp => &[Transport::Tcp, Transport::Udp],
        }
    }

    pub fn contains(&self, transport: Transport) -> bool {
        self.transports().contains(&transport)
    }

    pub fn overlaps(&self, other: MappingType) -> bool {
        self.transports().iter().any(|t| other.contains(*t))
    }

    /// 由协议集合还原映射类型，集合为空时返回 None
    pub fn from_transports(tcp: bool, udp: bool) -> Option<Self> {
        match (tcp, udp) {
            (true, true) => Some(MappingType::TcpUdp),
            (true, false) => Some(MappingType::Tcp),
            (false, true) => Some(MappingType::Udp),
            (false, false) => None,
        }
    }

    /// 去掉 `removed` 中的协议后剩余的映射类型
    pub fn without(&self, removed: MappingType) -> Option<Self> {
        Self::from_transports(
            self.contains(Transport::Tcp) && !removed.contains(Transport::Tcp),
            self.contains(Transport::Udp) && !removed.contains(Transport::Udp),
        )
    }
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 监听器标识：(监听地址, 协议)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerKey {
    pub addr: SocketAddr,
    pub transport: Transport,
}

impl ListenerKey {
    pub fn new(addr: SocketAddr, transport: Transport) -> Self {
        Self { addr, transport }
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transport, self.addr)
    }
}

/// 监听器运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// 监听器状态及失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerStatus {
    pub state: ListenerState,
    pub error: Option<String>,
}

impl ListenerStatus {
    pub fn new(state: ListenerState) -> Self {
        Self { state, error: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            state: ListenerState::Failed,
            error: Some(reason.into()),
        }
    }
}

/// 新增映射请求（未校验）
#[derive(Debug, Clone)]
pub struct NewMapping {
    pub listen_addr: String,
    pub forward_addr: String,
    pub mapping_type: MappingType,
    pub temporary: bool,
}

impl NewMapping {
    pub fn new(
        listen_addr: impl Into<String>,
        forward_addr: impl Into<String>,
        mapping_type: MappingType,
    ) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            forward_addr: forward_addr.into(),
            mapping_type,
            temporary: false,
        }
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }
}

/// 映射规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    // 规则 ID，替换时保持不变
    pub id: String,
    pub listen_addr: ListenAddr,
    pub forward_addr: ForwardAddr,
    pub mapping_type: MappingType,
    // 临时规则不写入状态文件
    pub temporary: bool,
    // 最近一次插入或替换时的注册表版本
    pub generation: u64,
}

impl MappingRule {
    /// 规则派生出的监听器标识
    pub fn listener_keys(&self) -> impl Iterator<Item = ListenerKey> + '_ {
        self.mapping_type
            .transports()
            .iter()
            .map(|t| ListenerKey::new(self.listen_addr.socket_addr(), *t))
    }
}

/// 单个监听器的对外视图
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerView {
    pub protocol: Transport,
    pub state: ListenerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 映射规则的对外视图（查询结果）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MappingView {
    pub id: String,
    pub listen_addr: String,
    pub forward_addr: String,
    pub mapping_type: MappingType,
    pub temp: bool,
    pub listeners: Vec<ListenerView>,
}
