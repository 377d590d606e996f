use crate::error::AppError;
use crate::mapping::{
    ForwardAddr, ListenAddr, ListenerKey, ListenerState, ListenerStatus, ListenerView, MappingRule,
    MappingType, MappingView, NewMapping, Transport,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// 注册表快照
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    // 快照对应的版本
    pub revision: u64,
    // 按插入顺序排列的规则
    pub rules: Vec<MappingRule>,
}

/// 新增规则的结果
#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub rule: MappingRule,
    pub revision: u64,
    // 是否替换了已有规则
    pub replaced: bool,
}

/// 删除规则的结果
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    // 被移除的监听器
    pub removed: Vec<ListenerKey>,
    pub revision: u64,
}

#[derive(Default)]
struct RegistryState {
    rules: Vec<MappingRule>,
    listeners: HashMap<ListenerKey, ListenerStatus>,
    revision: u64,
}

impl RegistryState {
    fn owns(&self, key: &ListenerKey) -> bool {
        self.rules.iter().any(|rule| {
            rule.listen_addr.socket_addr() == key.addr && rule.mapping_type.contains(key.transport)
        })
    }

    fn view(&self, rule: &MappingRule) -> MappingView {
        let listeners = rule
            .listener_keys()
            .map(|key| {
                let status = self
                    .listeners
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| ListenerStatus::new(ListenerState::Starting));
                ListenerView {
                    protocol: key.transport,
                    state: status.state,
                    error: status.error,
                }
            })
            .collect();

        MappingView {
            id: rule.id.clone(),
            listen_addr: rule.listen_addr.to_string(),
            forward_addr: rule.forward_addr.to_string(),
            mapping_type: rule.mapping_type,
            temp: rule.temporary,
            listeners,
        }
    }
}

/// 映射注册表
///
/// 所有修改在写锁内串行执行，并在持锁期间发布新的版本号，
/// 因此订阅者观察到的版本顺序与修改顺序一致。
pub struct MappingRegistry {
    state: RwLock<RegistryState>,
    revision_tx: watch::Sender<u64>,
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingRegistry {
    // 创建空注册表
    pub fn new() -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            state: RwLock::new(RegistryState::default()),
            revision_tx,
        }
    }

    /// 新增或替换映射规则
    ///
    /// 同一监听地址、同一映射类型的规则会被原地替换（保留 ID 与位置）；
    /// 与其他映射类型的规则存在协议重叠时返回 `PortConflict`。
    pub fn add(&self, request: NewMapping) -> Result<AddOutcome, AppError> {
        let listen: ListenAddr = request.listen_addr.parse()?;
        let forward: ForwardAddr = request.forward_addr.parse()?;

        if forward.points_to(&listen) {
            return Err(AppError::InvalidAddress(format!(
                "forward address {} points back to listen address {}",
                forward, listen
            )));
        }

        let socket = listen.socket_addr();
        let mut state = self.state.write();

        let mut replace_index = None;
        for (index, rule) in state.rules.iter().enumerate() {
            if rule.listen_addr.socket_addr() != socket
                || !rule.mapping_type.overlaps(request.mapping_type)
            {
                continue;
            }
            if rule.mapping_type != request.mapping_type {
                return Err(AppError::PortConflict(format!(
                    "{} is already mapped as {}",
                    listen, rule.mapping_type
                )));
            }
            replace_index = Some(index);
        }

        let revision = state.revision + 1;
        let outcome = match replace_index {
            Some(index) => {
                let rule = &mut state.rules[index];
                rule.forward_addr = forward;
                rule.temporary = request.temporary;
                rule.generation = revision;
                let rule = rule.clone();

                // 之前绑定失败的监听器会重新尝试
                for key in rule.listener_keys() {
                    if let Some(status) = state.listeners.get_mut(&key) {
                        if status.state == ListenerState::Failed {
                            *status = ListenerStatus::new(ListenerState::Starting);
                        }
                    }
                }

                info!(
                    "Mapping {} ({}) replaced, now forwarding to {}",
                    rule.listen_addr, rule.mapping_type, rule.forward_addr
                );
                AddOutcome {
                    rule,
                    revision,
                    replaced: true,
                }
            }
            None => {
                let rule = MappingRule {
                    id: Uuid::new_v4().to_string(),
                    listen_addr: listen,
                    forward_addr: forward,
                    mapping_type: request.mapping_type,
                    temporary: request.temporary,
                    generation: revision,
                };
                for key in rule.listener_keys() {
                    state
                        .listeners
                        .insert(key, ListenerStatus::new(ListenerState::Starting));
                }
                state.rules.push(rule.clone());

                info!(
                    "Mapping {} ({}) added, forwarding to {}",
                    rule.listen_addr, rule.mapping_type, rule.forward_addr
                );
                AddOutcome {
                    rule,
                    revision,
                    replaced: false,
                }
            }
        };

        state.revision = revision;
        self.revision_tx.send_replace(revision);
        Ok(outcome)
    }

    /// 删除监听地址上指定协议的映射
    ///
    /// 只删除实际存在的协议，例如对只有 `tcp` 规则的地址删除 `tcpudp`
    /// 时移除 TCP。所有请求的协议都不存在时返回 `NotFound`，不做任何修改。
    /// `tcpudp` 规则删除其中一个协议后收窄为另一个协议。
    pub fn delete(
        &self,
        listen_addr: &str,
        mapping_type: MappingType,
    ) -> Result<DeleteOutcome, AppError> {
        let listen: ListenAddr = listen_addr.parse()?;
        let socket = listen.socket_addr();
        let mut state = self.state.write();

        let owned = |transport: Transport| {
            mapping_type.contains(transport) && state.owns(&ListenerKey::new(socket, transport))
        };
        let present = MappingType::from_transports(owned(Transport::Tcp), owned(Transport::Udp))
            .ok_or_else(|| {
                AppError::NotFound(format!("no {} mapping on {}", mapping_type, listen))
            })?;

        let outcome = self.remove_locked(&mut state, socket, present);
        info!("Mapping {} ({}) deleted", listen, present);
        Ok(outcome)
    }

    /// 删除监听地址上的全部映射，不区分协议
    pub fn delete_address(&self, listen_addr: &str) -> Result<DeleteOutcome, AppError> {
        self.delete(listen_addr, MappingType::TcpUdp)
    }

    // 在写锁内移除协议并发布新版本，调用方已确认协议存在
    fn remove_locked(
        &self,
        state: &mut RegistryState,
        socket: SocketAddr,
        mapping_type: MappingType,
    ) -> DeleteOutcome {
        let mut removed = Vec::new();
        let RegistryState {
            rules, listeners, ..
        } = &mut *state;

        rules.retain_mut(|rule| {
            if rule.listen_addr.socket_addr() != socket {
                return true;
            }
            for transport in mapping_type.transports() {
                if rule.mapping_type.contains(*transport) {
                    removed.push(ListenerKey::new(socket, *transport));
                }
            }
            match rule.mapping_type.without(mapping_type) {
                Some(rest) => {
                    debug!(
                        "Mapping {} narrowed from {} to {}",
                        rule.listen_addr, rule.mapping_type, rest
                    );
                    rule.mapping_type = rest;
                    true
                }
                None => false,
            }
        });

        for key in &removed {
            listeners.remove(key);
        }

        state.revision += 1;
        self.revision_tx.send_replace(state.revision);

        DeleteOutcome {
            removed,
            revision: state.revision,
        }
    }

    /// 查询所有规则（按插入顺序）
    pub fn query(&self) -> Vec<MappingView> {
        let state = self.state.read();
        state.rules.iter().map(|rule| state.view(rule)).collect()
    }

    /// 查询单条规则的视图
    pub fn view(&self, id: &str) -> Option<MappingView> {
        let state = self.state.read();
        state
            .rules
            .iter()
            .find(|rule| rule.id == id)
            .map(|rule| state.view(rule))
    }

    /// 获取一致性快照
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read();
        RegistrySnapshot {
            revision: state.revision,
            rules: state.rules.clone(),
        }
    }

    /// 订阅版本变化
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    pub fn len(&self) -> usize {
        self.state.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 更新监听器运行状态，规则已不存在时忽略
    pub fn set_listener_status(&self, key: ListenerKey, status: ListenerStatus) {
        let mut state = self.state.write();
        if state.owns(&key) {
            state.listeners.insert(key, status);
        }
    }

    pub fn listener_status(&self, key: &ListenerKey) -> Option<ListenerStatus> {
        self.state.read().listeners.get(key).cloned()
    }
}
