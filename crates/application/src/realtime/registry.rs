//! 房间注册表：房间码 -> 在线连接集合
//!
//! 注册表完全位于进程内存中，与持久化的 [`domain::ChatRoom`] 相互独立：
//! 第一个连接加入时创建房间条目，最后一个连接离开时删除。
//! 房间索引与连接索引放在同一把读写锁后面，二者始终一致。

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use domain::RoomCode;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::events::ServerEvent;

/// 连接的出站通道
pub type Outbox = mpsc::Sender<ServerEvent>;

/// 单条 WebSocket 连接的标识，与账号无关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

#[derive(Default)]
struct ConnectionEntry {
    outbox: Option<Outbox>,
    rooms: HashSet<RoomCode>,
}

#[derive(Default)]
struct RegistryState {
    /// 房间码 -> (连接 -> 显示名)
    rooms: HashMap<RoomCode, HashMap<ConnectionId, String>>,
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

#[derive(Default)]
pub struct RoomRegistry {
    state: RwLock<RegistryState>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新连接的出站通道
    pub async fn attach(&self, connection: ConnectionId, outbox: Outbox) {
        let mut state = self.state.write().await;
        state.connections.entry(connection).or_default().outbox = Some(outbox);
    }

    /// 加入房间。重复加入是幂等的，只刷新显示名。
    pub async fn join(&self, room: &RoomCode, connection: ConnectionId, display_name: &str) {
        let mut state = self.state.write().await;
        state
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(connection, display_name.to_owned());
        state
            .connections
            .entry(connection)
            .or_default()
            .rooms
            .insert(room.clone());
    }

    /// 离开房间，连接原本不在房间内时返回 `false`
    pub async fn leave(&self, room: &RoomCode, connection: ConnectionId) -> bool {
        let mut state = self.state.write().await;
        let removed = match state.rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(&connection).is_some();
                if members.is_empty() {
                    state.rooms.remove(room);
                }
                removed
            }
            None => false,
        };
        if let Some(entry) = state.connections.get_mut(&connection) {
            entry.rooms.remove(room);
        }
        removed
    }

    pub async fn members(&self, room: &RoomCode) -> HashSet<ConnectionId> {
        let state = self.state.read().await;
        state
            .rooms
            .get(room)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// 房间成员及其出站通道的快照，`exclude` 指定的连接不在其中。
    /// 尚未登记出站通道的成员会被跳过。
    pub async fn recipients(
        &self,
        room: &RoomCode,
        exclude: Option<ConnectionId>,
    ) -> Vec<(ConnectionId, Outbox)> {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room) else {
            return Vec::new();
        };
        members
            .keys()
            .filter(|id| Some(**id) != exclude)
            .filter_map(|id| {
                let outbox = state.connections.get(id)?.outbox.clone()?;
                Some((*id, outbox))
            })
            .collect()
    }

    /// 将连接从所有房间移除并丢弃其出站通道，返回它曾所在的房间（有序）
    pub async fn disconnect_all(&self, connection: ConnectionId) -> Vec<RoomCode> {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.remove(&connection) else {
            return Vec::new();
        };

        let mut rooms: Vec<RoomCode> = entry.rooms.into_iter().collect();
        rooms.sort();
        for room in &rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(&connection);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
        rooms
    }

    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    pub async fn member_count(&self, room: &RoomCode) -> usize {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, HashMap::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}
