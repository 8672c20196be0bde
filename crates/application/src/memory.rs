//! 进程内仓储，用于 `memory://` 开发模式与各层测试。
//!
//! 唯一约束与 PostgreSQL 实现保持一致，冲突时返回同样的
//! [`RepositoryError::Conflict`]。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use domain::{
    ChatRoom, Message, RepositoryError, RoomCode, RoomId, User, UserEmail, UserId, Username,
};
use tokio::sync::RwLock;

use crate::repository::{ChatRoomRepository, MessageRepository, UserRepository};

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::conflict("username"));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::conflict("email"));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| &u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| &u.email == email).cloned())
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| {
            (a.created_at, a.username.as_str()).cmp(&(b.created_at, b.username.as_str()))
        });
        Ok(users)
    }
}

/// 房间按房间码索引
#[derive(Default)]
pub struct MemoryChatRoomRepository {
    rooms: RwLock<HashMap<RoomCode, ChatRoom>>,
}

impl MemoryChatRoomRepository {
    /// 以一组已存在的房间初始化
    pub fn with_rooms(rooms: impl IntoIterator<Item = ChatRoom>) -> Self {
        Self {
            rooms: RwLock::new(
                rooms
                    .into_iter()
                    .map(|room| (room.code.clone(), room))
                    .collect(),
            ),
        }
    }

    async fn sorted(&self, active_only: bool) -> Vec<ChatRoom> {
        let mut rooms: Vec<ChatRoom> = self
            .rooms
            .read()
            .await
            .values()
            .filter(|room| room.is_active || !active_only)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| (a.created_at, &a.code).cmp(&(b.created_at, &b.code)));
        rooms
    }
}

#[async_trait]
impl ChatRoomRepository for MemoryChatRoomRepository {
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.code) {
            return Err(RepositoryError::conflict("code"));
        }
        rooms.insert(room.code.clone(), room.clone());
        Ok(room)
    }

    async fn find_by_code(&self, code: &RoomCode) -> Result<Option<ChatRoom>, RepositoryError> {
        Ok(self.rooms.read().await.get(code).cloned())
    }

    async fn find_active_by_code(
        &self,
        code: &RoomCode,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(code).filter(|room| room.is_active).cloned())
    }

    async fn list_active(&self) -> Result<Vec<ChatRoom>, RepositoryError> {
        Ok(self.sorted(true).await)
    }

    async fn list_all(&self) -> Result<Vec<ChatRoom>, RepositoryError> {
        Ok(self.sorted(false).await)
    }

    async fn deactivate(&self, code: &RoomCode) -> Result<ChatRoom, RepositoryError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(code).ok_or(RepositoryError::NotFound)?;
        room.deactivate();
        Ok(room.clone())
    }
}

#[derive(Default)]
pub struct MemoryMessageRepository {
    messages: RwLock<HashMap<RoomId, Vec<Message>>>,
}

impl MemoryMessageRepository {
    /// 所有房间的消息总数
    pub async fn count(&self) -> usize {
        self.messages.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut messages = self.messages.write().await;
        let room = messages.entry(message.room_id).or_default();
        // 保持按时间有序插入
        let position = room.partition_point(|m| m.created_at <= message.created_at);
        room.insert(position, message.clone());
        Ok(message)
    }

    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .messages
            .read()
            .await
            .get(&room_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// 内存仓储集合
#[derive(Clone, Default)]
pub struct MemoryStorage {
    pub user_repository: Arc<MemoryUserRepository>,
    pub room_repository: Arc<MemoryChatRoomRepository>,
    pub message_repository: Arc<MemoryMessageRepository>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}
