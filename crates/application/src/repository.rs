//! 持久化存储的抽象接口，由基础设施层实现。
//!
//! 所有查询都是精确匹配；唯一约束冲突以 [`RepositoryError::Conflict`]
//! 返回，`constraint` 取值为 `username`、`email` 或 `code`。

use async_trait::async_trait;
use domain::{
    ChatRoom, Message, RepositoryError, RoomCode, RoomId, User, UserEmail, UserId, Username,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &Username)
        -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError>;
    async fn find_by_code(&self, code: &RoomCode) -> Result<Option<ChatRoom>, RepositoryError>;
    async fn find_active_by_code(
        &self,
        code: &RoomCode,
    ) -> Result<Option<ChatRoom>, RepositoryError>;
    async fn list_active(&self) -> Result<Vec<ChatRoom>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<ChatRoom>, RepositoryError>;
    /// 软停用房间，房间不存在时返回 [`RepositoryError::NotFound`]
    async fn deactivate(&self, code: &RoomCode) -> Result<ChatRoom, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError>;
    /// 按创建时间升序返回房间内全部消息
    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<Message>, RepositoryError>;
}
