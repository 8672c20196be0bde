//! 聊天室系统核心领域模型
//!
//! 包含用户、聊天室、消息等核心实体，以及房间码等值对象和错误定义。

pub mod chat_room;
pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use chat_room::ChatRoom;
pub use errors::{DomainError, RepositoryError};
pub use message::Message;
pub use user::User;
pub use value_objects::{
    MessageContent, MessageId, PasswordHash, RoomCode, RoomId, Timestamp, UserEmail, UserId,
    Username,
};
