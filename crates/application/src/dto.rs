use domain::{ChatRoom, Message, Timestamp, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: Uuid::from(user.id),
            username: user.username.as_str().to_owned(),
            email: user.email.as_str().to_owned(),
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDto {
    pub code: String,
    pub name: String,
    pub created_by: Uuid,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
    /// 当前在线连接数，仅在房间详情中填充
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub online: Option<usize>,
}

impl From<&ChatRoom> for RoomDto {
    fn from(room: &ChatRoom) -> Self {
        Self {
            code: room.code.as_str().to_owned(),
            name: room.name.clone(),
            created_by: Uuid::from(room.created_by),
            is_active: room.is_active,
            created_at: room.created_at,
            online: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub author_id: Uuid,
    pub username: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: Uuid::from(message.id),
            author_id: Uuid::from(message.author_id),
            username: message.author_name.clone(),
            message: message.content.as_str().to_owned(),
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityDto {
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

impl From<&Identity> for IdentityDto {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: Uuid::from(identity.user_id),
            username: identity.display_name.clone(),
            is_admin: identity.is_admin,
        }
    }
}
