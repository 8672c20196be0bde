use crate::errors::DomainError;
use crate::value_objects::{RoomCode, RoomId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRoom {
    pub id: RoomId,
    pub name: String,
    pub code: RoomCode,
    pub created_by: UserId,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl ChatRoom {
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        code: RoomCode,
        created_by: UserId,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let name = Self::validate_name(name.into())?;
        Ok(Self {
            id,
            name,
            code,
            created_by,
            is_active: true,
            created_at,
        })
    }

    /// 软停用。房间记录保留，房间码不会被复用。
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    fn validate_name(name: String) -> Result<String, DomainError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument(
                "room_name",
                "cannot be empty",
            ));
        }
        if trimmed.chars().count() > 100 {
            return Err(DomainError::invalid_argument("room_name", "too long"));
        }
        Ok(trimmed.to_owned())
    }
}
