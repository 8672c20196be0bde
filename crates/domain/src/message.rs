use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 已持久化的聊天消息，创建后不可变。
///
/// `author_name` 在发送时反规范化写入，之后用户信息变化不影响历史消息。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        author_id: UserId,
        author_name: impl Into<String>,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            author_id,
            author_name: author_name.into(),
            content,
            created_at,
        }
    }
}
