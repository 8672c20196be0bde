//! WebSocket 帧格式：`{"event": <name>, "data": <payload>}`

use domain::RoomCode;
use serde::{Deserialize, Serialize};

/// 客户端发往服务端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Join { room: RoomCode },
    Leave { room: RoomCode },
    Typing { room: RoomCode },
    SendMessage { room: RoomCode, message: String },
}

impl ClientEvent {
    pub fn room(&self) -> &RoomCode {
        match self {
            Self::Join { room }
            | Self::Leave { room }
            | Self::Typing { room }
            | Self::SendMessage { room, .. } => room,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Typing { .. } => "typing",
            Self::SendMessage { .. } => "send_message",
        }
    }
}

/// 服务端推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Status { msg: String },
    Typing { username: String },
    ReceiveMessage { username: String, message: String },
}

impl ServerEvent {
    pub fn joined(display_name: &str) -> Self {
        Self::Status {
            msg: format!("{display_name} joined the room"),
        }
    }

    pub fn left(display_name: &str) -> Self {
        Self::Status {
            msg: format!("{display_name} left the room"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_parse_from_tagged_frames() {
        let frame = json!({"event": "send_message", "data": {"room": "R1", "message": "hi"}});
        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                room: RoomCode::parse("R1").unwrap(),
                message: "hi".into(),
            }
        );

        let frame = json!({"event": "typing", "data": {"room": "R1"}});
        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        assert_eq!(event.name(), "typing");
    }

    #[test]
    fn invalid_room_code_is_rejected_at_parse_time() {
        let frame = json!({"event": "join", "data": {"room": "no spaces"}});
        assert!(serde_json::from_value::<ClientEvent>(frame).is_err());

        let frame = json!({"event": "shout", "data": {"room": "R1"}});
        assert!(serde_json::from_value::<ClientEvent>(frame).is_err());
    }

    #[test]
    fn server_events_serialize_with_event_and_data() {
        let value = serde_json::to_value(ServerEvent::ReceiveMessage {
            username: "A".into(),
            message: "hi".into(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"event": "receive_message", "data": {"username": "A", "message": "hi"}})
        );

        let value = serde_json::to_value(ServerEvent::joined("bob")).unwrap();
        assert_eq!(
            value,
            json!({"event": "status", "data": {"msg": "bob joined the room"}})
        );
    }
}
