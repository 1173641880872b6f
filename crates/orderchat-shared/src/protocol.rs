//! Realtime wire protocol.
//!
//! Every frame is a JSON text frame of the form
//! `{"event": "<snake_case name>", "data": {...}}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::MessageView;
use crate::types::{MessageType, Role};

/// Events a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        order_id: Uuid,
    },
    LeaveRoom {
        order_id: Uuid,
    },
    SendMessage {
        order_id: Uuid,
        message: String,
        #[serde(default)]
        message_type: Option<MessageType>,
    },
    TypingStart {
        order_id: Uuid,
    },
    TypingStop {
        order_id: Uuid,
    },
    MarkRead {
        order_id: Uuid,
    },
}

impl ClientEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::JoinRoom { order_id }
            | Self::LeaveRoom { order_id }
            | Self::SendMessage { order_id, .. }
            | Self::TypingStart { order_id }
            | Self::TypingStop { order_id }
            | Self::MarkRead { order_id } => *order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::SendMessage { .. } => "send_message",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::MarkRead { .. } => "mark_read",
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// A user's presence in an order group, as announced to the other members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub role: Role,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ServerEvent {
    JoinedRoom {
        order_id: Uuid,
        room_id: Uuid,
        role: Role,
    },
    UserJoined(PresenceNotice),
    /// Also an implicit `typing_stop` for that user.
    UserLeft(PresenceNotice),
    NewMessage(MessageView),
    TypingStart(PresenceNotice),
    TypingStop(PresenceNotice),
    MessagesRead {
        order_id: Uuid,
        reader_id: Uuid,
        reader_role: Role,
        count: u64,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_shape() {
        let order_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"event":"send_message","data":{{"orderId":"{order_id}","message":"Hello"}}}}"#
        );
        let event = ClientEvent::from_json(&raw).unwrap();

        assert_eq!(
            event,
            ClientEvent::SendMessage {
                order_id,
                message: "Hello".into(),
                message_type: None,
            }
        );
        assert_eq!(event.order_id(), order_id);
        assert_eq!(event.name(), "send_message");
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let raw = r#"{"event":"delete_room","data":{"orderId":"x"}}"#;
        assert!(ClientEvent::from_json(raw).is_err());
    }

    #[test]
    fn test_server_event_wire_shape() {
        let notice = PresenceNotice {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "Bob's Burgers".into(),
            role: Role::Store,
        };
        let json: serde_json::Value =
            serde_json::from_str(&ServerEvent::TypingStart(notice.clone()).to_json().unwrap())
                .unwrap();

        assert_eq!(json["event"], "typing_start");
        assert_eq!(json["data"]["userName"], "Bob's Burgers");
        assert_eq!(json["data"]["role"], "STORE");

        let err: serde_json::Value =
            serde_json::from_str(&ServerEvent::error("nope").to_json().unwrap()).unwrap();
        assert_eq!(err["event"], "error");
        assert_eq!(err["data"]["message"], "nope");
    }
}
