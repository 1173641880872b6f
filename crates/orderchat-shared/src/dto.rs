//! Response shapes handed to HTTP and realtime clients.
//!
//! Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MessageType, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub room_id: Uuid,
    pub order_id: Uuid,
    /// Store-assigned position in the room; defines canonical order.
    pub seq: i64,
    pub sender_id: Uuid,
    pub sender_type: Role,
    pub message: String,
    pub message_type: MessageType,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub id: Uuid,
    pub sender_type: Role,
    pub message: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreParticipantView {
    /// The store's owning user, i.e. the room's `storeId` participant.
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub client: ParticipantView,
    pub store: StoreParticipantView,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<MessagePreview>,
    /// Present only when the room was fetched on behalf of a participant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    /// Newest first.
    pub messages: Vec<MessageView>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPage {
    pub rooms: Vec<RoomView>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStats {
    pub total_rooms: u64,
    pub active_rooms: u64,
    pub unread_messages: u64,
    pub messages_sent: u64,
}

/// Whether another page exists after `offset + returned` of `total`.
pub fn has_more(total: u64, offset: u32, returned: usize) -> bool {
    (offset as u64) + (returned as u64) < total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_more() {
        assert!(has_more(10, 0, 5));
        assert!(!has_more(10, 5, 5));
        assert!(!has_more(0, 0, 0));
    }

    #[test]
    fn test_room_view_serializes_camel_case() {
        let now = Utc::now();
        let view = RoomView {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            client: ParticipantView {
                user_id: Uuid::new_v4(),
                name: Some("Alice".into()),
            },
            store: StoreParticipantView {
                user_id: Uuid::new_v4(),
                store_id: None,
                name: None,
            },
            is_active: true,
            created_at: now,
            updated_at: now,
            last_message: None,
            unread_count: Some(3),
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["isActive"], true);
        assert_eq!(json["unreadCount"], 3);
        assert!(json.get("lastMessage").is_none());
        assert!(json["store"].get("storeId").is_none());
    }
}
