//! Records persisted in the chat database.

use chrono::{DateTime, Utc};
use orderchat_shared::{MessageType, OrderStatus, Role};
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Order directory
// ---------------------------------------------------------------------------

/// Display info for a user, mirrored from the auth service.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoreRecord {
    pub id: Uuid,
    /// The user who speaks for the store in chat rooms.
    pub owner_id: Uuid,
    pub name: String,
}

/// An order as the chat core sees it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub store_id: Uuid,
    /// Resolved through `stores.owner_id`.
    pub store_owner_id: Uuid,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat room
// ---------------------------------------------------------------------------

/// The chat channel bound to one order. Participants never change.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatRoom {
    pub id: Uuid,
    pub order_id: Uuid,
    pub client_id: Uuid,
    /// The store's owning user.
    pub store_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        Role::of(self.client_id, self.store_id, user_id)
    }

    pub fn participant(&self, role: Role) -> Uuid {
        match role {
            Role::Client => self.client_id,
            Role::Store => self.store_id,
        }
    }
}

/// Listing filter for a user's rooms.
#[derive(Debug, Clone, Default)]
pub struct RoomFilter {
    pub is_active: Option<bool>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub created_to: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

// ---------------------------------------------------------------------------
// Chat message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    /// Store-assigned sequence; canonical order within a room.
    pub seq: i64,
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_type: Role,
    pub body: String,
    pub message_type: MessageType,
    pub is_read: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_type: Role,
    pub body: String,
    pub message_type: MessageType,
    pub metadata: Option<serde_json::Value>,
}
