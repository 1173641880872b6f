//! Messaging engine: the single write path for chat messages.
//!
//! Every user message passes through [`MessagingEngine::send_message`], which
//! authorizes the sender against the room, validates the body, appends the
//! message and advances the room's activity timestamp. System messages use
//! [`MessagingEngine::append_system`], which skips the membership check and
//! always writes as the store.

use orderchat_shared::constants::clamp_page_size;
use orderchat_shared::dto::{has_more, HistoryPage, MessagePreview, MessageView};
use orderchat_shared::{ChatError, MessageType, Role};
use orderchat_store::{ChatMessage, ChatRoom, Database, NewMessage, SharedDatabase};
use tracing::{debug, info};
use uuid::Uuid;

use crate::rate_limit::SenderRateLimiter;
use crate::rooms::RoomManager;

/// A user message as submitted over HTTP or the socket.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub order_id: Uuid,
    pub body: String,
    pub message_type: MessageType,
}

#[derive(Debug, Clone, Copy)]
pub struct MessagingLimits {
    pub max_message_length: usize,
    pub block_sends_on_closed_rooms: bool,
}

#[derive(Clone)]
pub struct MessagingEngine {
    db: SharedDatabase,
    rooms: RoomManager,
    limiter: SenderRateLimiter,
    limits: MessagingLimits,
}

pub fn message_view(message: ChatMessage, order_id: Uuid) -> MessageView {
    MessageView {
        id: message.id,
        room_id: message.room_id,
        order_id,
        seq: message.seq,
        sender_id: message.sender_id,
        sender_type: message.sender_type,
        message: message.body,
        message_type: message.message_type,
        is_read: message.is_read,
        metadata: message.metadata,
        created_at: message.created_at,
    }
}

pub fn preview(message: ChatMessage) -> MessagePreview {
    MessagePreview {
        id: message.id,
        sender_type: message.sender_type,
        message: message.body,
        message_type: message.message_type,
        created_at: message.created_at,
    }
}

/// Trim and bound-check a message body.
pub fn validate_body(body: &str, max_len: usize) -> Result<String, ChatError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ChatError::validation("message", "Message cannot be empty"));
    }
    if trimmed.chars().count() > max_len {
        return Err(ChatError::validation(
            "message",
            format!("Message cannot exceed {max_len} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Unread messages in `room` addressed to `viewer`, i.e. sent by the other
/// side. `None` when the viewer is not a participant.
pub fn unread_count(
    db: &Database,
    room: &ChatRoom,
    viewer: Uuid,
) -> orderchat_store::Result<Option<u64>> {
    match room.role_of(viewer) {
        Some(role) => Ok(Some(db.count_unread_from(room.id, role.opposite())?)),
        None => Ok(None),
    }
}

impl MessagingEngine {
    pub fn new(
        db: SharedDatabase,
        rooms: RoomManager,
        limiter: SenderRateLimiter,
        limits: MessagingLimits,
    ) -> Self {
        Self {
            db,
            rooms,
            limiter,
            limits,
        }
    }

    /// Store a user's message. Returns the formatted message and the room it
    /// landed in, for the caller to broadcast.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        outgoing: OutgoingMessage,
    ) -> Result<(MessageView, ChatRoom), ChatError> {
        let (room, sender_type) = self.rooms.authorize(outgoing.order_id, sender_id).await?;

        if outgoing.message_type == MessageType::System {
            return Err(ChatError::validation(
                "messageType",
                "SYSTEM messages cannot be sent by users",
            ));
        }
        let body = validate_body(&outgoing.body, self.limits.max_message_length)?;

        if !room.is_active && self.limits.block_sends_on_closed_rooms {
            return Err(ChatError::RoomClosed);
        }

        if !self.limiter.check(&sender_id).await {
            debug!(sender = %sender_id, "Message rate limit exceeded");
            return Err(ChatError::RateLimited);
        }

        let new = NewMessage {
            room_id: room.id,
            sender_id,
            sender_type,
            body,
            message_type: outgoing.message_type,
            metadata: None,
        };
        let stored = self
            .db
            .call(move |db| db.append_message(&new))
            .await?;

        debug!(
            order = %room.order_id,
            message = %stored.id,
            seq = stored.seq,
            sender_type = %sender_type,
            "Message stored"
        );

        Ok((message_view(stored, room.order_id), room))
    }

    /// Write a SYSTEM message attributed to the room's store participant.
    /// The body is held to the same limits as user messages.
    pub async fn append_system(
        &self,
        room: &ChatRoom,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<MessageView, ChatError> {
        let text = validate_body(text, self.limits.max_message_length)?;

        let new = NewMessage {
            room_id: room.id,
            sender_id: room.store_id,
            sender_type: Role::Store,
            body: text,
            message_type: MessageType::System,
            metadata: Some(metadata),
        };
        let stored = self
            .db
            .call(move |db| db.append_message(&new))
            .await?;
        Ok(message_view(stored, room.order_id))
    }

    /// Newest-first page of a room's messages.
    pub async fn get_history(
        &self,
        order_id: Uuid,
        viewer_id: Uuid,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<HistoryPage, ChatError> {
        let (room, _) = self.rooms.authorize(order_id, viewer_id).await?;
        let limit = clamp_page_size(limit);
        let offset = offset.unwrap_or(0);

        let room_id = room.id;
        let (messages, total) = self
            .db
            .call(move |db| {
                let total = db.count_messages_for_room(room_id)?;
                let messages = db.get_messages_for_room(room_id, limit, offset)?;
                Ok((messages, total))
            })
            .await?;

        let messages: Vec<MessageView> = messages
            .into_iter()
            .map(|m| message_view(m, order_id))
            .collect();

        Ok(HistoryPage {
            has_more: has_more(total, offset, messages.len()),
            messages,
            total,
            limit,
            offset,
        })
    }

    /// Mark everything the other side sent as read. Returns the room, the
    /// viewer's role and how many messages changed.
    pub async fn mark_read(
        &self,
        order_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<(ChatRoom, Role, u64), ChatError> {
        let (room, role) = self.rooms.authorize(order_id, viewer_id).await?;
        let room_id = room.id;
        let changed = self
            .db
            .call(move |db| db.mark_read_from(room_id, role.opposite()))
            .await? as u64;

        if changed > 0 {
            info!(order = %order_id, reader = %viewer_id, count = changed, "Messages marked read");
        }
        Ok((room, role, changed))
    }
}
