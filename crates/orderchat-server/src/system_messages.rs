//! System message injection.
//!
//! Order lifecycle narration ("Your order has been confirmed") is written
//! into the room as a SYSTEM message from the store side and broadcast like
//! any other message. Membership is not checked here; callers that act on
//! behalf of a user go through [`SystemMessageInjector::post_as`].

use orderchat_shared::dto::MessageView;
use orderchat_shared::identity::Identity;
use orderchat_shared::{ChatError, Role, SystemEventType};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::messaging::MessagingEngine;
use crate::realtime::RealtimeHub;
use crate::rooms::RoomManager;

#[derive(Clone)]
pub struct SystemMessageInjector {
    rooms: RoomManager,
    messaging: MessagingEngine,
    hub: RealtimeHub,
}

impl SystemMessageInjector {
    pub fn new(rooms: RoomManager, messaging: MessagingEngine, hub: RealtimeHub) -> Self {
        Self {
            rooms,
            messaging,
            hub,
        }
    }

    /// Write and broadcast a SYSTEM message into the order's room.
    pub async fn post_system_message(
        &self,
        order_id: Uuid,
        event_type: SystemEventType,
        text: &str,
        details: Option<Value>,
    ) -> Result<MessageView, ChatError> {
        let room = self.rooms.get_room_by_order(order_id).await?;
        let metadata = json!({
            "eventType": event_type.as_str(),
            "details": details.unwrap_or(Value::Null),
        });

        let message = self
            .messaging
            .append_system(&room, text, metadata)
            .await?;
        self.hub.publish_message(&room, &message).await;

        info!(order = %order_id, event = event_type.as_str(), "System message posted");
        Ok(message)
    }

    /// [`post_system_message`](Self::post_system_message) on behalf of a
    /// user, who must be the room's store participant or an admin.
    pub async fn post_as(
        &self,
        caller: &Identity,
        order_id: Uuid,
        event_type: SystemEventType,
        text: &str,
        details: Option<Value>,
    ) -> Result<MessageView, ChatError> {
        if !caller.is_admin() {
            let room = self.rooms.get_room_by_order(order_id).await?;
            match room.role_of(caller.user_id) {
                Some(Role::Store) => {}
                Some(Role::Client) => {
                    return Err(ChatError::Forbidden(
                        "Only the store can post system messages".to_string(),
                    ))
                }
                None => return Err(ChatError::room_not_found()),
            }
        }
        self.post_system_message(order_id, event_type, text, details)
            .await
    }
}
