//! Offline-recipient notifications.
//!
//! When a message lands and the other participant has no live connection in
//! the order's group, the hub hands a [`ChatNotification`] to a [`Notifier`].
//! Delivery (push, email, ...) belongs to another service; the server only
//! ships a logging implementation.

use orderchat_shared::{MessageType, Role};
use tracing::debug;
use uuid::Uuid;

/// Longest preview carried in a notification, in characters.
const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatNotification {
    pub recipient_id: Uuid,
    pub order_id: Uuid,
    pub room_id: Uuid,
    pub sender_type: Role,
    pub message_type: MessageType,
    pub preview: String,
}

impl ChatNotification {
    pub fn preview_of(body: &str) -> String {
        if body.chars().count() <= PREVIEW_CHARS {
            return body.to_string();
        }
        let mut cut: String = body.chars().take(PREVIEW_CHARS).collect();
        cut.push('…');
        cut
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: ChatNotification);
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: ChatNotification) {
        debug!(
            recipient = %n.recipient_id,
            order = %n.order_id,
            sender_type = %n.sender_type,
            message_type = n.message_type.as_str(),
            "Recipient offline, notification queued"
        );
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_bodies() {
        assert_eq!(ChatNotification::preview_of("short"), "short");

        let long = "é".repeat(200);
        let preview = ChatNotification::preview_of(&long);
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 1);
        assert!(preview.ends_with('…'));
    }
}
