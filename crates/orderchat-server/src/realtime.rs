//! Realtime hub: connection registry, order groups and typing state.
//!
//! Each authenticated socket registers a connection and receives events
//! through a bounded queue. A connection belongs to at most one order group
//! at a time. All maps live behind one `RwLock` and are only touched through
//! the hub's methods; nothing here hits the database. Fan-out to a group
//! holds the write lock, so every member sees broadcasts in the same order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use orderchat_shared::dto::MessageView;
use orderchat_shared::protocol::{PresenceNotice, ServerEvent};
use orderchat_shared::{ChatError, Role};
use orderchat_store::ChatRoom;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::notify::{ChatNotification, Notifier};

pub type ConnectionId = Uuid;

/// The order group a connection has joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub order_id: Uuid,
    pub room_id: Uuid,
    pub role: Role,
}

struct Connection {
    user_id: Uuid,
    user_name: String,
    tx: mpsc::Sender<ServerEvent>,
    joined: Option<Membership>,
}

impl Connection {
    fn presence(&self, membership: &Membership) -> PresenceNotice {
        PresenceNotice {
            order_id: membership.order_id,
            user_id: self.user_id,
            user_name: self.user_name.clone(),
            role: membership.role,
        }
    }
}

#[derive(Debug, Clone)]
struct TypingState {
    user_id: Uuid,
    role: Role,
    user_name: String,
    is_typing: bool,
}

impl TypingState {
    fn event(&self, order_id: Uuid) -> ServerEvent {
        let notice = PresenceNotice {
            order_id,
            user_id: self.user_id,
            user_name: self.user_name.clone(),
            role: self.role,
        };
        if self.is_typing {
            ServerEvent::TypingStart(notice)
        } else {
            ServerEvent::TypingStop(notice)
        }
    }
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Connection>,
    groups: HashMap<Uuid, HashSet<ConnectionId>>,
    typing: HashMap<ConnectionId, TypingState>,
}

impl HubState {
    fn deliver(&self, target: &ConnectionId, event: ServerEvent) {
        let Some(conn) = self.connections.get(target) else {
            return;
        };
        if conn.tx.try_send(event).is_err() {
            debug!(connection = %target, user = %conn.user_id, "Dropping event for slow connection");
        }
    }

    fn broadcast(&self, order_id: &Uuid, event: &ServerEvent, except: Option<ConnectionId>) {
        let Some(members) = self.groups.get(order_id) else {
            return;
        };
        for member in members {
            if Some(*member) == except {
                continue;
            }
            self.deliver(member, event.clone());
        }
    }

    /// Drop `conn` from its group and tell the rest. Returns the old membership.
    fn detach(&mut self, conn: ConnectionId) -> Option<Membership> {
        self.typing.remove(&conn);

        let connection = self.connections.get_mut(&conn)?;
        let membership = connection.joined.take()?;
        let notice = connection.presence(&membership);

        let now_empty = match self.groups.get_mut(&membership.order_id) {
            Some(members) => {
                members.remove(&conn);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.groups.remove(&membership.order_id);
        }

        self.broadcast(&membership.order_id, &ServerEvent::UserLeft(notice), None);
        Some(membership)
    }
}

fn not_joined() -> ChatError {
    ChatError::Forbidden("You have not joined this chat".to_string())
}

fn unknown_connection(conn: ConnectionId) -> ChatError {
    ChatError::Internal(format!("unknown connection {conn}"))
}

#[derive(Clone)]
pub struct RealtimeHub {
    state: Arc<RwLock<HubState>>,
    notifier: Arc<dyn Notifier>,
    buffer: usize,
}

impl RealtimeHub {
    pub fn new(notifier: Arc<dyn Notifier>, buffer: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(HubState::default())),
            notifier,
            buffer: buffer.max(1),
        }
    }

    /// Register an authenticated connection. The receiver yields every event
    /// addressed to it.
    pub async fn connect(
        &self,
        user_id: Uuid,
        user_name: String,
    ) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let conn = Uuid::new_v4();
        self.state.write().await.connections.insert(
            conn,
            Connection {
                user_id,
                user_name,
                tx,
                joined: None,
            },
        );
        debug!(connection = %conn, user = %user_id, "Realtime connection registered");
        (conn, rx)
    }

    /// Put the connection in the room's order group. The caller has already
    /// verified that the connection's user holds `role` in `room`.
    pub async fn join(&self, conn: ConnectionId, room: &ChatRoom, role: Role) -> Result<(), ChatError> {
        let membership = Membership {
            order_id: room.order_id,
            room_id: room.id,
            role,
        };
        let joined = ServerEvent::JoinedRoom {
            order_id: room.order_id,
            room_id: room.id,
            role,
        };

        let mut state = self.state.write().await;
        let current = state
            .connections
            .get(&conn)
            .ok_or_else(|| unknown_connection(conn))?
            .joined;

        if current.map(|m| m.order_id) == Some(room.order_id) {
            state.deliver(&conn, joined);
            return Ok(());
        }
        if current.is_some() {
            state.detach(conn);
        }

        let connection = state
            .connections
            .get_mut(&conn)
            .ok_or_else(|| unknown_connection(conn))?;
        connection.joined = Some(membership);
        let notice = connection.presence(&membership);
        let user_id = connection.user_id;

        state.groups.entry(room.order_id).or_default().insert(conn);
        state.deliver(&conn, joined);
        state.broadcast(&room.order_id, &ServerEvent::UserJoined(notice), Some(conn));

        info!(
            order = %membership.order_id,
            room = %membership.room_id,
            user = %user_id,
            role = %role,
            "Joined chat"
        );
        Ok(())
    }

    /// Leave `order_id`'s group. Errors when the connection is not in it.
    pub async fn leave(&self, conn: ConnectionId, order_id: Uuid) -> Result<(), ChatError> {
        let mut state = self.state.write().await;
        let current = state
            .connections
            .get(&conn)
            .ok_or_else(|| unknown_connection(conn))?
            .joined;
        if current.map(|m| m.order_id) != Some(order_id) {
            return Err(not_joined());
        }
        state.detach(conn);
        Ok(())
    }

    /// Tear the connection down. Typing state goes with it; `user_left`
    /// stands in for any pending typing stop.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let mut state = self.state.write().await;
        state.detach(conn);
        if let Some(connection) = state.connections.remove(&conn) {
            debug!(connection = %conn, user = %connection.user_id, "Realtime connection closed");
        }
    }

    /// Membership of `conn`, which must be joined to `order_id`.
    pub async fn require_joined(&self, conn: ConnectionId, order_id: Uuid) -> Result<Membership, ChatError> {
        let state = self.state.read().await;
        let connection = state
            .connections
            .get(&conn)
            .ok_or_else(|| unknown_connection(conn))?;
        match connection.joined {
            Some(m) if m.order_id == order_id => Ok(m),
            _ => Err(not_joined()),
        }
    }

    /// Relay a typing indicator to the rest of the connection's group.
    pub async fn set_typing(&self, conn: ConnectionId, order_id: Uuid, is_typing: bool) -> Result<(), ChatError> {
        let mut state = self.state.write().await;
        let connection = state
            .connections
            .get(&conn)
            .ok_or_else(|| unknown_connection(conn))?;
        let membership = match connection.joined {
            Some(m) if m.order_id == order_id => m,
            _ => return Err(not_joined()),
        };
        let typing = TypingState {
            user_id: connection.user_id,
            role: membership.role,
            user_name: connection.user_name.clone(),
            is_typing,
        };

        let event = typing.event(order_id);
        if is_typing {
            state.typing.insert(conn, typing);
        } else {
            state.typing.remove(&conn);
        }
        state.broadcast(&order_id, &event, Some(conn));
        Ok(())
    }

    pub async fn send_to(&self, conn: ConnectionId, event: ServerEvent) {
        self.state.read().await.deliver(&conn, event);
    }

    pub async fn broadcast(&self, order_id: Uuid, event: ServerEvent, except: Option<ConnectionId>) {
        self.state.write().await.broadcast(&order_id, &event, except);
    }

    /// Fan a stored message out to the whole group. If the other participant
    /// has no connection in the group, hand a notification to the notifier.
    pub async fn publish_message(&self, room: &ChatRoom, message: &MessageView) {
        let recipient = room.participant(message.sender_type.opposite());
        let recipient_present = {
            let state = self.state.write().await;
            state.broadcast(&room.order_id, &ServerEvent::NewMessage(message.clone()), None);
            Self::present_in(&state, room.order_id, recipient)
        };

        if !recipient_present {
            self.notifier.notify(ChatNotification {
                recipient_id: recipient,
                order_id: room.order_id,
                room_id: room.id,
                sender_type: message.sender_type,
                message_type: message.message_type,
                preview: ChatNotification::preview_of(&message.message),
            });
        }
    }

    pub async fn publish_read_receipt(
        &self,
        order_id: Uuid,
        reader_id: Uuid,
        reader_role: Role,
        count: u64,
        except: Option<ConnectionId>,
    ) {
        let event = ServerEvent::MessagesRead {
            order_id,
            reader_id,
            reader_role,
            count,
        };
        self.broadcast(order_id, event, except).await;
    }

    fn present_in(state: &HubState, order_id: Uuid, user_id: Uuid) -> bool {
        state.groups.get(&order_id).is_some_and(|members| {
            members.iter().any(|c| {
                state
                    .connections
                    .get(c)
                    .is_some_and(|conn| conn.user_id == user_id)
            })
        })
    }

    #[cfg(test)]
    pub async fn group_size(&self, order_id: Uuid) -> usize {
        self.state
            .read()
            .await
            .groups
            .get(&order_id)
            .map_or(0, HashSet::len)
    }

    #[cfg(test)]
    pub async fn is_typing(&self, conn: ConnectionId) -> bool {
        self.state
            .read()
            .await
            .typing
            .get(&conn)
            .is_some_and(|t| t.is_typing)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}
