//! Chat room manager.
//!
//! Creates and fetches the single room bound to each order, derives
//! participant roles, and hydrates rooms into [`RoomView`]s for clients.

use chrono::{DateTime, Utc};
use orderchat_shared::dto::{
    has_more, ChatStats, ParticipantView, RoomPage, RoomView, StoreParticipantView,
};
use orderchat_shared::{ChatError, Role};
use orderchat_store::{ChatRoom, Database, RoomFilter, SharedDatabase, StoreError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::messaging::{self, preview};

/// Role of `user_id` in `room`. Outsiders get the same error as a missing
/// room.
pub fn require_role(room: &ChatRoom, user_id: Uuid) -> Result<Role, ChatError> {
    room.role_of(user_id).ok_or_else(ChatError::room_not_found)
}

/// Map a store `NotFound` onto a named chat `NotFound`.
pub(crate) fn missing(what: &'static str) -> impl FnOnce(StoreError) -> ChatError {
    move |err| match err {
        StoreError::NotFound => ChatError::NotFound(what.to_string()),
        other => other.into(),
    }
}

/// Listing parameters as received from a caller, before validation.
#[derive(Debug, Clone, Default)]
pub struct RoomQuery {
    pub is_active: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Clone)]
pub struct RoomManager {
    db: SharedDatabase,
}

impl RoomManager {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Return the order's room, creating it on first use.
    ///
    /// The boolean is `true` when this call created the room.
    pub async fn create_or_get_room(&self, order_id: Uuid) -> Result<(RoomView, bool), ChatError> {
        self.open_room(order_id, None).await
    }

    /// [`create_or_get_room`](Self::create_or_get_room) on behalf of a
    /// user, who must be the order's buyer or the store owner. Anyone else
    /// sees the order as missing.
    pub async fn create_or_get_room_as(
        &self,
        order_id: Uuid,
        requester: Uuid,
    ) -> Result<(RoomView, bool), ChatError> {
        self.open_room(order_id, Some(requester)).await
    }

    async fn open_room(
        &self,
        order_id: Uuid,
        requester: Option<Uuid>,
    ) -> Result<(RoomView, bool), ChatError> {
        let (view, created) = self
            .db
            .call(move |db| {
                let order = db.get_order(order_id)?;
                if let Some(user) = requester {
                    if Role::of(order.buyer_id, order.store_owner_id, user).is_none() {
                        return Err(StoreError::NotFound);
                    }
                }
                let (room, created) =
                    db.insert_room_if_absent(order.id, order.buyer_id, order.store_owner_id)?;
                Ok((hydrate(db, room, requester)?, created))
            })
            .await
            .map_err(missing("Order"))?;

        if created {
            info!(order = %order_id, room = %view.id, "Chat room created");
        }
        Ok((view, created))
    }

    /// Raw room record for an order.
    pub async fn get_room_by_order(&self, order_id: Uuid) -> Result<ChatRoom, ChatError> {
        self.db
            .call(move |db| db.get_room_by_order(order_id))
            .await
            .map_err(missing("Chat room"))
    }

    /// Resolve the room for `order_id` and the caller's role in it.
    pub async fn authorize(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<(ChatRoom, Role), ChatError> {
        let room = self.get_room_by_order(order_id).await?;
        let role = require_role(&room, user_id)?;
        Ok((room, role))
    }

    /// Hydrated room for an order. With a viewer, membership is enforced
    /// and the viewer's unread count is attached.
    pub async fn room_view_by_order(
        &self,
        order_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<RoomView, ChatError> {
        let room = self.get_room_by_order(order_id).await?;
        self.view(room, viewer).await
    }

    pub async fn room_view_by_id(
        &self,
        room_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<RoomView, ChatError> {
        let room = self
            .db
            .call(move |db| db.get_room(room_id))
            .await
            .map_err(missing("Chat room"))?;
        self.view(room, viewer).await
    }

    async fn view(&self, room: ChatRoom, viewer: Option<Uuid>) -> Result<RoomView, ChatError> {
        if let Some(viewer) = viewer {
            require_role(&room, viewer)?;
        }
        Ok(self.db.call(move |db| hydrate(db, room, viewer)).await?)
    }

    /// Rooms the user participates in, most recently active first, each with
    /// the user's unread count.
    pub async fn list_rooms_for_user(
        &self,
        user_id: Uuid,
        query: RoomQuery,
    ) -> Result<RoomPage, ChatError> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(ChatError::validation("from", "'from' must not be after 'to'"));
            }
        }

        let filter = RoomFilter {
            is_active: query.is_active,
            created_from: query.from,
            created_to: query.to,
            limit: orderchat_shared::constants::clamp_page_size(query.limit),
            offset: query.offset.unwrap_or(0),
        };

        let (rooms, total, filter) = self
            .db
            .call(move |db| {
                let db: &Database = db;
                let total = db.count_rooms_for_user(user_id, &filter)?;
                let rooms = db
                    .list_rooms_for_user(user_id, &filter)?
                    .into_iter()
                    .map(|room| hydrate(db, room, Some(user_id)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rooms, total, filter))
            })
            .await?;

        debug!(user = %user_id, total, returned = rooms.len(), "Listed chat rooms");

        Ok(RoomPage {
            has_more: has_more(total, filter.offset, rooms.len()),
            total,
            limit: filter.limit,
            offset: filter.offset,
            rooms,
        })
    }

    /// Close the room. Only the store-side participant may; repeated closes
    /// succeed without change.
    pub async fn close_room(&self, order_id: Uuid, requester: Uuid) -> Result<RoomView, ChatError> {
        let room = self.get_room_by_order(order_id).await?;
        match room.role_of(requester) {
            Some(Role::Store) => {}
            Some(Role::Client) => {
                return Err(ChatError::Forbidden(
                    "Only the store can close this chat".to_string(),
                ))
            }
            None => return Err(ChatError::room_not_found()),
        }

        let room_id = room.id;
        let changed = self
            .db
            .call(move |db| db.set_room_active(room_id, false))
            .await?;
        if changed {
            info!(order = %order_id, room = %room_id, "Chat room closed");
        }

        self.room_view_by_order(order_id, Some(requester)).await
    }

    /// Aggregate counts for the caller.
    pub async fn stats(&self, user_id: Uuid) -> Result<ChatStats, ChatError> {
        Ok(self
            .db
            .call(move |db| {
                let all = RoomFilter::default();
                let active = RoomFilter {
                    is_active: Some(true),
                    ..RoomFilter::default()
                };
                Ok(ChatStats {
                    total_rooms: db.count_rooms_for_user(user_id, &all)?,
                    active_rooms: db.count_rooms_for_user(user_id, &active)?,
                    unread_messages: db.count_unread_for_user(user_id)?,
                    messages_sent: db.count_messages_sent_by(user_id)?,
                })
            })
            .await?)
    }
}

/// Attach participant display info, the last message and, for a
/// participant viewer, their unread count.
fn hydrate(db: &Database, room: ChatRoom, viewer: Option<Uuid>) -> orderchat_store::Result<RoomView> {
    let client_name = db.find_user(room.client_id)?.map(|u| u.name);
    let store = match db.get_order(room.order_id) {
        Ok(order) => db.find_store(order.store_id)?,
        Err(StoreError::NotFound) => None,
        Err(e) => return Err(e),
    };
    let last_message = db.last_message_for_room(room.id)?.map(preview);
    let unread_count = match viewer {
        Some(viewer) => messaging::unread_count(db, &room, viewer)?,
        None => None,
    };

    Ok(RoomView {
        id: room.id,
        order_id: room.order_id,
        client: ParticipantView {
            user_id: room.client_id,
            name: client_name,
        },
        store: StoreParticipantView {
            user_id: room.store_id,
            store_id: store.as_ref().map(|s| s.id),
            name: store.map(|s| s.name),
        },
        is_active: room.is_active,
        created_at: room.created_at,
        updated_at: room.updated_at,
        last_message,
        unread_count,
    })
}
