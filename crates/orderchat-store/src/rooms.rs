//! CRUD operations for [`ChatRoom`] records.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use uuid::Uuid;

use crate::database::{decode_ts, decode_uuid, encode_ts, not_found, now, Database};
use crate::error::Result;
use crate::models::{ChatRoom, RoomFilter};

const ROOM_COLUMNS: &str = "id, order_id, client_id, store_id, is_active, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create the room for `order_id` unless one already exists.
    ///
    /// Concurrent callers race on the UNIQUE index; the losers' inserts are
    /// ignored and everyone reads back the single surviving row. Returns the
    /// room and whether this call inserted it.
    pub fn insert_room_if_absent(
        &self,
        order_id: Uuid,
        client_id: Uuid,
        store_id: Uuid,
    ) -> Result<(ChatRoom, bool)> {
        let ts = encode_ts(&now());
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO chat_rooms
                 (id, order_id, client_id, store_id, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![
                Uuid::new_v4().to_string(),
                order_id.to_string(),
                client_id.to_string(),
                store_id.to_string(),
                ts,
            ],
        )?;

        let room = self.get_room_by_order(order_id)?;
        Ok((room, inserted > 0))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_room(&self, id: Uuid) -> Result<ChatRoom> {
        self.conn()
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = ?1"),
                params![id.to_string()],
                row_to_room,
            )
            .map_err(not_found)
    }

    pub fn get_room_by_order(&self, order_id: Uuid) -> Result<ChatRoom> {
        self.find_room_by_order(order_id)?
            .ok_or(crate::error::StoreError::NotFound)
    }

    pub fn find_room_by_order(&self, order_id: Uuid) -> Result<Option<ChatRoom>> {
        let room = self
            .conn()
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE order_id = ?1"),
                params![order_id.to_string()],
                row_to_room,
            )
            .optional()?;
        Ok(room)
    }

    /// Rooms where `user_id` is either participant, most recently active
    /// first.
    pub fn list_rooms_for_user(&self, user_id: Uuid, filter: &RoomFilter) -> Result<Vec<ChatRoom>> {
        let (where_sql, mut values) = filter_clause(user_id, filter);
        values.push(Value::Integer(filter.limit as i64));
        values.push(Value::Integer(filter.offset as i64));

        let sql = format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms
             WHERE {where_sql}
             ORDER BY updated_at DESC, created_at DESC
             LIMIT ? OFFSET ?"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_room)?;

        let mut rooms = Vec::new();
        for row in rows {
            rooms.push(row?);
        }
        Ok(rooms)
    }

    /// Total matching `filter`, ignoring its pagination.
    pub fn count_rooms_for_user(&self, user_id: Uuid, filter: &RoomFilter) -> Result<u64> {
        let (where_sql, values) = filter_clause(user_id, filter);
        let count: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM chat_rooms WHERE {where_sql}"),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Set the open/closed flag. Returns `true` if the value changed.
    pub fn set_room_active(&self, room_id: Uuid, active: bool) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chat_rooms SET is_active = ?2 WHERE id = ?1 AND is_active != ?2",
            params![room_id.to_string(), active],
        )?;
        Ok(affected > 0)
    }

    /// Record activity in the room.
    pub fn touch_room(&self, room_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        touch_room_on(self.conn(), room_id, at)
    }
}

pub(crate) fn touch_room_on(
    conn: &rusqlite::Connection,
    room_id: Uuid,
    at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE chat_rooms SET updated_at = ?2 WHERE id = ?1",
        params![room_id.to_string(), encode_ts(&at)],
    )?;
    Ok(())
}

fn filter_clause(user_id: Uuid, filter: &RoomFilter) -> (String, Vec<Value>) {
    let user = user_id.to_string();
    let mut clauses = vec!["(client_id = ? OR store_id = ?)".to_string()];
    let mut values = vec![Value::Text(user.clone()), Value::Text(user)];

    if let Some(active) = filter.is_active {
        clauses.push("is_active = ?".into());
        values.push(Value::Integer(active as i64));
    }
    if let Some(from) = filter.created_from {
        clauses.push("created_at >= ?".into());
        values.push(Value::Text(encode_ts(&from)));
    }
    if let Some(to) = filter.created_to {
        clauses.push("created_at <= ?".into());
        values.push(Value::Text(encode_ts(&to)));
    }

    (clauses.join(" AND "), values)
}

fn row_to_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRoom> {
    let id: String = row.get(0)?;
    let order_id: String = row.get(1)?;
    let client_id: String = row.get(2)?;
    let store_id: String = row.get(3)?;
    let is_active: bool = row.get(4)?;
    let created: String = row.get(5)?;
    let updated: String = row.get(6)?;

    Ok(ChatRoom {
        id: decode_uuid(0, &id)?,
        order_id: decode_uuid(1, &order_id)?,
        client_id: decode_uuid(2, &client_id)?,
        store_id: decode_uuid(3, &store_id)?,
        is_active,
        created_at: decode_ts(5, &created)?,
        updated_at: decode_ts(6, &updated)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::testing::seed_order;

    fn page(limit: u32) -> RoomFilter {
        RoomFilter {
            limit,
            ..RoomFilter::default()
        }
    }

    #[test]
    fn insert_is_idempotent_per_order() {
        let db = Database::open_in_memory().unwrap();
        let seeded = seed_order(&db);

        let (first, created) = db
            .insert_room_if_absent(seeded.order_id, seeded.buyer_id, seeded.owner_id)
            .unwrap();
        assert!(created);

        let (second, created_again) = db
            .insert_room_if_absent(seeded.order_id, Uuid::new_v4(), Uuid::new_v4())
            .unwrap();
        assert!(!created_again);
        assert_eq!(first, second);
        assert_eq!(second.client_id, seeded.buyer_id);
    }

    #[test]
    fn room_for_unknown_order_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let result = db.insert_room_if_absent(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
        assert!(matches!(db.get_room(Uuid::new_v4()), Err(StoreError::NotFound)));
    }

    #[test]
    fn list_filters_and_orders_by_activity() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_order(&db);
        let b = seed_order(&db);

        let (room_a, _) = db
            .insert_room_if_absent(a.order_id, a.buyer_id, a.owner_id)
            .unwrap();
        // Same buyer on a second order from another store.
        let (room_b, _) = db
            .insert_room_if_absent(b.order_id, a.buyer_id, b.owner_id)
            .unwrap();

        db.touch_room(room_a.id, now() + chrono::Duration::seconds(5))
            .unwrap();

        let rooms = db.list_rooms_for_user(a.buyer_id, &page(10)).unwrap();
        assert_eq!(
            rooms.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![room_a.id, room_b.id]
        );

        assert!(db.set_room_active(room_b.id, false).unwrap());
        assert!(!db.set_room_active(room_b.id, false).unwrap());

        let active = RoomFilter {
            is_active: Some(true),
            ..page(10)
        };
        assert_eq!(db.count_rooms_for_user(a.buyer_id, &active).unwrap(), 1);
        assert_eq!(db.count_rooms_for_user(a.owner_id, &page(10)).unwrap(), 1);
        assert_eq!(db.count_rooms_for_user(Uuid::new_v4(), &page(10)).unwrap(), 0);

        let future = RoomFilter {
            created_from: Some(now() + chrono::Duration::days(1)),
            ..page(10)
        };
        assert!(db.list_rooms_for_user(a.buyer_id, &future).unwrap().is_empty());

        let second_page = RoomFilter {
            offset: 1,
            ..page(1)
        };
        let rooms = db.list_rooms_for_user(a.buyer_id, &second_page).unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, room_b.id);
    }
}
