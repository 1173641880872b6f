use orderchat_shared::{MessageType, Role};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::database::{bad_enum, decode_ts, decode_uuid, encode_ts, now, Database};
use crate::error::Result;
use crate::models::{ChatMessage, NewMessage};
use crate::rooms::touch_room_on;

const MESSAGE_COLUMNS: &str =
    "seq, id, room_id, sender_id, sender_type, body, message_type, is_read, metadata, created_at";

impl Database {
    /// Append a message without touching the room.
    pub fn insert_message(&self, message: &NewMessage) -> Result<ChatMessage> {
        insert_message_on(self.conn(), message)
    }

    /// Append a message and advance the room's `updated_at` in one
    /// transaction.
    pub fn append_message(&mut self, message: &NewMessage) -> Result<ChatMessage> {
        let tx = self.conn_mut().transaction()?;
        let stored = insert_message_on(&tx, message)?;
        touch_room_on(&tx, stored.room_id, stored.created_at)?;
        tx.commit()?;
        Ok(stored)
    }

    /// Newest first.
    pub fn get_messages_for_room(
        &self,
        room_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM chat_messages
             WHERE room_id = ?1
             ORDER BY seq DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![room_id.to_string(), limit, offset], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn count_messages_for_room(&self, room_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE room_id = ?1",
            params![room_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn last_message_for_room(&self, room_id: Uuid) -> Result<Option<ChatMessage>> {
        let message = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM chat_messages
                     WHERE room_id = ?1 ORDER BY seq DESC LIMIT 1"
                ),
                params![room_id.to_string()],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Flag every unread message authored by `sender_type` as read.
    /// Returns the number of messages that changed.
    pub fn mark_read_from(&self, room_id: Uuid, sender_type: Role) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE chat_messages SET is_read = 1
             WHERE room_id = ?1 AND sender_type = ?2 AND is_read = 0",
            params![room_id.to_string(), sender_type.as_str()],
        )?;
        Ok(affected)
    }

    pub fn count_unread_from(&self, room_id: Uuid, sender_type: Role) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_messages
             WHERE room_id = ?1 AND sender_type = ?2 AND is_read = 0",
            params![room_id.to_string(), sender_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Unread messages addressed to `user_id` across all of their rooms.
    pub fn count_unread_for_user(&self, user_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_messages m
             JOIN chat_rooms r ON r.id = m.room_id
             WHERE m.is_read = 0
               AND ((r.client_id = ?1 AND m.sender_type = 'STORE')
                 OR (r.store_id = ?1 AND m.sender_type = 'CLIENT'))",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Messages written by the user themselves (system messages excluded).
    pub fn count_messages_sent_by(&self, user_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_messages
             WHERE sender_id = ?1 AND message_type != 'SYSTEM'",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn insert_message_on(conn: &Connection, message: &NewMessage) -> Result<ChatMessage> {
    let id = Uuid::new_v4();
    let created_at = now();
    let metadata = message.metadata.as_ref().map(|m| m.to_string());

    conn.execute(
        "INSERT INTO chat_messages
             (id, room_id, sender_id, sender_type, body, message_type, is_read, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
        params![
            id.to_string(),
            message.room_id.to_string(),
            message.sender_id.to_string(),
            message.sender_type.as_str(),
            message.body,
            message.message_type.as_str(),
            metadata,
            encode_ts(&created_at),
        ],
    )?;

    Ok(ChatMessage {
        seq: conn.last_insert_rowid(),
        id,
        room_id: message.room_id,
        sender_id: message.sender_id,
        sender_type: message.sender_type,
        body: message.body.clone(),
        message_type: message.message_type,
        is_read: false,
        metadata: message.metadata.clone(),
        created_at,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let seq: i64 = row.get(0)?;
    let id_str: String = row.get(1)?;
    let room_id_str: String = row.get(2)?;
    let sender_str: String = row.get(3)?;
    let sender_type_str: String = row.get(4)?;
    let body: String = row.get(5)?;
    let message_type_str: String = row.get(6)?;
    let is_read: bool = row.get(7)?;
    let metadata_str: Option<String> = row.get(8)?;
    let ts_str: String = row.get(9)?;

    let metadata = metadata_str
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ChatMessage {
        seq,
        id: decode_uuid(1, &id_str)?,
        room_id: decode_uuid(2, &room_id_str)?,
        sender_id: decode_uuid(3, &sender_str)?,
        sender_type: Role::parse(&sender_type_str).ok_or_else(|| bad_enum(4, &sender_type_str))?,
        body,
        message_type: MessageType::parse(&message_type_str)
            .ok_or_else(|| bad_enum(6, &message_type_str))?,
        is_read,
        metadata,
        created_at: decode_ts(9, &ts_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRoom;
    use crate::testing::{seed_order, SeededOrder};

    fn room(db: &Database) -> (SeededOrder, ChatRoom) {
        let seeded = seed_order(db);
        let (room, _) = db
            .insert_room_if_absent(seeded.order_id, seeded.buyer_id, seeded.owner_id)
            .unwrap();
        (seeded, room)
    }

    fn text(room: &ChatRoom, sender_type: Role, body: &str) -> NewMessage {
        NewMessage {
            room_id: room.id,
            sender_id: room.participant(sender_type),
            sender_type,
            body: body.into(),
            message_type: MessageType::Text,
            metadata: None,
        }
    }

    #[test]
    fn append_assigns_increasing_seq_and_touches_room() {
        let mut db = Database::open_in_memory().unwrap();
        let (_, room) = room(&db);

        std::thread::sleep(std::time::Duration::from_millis(2));
        let first = db.append_message(&text(&room, Role::Client, "Hello")).unwrap();
        let second = db.append_message(&text(&room, Role::Store, "Hi!")).unwrap();
        assert!(second.seq > first.seq);

        let touched = db.get_room(room.id).unwrap();
        assert!(touched.updated_at > room.updated_at);
        assert_eq!(touched.updated_at, second.created_at);

        let history = db.get_messages_for_room(room.id, 10, 0).unwrap();
        assert_eq!(history, vec![second.clone(), first]);
        assert_eq!(db.last_message_for_room(room.id).unwrap(), Some(second));
        assert_eq!(db.count_messages_for_room(room.id).unwrap(), 2);
    }

    #[test]
    fn mark_read_only_touches_other_role() {
        let db = Database::open_in_memory().unwrap();
        let (seeded, room) = room(&db);

        db.insert_message(&text(&room, Role::Client, "one")).unwrap();
        db.insert_message(&text(&room, Role::Client, "two")).unwrap();
        db.insert_message(&text(&room, Role::Store, "three")).unwrap();

        assert_eq!(db.count_unread_from(room.id, Role::Client).unwrap(), 2);
        assert_eq!(db.count_unread_for_user(seeded.owner_id).unwrap(), 2);
        assert_eq!(db.count_unread_for_user(seeded.buyer_id).unwrap(), 1);

        assert_eq!(db.mark_read_from(room.id, Role::Client).unwrap(), 2);
        assert_eq!(db.mark_read_from(room.id, Role::Client).unwrap(), 0);
        assert_eq!(db.count_unread_from(room.id, Role::Client).unwrap(), 0);
        assert_eq!(db.count_unread_from(room.id, Role::Store).unwrap(), 1);
    }

    #[test]
    fn metadata_survives_storage() {
        let db = Database::open_in_memory().unwrap();
        let (seeded, room) = room(&db);

        let mut system = text(&room, Role::Store, "Your order has been confirmed");
        system.message_type = MessageType::System;
        system.metadata = Some(serde_json::json!({ "eventType": "ORDER_CONFIRMED" }));
        db.insert_message(&system).unwrap();

        let stored = db.last_message_for_room(room.id).unwrap().unwrap();
        assert_eq!(stored.message_type, MessageType::System);
        assert_eq!(stored.metadata.unwrap()["eventType"], "ORDER_CONFIRMED");
        assert_eq!(db.count_messages_sent_by(seeded.owner_id).unwrap(), 0);
    }
}
