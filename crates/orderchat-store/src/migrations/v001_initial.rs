//! v001 -- Initial schema creation.
//!
//! Creates the order directory (`users`, `stores`, `orders`) mirrored from the
//! order lifecycle service, and the chat tables `chat_rooms` and
//! `chat_messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (display info mirrored from the auth service)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID
    name       TEXT NOT NULL,
    updated_at TEXT NOT NULL                -- RFC-3339, microsecond precision
);

-- ----------------------------------------------------------------
-- Stores
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS stores (
    id       TEXT PRIMARY KEY NOT NULL,     -- UUID
    owner_id TEXT NOT NULL,                 -- user who answers the store's chats
    name     TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Orders
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS orders (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID
    buyer_id   TEXT NOT NULL,
    store_id   TEXT NOT NULL,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (store_id) REFERENCES stores(id)
);

-- ----------------------------------------------------------------
-- Chat rooms: exactly one per order
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_rooms (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    order_id   TEXT NOT NULL UNIQUE,        -- FK -> orders(id)
    client_id  TEXT NOT NULL,               -- ordering user
    store_id   TEXT NOT NULL,               -- store's owning user
    is_active  INTEGER NOT NULL DEFAULT 1,  -- boolean 0/1
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (order_id) REFERENCES orders(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chat_rooms_client ON chat_rooms(client_id, updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_chat_rooms_store  ON chat_rooms(store_id, updated_at DESC);

-- ----------------------------------------------------------------
-- Chat messages: append-only, ordered by seq
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_messages (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    id           TEXT NOT NULL UNIQUE,      -- UUID v4
    room_id      TEXT NOT NULL,             -- FK -> chat_rooms(id)
    sender_id    TEXT NOT NULL,
    sender_type  TEXT NOT NULL CHECK (sender_type IN ('CLIENT', 'STORE')),
    body         TEXT NOT NULL,
    message_type TEXT NOT NULL CHECK (message_type IN ('TEXT', 'IMAGE', 'SYSTEM')),
    is_read      INTEGER NOT NULL DEFAULT 0,
    metadata     TEXT,                      -- JSON, SYSTEM messages only
    created_at   TEXT NOT NULL,

    FOREIGN KEY (room_id) REFERENCES chat_rooms(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_room_seq
    ON chat_messages(room_id, seq DESC);
CREATE INDEX IF NOT EXISTS idx_chat_messages_unread
    ON chat_messages(room_id, sender_type, is_read);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
