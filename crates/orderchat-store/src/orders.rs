//! Order directory: the slice of user, store and order data the chat core
//! needs to resolve an order's participants.

use chrono::{DateTime, Utc};
use orderchat_shared::OrderStatus;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::{bad_enum, decode_ts, decode_uuid, encode_ts, not_found, now, Database};
use crate::error::Result;
use crate::models::{OrderRecord, StoreRecord, UserRecord};

impl Database {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Insert or refresh a user's display name.
    pub fn upsert_user(&self, id: Uuid, name: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, name, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
            params![id.to_string(), name, encode_ts(&now())],
        )?;
        Ok(())
    }

    pub fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, name, updated_at FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let id: String = row.get(0)?;
                    let updated: String = row.get(2)?;
                    Ok(UserRecord {
                        id: decode_uuid(0, &id)?,
                        name: row.get(1)?,
                        updated_at: decode_ts(2, &updated)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Stores
    // ------------------------------------------------------------------

    pub fn upsert_store(&self, store: &StoreRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO stores (id, owner_id, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, name = excluded.name",
            params![store.id.to_string(), store.owner_id.to_string(), store.name],
        )?;
        Ok(())
    }

    pub fn find_store(&self, id: Uuid) -> Result<Option<StoreRecord>> {
        let store = self
            .conn()
            .query_row(
                "SELECT id, owner_id, name FROM stores WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let id: String = row.get(0)?;
                    let owner: String = row.get(1)?;
                    Ok(StoreRecord {
                        id: decode_uuid(0, &id)?,
                        owner_id: decode_uuid(1, &owner)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(store)
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Insert an order. A known order is left as it is, so replayed
    /// creation events cannot roll back a mirrored status. The store must
    /// already exist.
    pub fn record_order(
        &self,
        id: Uuid,
        buyer_id: Uuid,
        store_id: Uuid,
        status: OrderStatus,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO orders (id, buyer_id, store_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO NOTHING",
            params![
                id.to_string(),
                buyer_id.to_string(),
                store_id.to_string(),
                status.as_str(),
                encode_ts(&created_at),
                encode_ts(&now()),
            ],
        )?;
        Ok(())
    }

    /// Fetch an order with its store owner resolved.
    pub fn get_order(&self, id: Uuid) -> Result<OrderRecord> {
        self.conn()
            .query_row(
                "SELECT o.id, o.buyer_id, o.store_id, s.owner_id, o.status, o.created_at
                 FROM orders o
                 JOIN stores s ON s.id = o.store_id
                 WHERE o.id = ?1",
                params![id.to_string()],
                row_to_order,
            )
            .map_err(not_found)
    }

    /// Mirror a status change. Returns `false` for unknown orders.
    pub fn update_order_status(&self, id: Uuid, status: OrderStatus) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status.as_str(), encode_ts(&now())],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRecord> {
    let id: String = row.get(0)?;
    let buyer: String = row.get(1)?;
    let store: String = row.get(2)?;
    let owner: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created: String = row.get(5)?;

    Ok(OrderRecord {
        id: decode_uuid(0, &id)?,
        buyer_id: decode_uuid(1, &buyer)?,
        store_id: decode_uuid(2, &store)?,
        store_owner_id: decode_uuid(3, &owner)?,
        status: OrderStatus::parse(&status).ok_or_else(|| bad_enum(4, &status))?,
        created_at: decode_ts(5, &created)?,
    })
}
