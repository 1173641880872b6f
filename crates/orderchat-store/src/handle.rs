//! Async access to the [`Database`].
//!
//! SQLite calls block, so every operation is shipped to tokio's blocking pool
//! while holding the connection lock. Each closure is one unit of store I/O;
//! the single connection serialises writes, which is what gives individual
//! inserts and updates their atomicity.

use std::sync::{Arc, Mutex};

use crate::database::Database;
use crate::error::{Result, StoreError};

#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the database on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut db = inner.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut db)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::seed_order;

    #[tokio::test]
    async fn concurrent_room_creation_converges() {
        let db = Database::open_in_memory().unwrap();
        let seeded = seed_order(&db);
        let shared = SharedDatabase::new(db);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let shared = shared.clone();
            let (order, buyer, owner) = (seeded.order_id, seeded.buyer_id, seeded.owner_id);
            tasks.push(tokio::spawn(async move {
                shared
                    .call(move |db| db.insert_room_if_absent(order, buyer, owner))
                    .await
            }));
        }

        let mut ids = Vec::new();
        let mut inserts = 0;
        for task in tasks {
            let (room, created) = task.await.unwrap().unwrap();
            ids.push(room.id);
            inserts += created as usize;
        }

        assert_eq!(inserts, 1);
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }
}
