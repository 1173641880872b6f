//! Fixtures shared by the store's unit tests.

use orderchat_shared::OrderStatus;
use uuid::Uuid;

use crate::database::{now, Database};
use crate::models::StoreRecord;

pub(crate) struct SeededOrder {
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    pub owner_id: Uuid,
}

/// Insert a store and one pending order for a fresh buyer.
pub(crate) fn seed_order(db: &Database) -> SeededOrder {
    let owner_id = Uuid::new_v4();
    let buyer_id = Uuid::new_v4();
    let store = StoreRecord {
        id: Uuid::new_v4(),
        owner_id,
        name: "Noodle Bar".into(),
    };
    db.upsert_store(&store).unwrap();

    let order_id = Uuid::new_v4();
    db.record_order(order_id, buyer_id, store.id, OrderStatus::Pending, now())
        .unwrap();

    SeededOrder {
        order_id,
        buyer_id,
        owner_id,
    }
}
