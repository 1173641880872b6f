//! Fixtures shared by the server's unit tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use ed25519_dalek::SigningKey;
use orderchat_shared::identity::{create_identity_token, Identity};
use orderchat_shared::{AccountRole, OrderStatus};
use orderchat_store::database::now;
use orderchat_store::{Database, SharedDatabase, StoreRecord};
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::notify::recording::RecordingNotifier;

pub struct TestOrder {
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub store_user_id: Uuid,
    pub store_id: Uuid,
}

/// A pending order from "Carla Client" at "Sushi Spot". No room yet.
pub fn seed_order_into(db: &Database) -> TestOrder {
    let client_id = Uuid::new_v4();
    let store_user_id = Uuid::new_v4();
    let store = StoreRecord {
        id: Uuid::new_v4(),
        owner_id: store_user_id,
        name: "Sushi Spot".into(),
    };
    db.upsert_user(client_id, "Carla Client").unwrap();
    db.upsert_user(store_user_id, "Sam Store").unwrap();
    db.upsert_store(&store).unwrap();

    let order_id = Uuid::new_v4();
    db.record_order(order_id, client_id, store.id, OrderStatus::Pending, now())
        .unwrap();

    TestOrder {
        order_id,
        client_id,
        store_user_id,
        store_id: store.id,
    }
}

pub async fn seed_order() -> (SharedDatabase, TestOrder) {
    let db = Database::open_in_memory().unwrap();
    let order = seed_order_into(&db);
    (SharedDatabase::new(db), order)
}

/// Fully wired state over an in-memory database, with a signing key that
/// the state's authenticator trusts.
pub struct TestApp {
    pub state: AppState,
    pub order: TestOrder,
    pub notifier: Arc<RecordingNotifier>,
    signing_key: SigningKey,
}

impl TestApp {
    pub const ADMIN_TOKEN: &'static str = "test-admin-token";

    pub async fn new() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let config = ServerConfig {
            auth_server_pubkey: signing_key.verifying_key().to_bytes(),
            admin_token: Some(Self::ADMIN_TOKEN.to_string()),
            ..ServerConfig::default()
        };

        let (db, order) = seed_order().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(config, db, notifier.clone());

        Self {
            state,
            order,
            notifier,
            signing_key,
        }
    }

    fn display_name(&self, user_id: Uuid) -> &'static str {
        if user_id == self.order.client_id {
            "Carla Client"
        } else if user_id == self.order.store_user_id {
            "Sam Store"
        } else {
            "Someone Else"
        }
    }

    pub fn identity(&self, user_id: Uuid, role: AccountRole) -> Identity {
        Identity {
            user_id,
            name: self.display_name(user_id).to_string(),
            role,
        }
    }

    /// Bearer token for `user_id`, valid for an hour.
    pub fn token(&self, user_id: Uuid, role: AccountRole) -> String {
        create_identity_token(
            user_id,
            self.display_name(user_id),
            role,
            Utc::now() + Duration::hours(1),
            &self.signing_key,
        )
        .encode()
    }

    pub fn client_token(&self) -> String {
        self.token(self.order.client_id, AccountRole::Customer)
    }

    pub fn store_token(&self) -> String {
        self.token(self.order.store_user_id, AccountRole::StoreOwner)
    }
}
