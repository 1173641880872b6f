//! Order lifecycle events.
//!
//! The order service pushes events to `POST /internal/order-events`; the
//! handler answers immediately and publishes onto an in-process broadcast
//! bus. A background listener applies each event: it mirrors the order into
//! the local directory and narrates the change into the chat room as a
//! system message. Failures are logged and dropped so one bad event never
//! stalls the rest.

use chrono::{DateTime, Utc};
use orderchat_shared::{ChatError, OrderStatus, SystemEventType};
use orderchat_store::{SharedDatabase, StoreRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::rooms::RoomManager;
use crate::system_messages::SystemMessageInjector;

const BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerInfo {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMilestone {
    CourierAssigned,
    PickedUp,
    OutForDelivery,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all_fields = "camelCase")]
pub enum OrderEvent {
    OrderCreated {
        order_id: Uuid,
        buyer: BuyerInfo,
        store: StoreInfo,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
    },
    OrderConfirmed {
        order_id: Uuid,
    },
    StatusChanged {
        order_id: Uuid,
        status: OrderStatus,
        #[serde(default)]
        note: Option<String>,
    },
    DeliveryMilestone {
        order_id: Uuid,
        milestone: DeliveryMilestone,
    },
    OrderCancelled {
        order_id: Uuid,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::OrderCreated { order_id, .. }
            | Self::OrderConfirmed { order_id }
            | Self::StatusChanged { order_id, .. }
            | Self::DeliveryMilestone { order_id, .. }
            | Self::OrderCancelled { order_id, .. } => *order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "ORDER_CREATED",
            Self::OrderConfirmed { .. } => "ORDER_CONFIRMED",
            Self::StatusChanged { .. } => "STATUS_CHANGED",
            Self::DeliveryMilestone { .. } => "DELIVERY_MILESTONE",
            Self::OrderCancelled { .. } => "ORDER_CANCELLED",
        }
    }
}

#[derive(Clone)]
pub struct OrderEventBus {
    tx: broadcast::Sender<OrderEvent>,
}

impl Default for OrderEventBus {
    fn default() -> Self {
        Self::new(BUS_CAPACITY)
    }
}

impl OrderEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Queue an event. Returns how many listeners will see it.
    pub fn publish(&self, event: OrderEvent) -> usize {
        let name = event.name();
        let order_id = event.order_id();
        match self.tx.send(event) {
            Ok(listeners) => {
                debug!(order = %order_id, event = name, "Order event queued");
                listeners
            }
            Err(_) => {
                warn!(order = %order_id, event = name, "No order event listener, event dropped");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }
}

/// Applies order events to the directory and the chat rooms.
#[derive(Clone)]
pub struct OrderEventHandler {
    db: SharedDatabase,
    rooms: RoomManager,
    system_messages: SystemMessageInjector,
}

impl OrderEventHandler {
    pub fn new(
        db: SharedDatabase,
        rooms: RoomManager,
        system_messages: SystemMessageInjector,
    ) -> Self {
        Self {
            db,
            rooms,
            system_messages,
        }
    }

    pub async fn handle(&self, event: OrderEvent) -> Result<(), ChatError> {
        match event {
            OrderEvent::OrderCreated {
                order_id,
                buyer,
                store,
                created_at,
            } => {
                let record = StoreRecord {
                    id: store.id,
                    owner_id: store.owner_id,
                    name: store.name.clone(),
                };
                let created_at = created_at.unwrap_or_else(orderchat_store::database::now);
                self.db
                    .call(move |db| {
                        db.upsert_user(buyer.id, &buyer.name)?;
                        db.upsert_store(&record)?;
                        db.record_order(order_id, buyer.id, record.id, OrderStatus::Pending, created_at)
                    })
                    .await?;

                let (_, created) = self.rooms.create_or_get_room(order_id).await?;
                if !created {
                    debug!(order = %order_id, "Replayed ORDER_CREATED, room already open");
                    return Ok(());
                }
                self.system_messages
                    .post_system_message(
                        order_id,
                        SystemEventType::OrderCreated,
                        &format!("Order placed. You can chat with {} here.", store.name),
                        Some(json!({ "status": OrderStatus::Pending.as_str() })),
                    )
                    .await?;
            }
            OrderEvent::OrderConfirmed { order_id } => {
                self.narrate_status(order_id, OrderStatus::Confirmed, SystemEventType::OrderConfirmed, None)
                    .await?;
            }
            OrderEvent::StatusChanged {
                order_id,
                status,
                note,
            } => {
                let event_type = match status {
                    OrderStatus::Confirmed => SystemEventType::OrderConfirmed,
                    OrderStatus::Delivered => SystemEventType::Delivered,
                    OrderStatus::Cancelled => SystemEventType::OrderCancelled,
                    _ => SystemEventType::StatusChanged,
                };
                self.narrate_status(order_id, status, event_type, note).await?;
            }
            OrderEvent::DeliveryMilestone {
                order_id,
                milestone,
            } => {
                self.narrate_milestone(order_id, milestone).await?;
            }
            OrderEvent::OrderCancelled { order_id, reason } => {
                self.narrate_status(order_id, OrderStatus::Cancelled, SystemEventType::OrderCancelled, reason)
                    .await?;
            }
        }
        Ok(())
    }

    async fn mirror_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), ChatError> {
        let known = self
            .db
            .call(move |db| db.update_order_status(order_id, status))
            .await?;
        if !known {
            debug!(order = %order_id, status = status.as_str(), "Status for unknown order");
        }
        Ok(())
    }

    async fn narrate_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        event_type: SystemEventType,
        note: Option<String>,
    ) -> Result<(), ChatError> {
        self.mirror_status(order_id, status).await?;

        let mut text = format!("Your order {}.", status.describe());
        if let Some(note) = note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            text.push(' ');
            text.push_str(note);
        }
        self.system_messages
            .post_system_message(
                order_id,
                event_type,
                &text,
                Some(json!({ "status": status.as_str(), "note": note })),
            )
            .await?;
        Ok(())
    }

    async fn narrate_milestone(
        &self,
        order_id: Uuid,
        milestone: DeliveryMilestone,
    ) -> Result<(), ChatError> {
        let (event_type, text, status) = match milestone {
            DeliveryMilestone::CourierAssigned => (
                SystemEventType::StatusChanged,
                "A courier has been assigned to your order.",
                None,
            ),
            DeliveryMilestone::PickedUp => (
                SystemEventType::OutForDelivery,
                "Your order has been picked up by the courier.",
                Some(OrderStatus::PickedUp),
            ),
            DeliveryMilestone::OutForDelivery => (
                SystemEventType::OutForDelivery,
                "Your order is on its way.",
                None,
            ),
            DeliveryMilestone::Delivered => (
                SystemEventType::Delivered,
                "Your order has been delivered. Enjoy!",
                Some(OrderStatus::Delivered),
            ),
        };

        if let Some(status) = status {
            self.mirror_status(order_id, status).await?;
        }
        self.system_messages
            .post_system_message(order_id, event_type, text, Some(json!({ "milestone": milestone })))
            .await?;
        Ok(())
    }
}

/// Consume the bus until it closes.
pub fn spawn_listener(
    handler: OrderEventHandler,
    mut rx: broadcast::Receiver<OrderEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let order_id = event.order_id();
                    let name = event.name();
                    match handler.handle(event).await {
                        Ok(()) => info!(order = %order_id, event = name, "Order event applied"),
                        Err(e) => {
                            warn!(order = %order_id, event = name, error = %e, "Order event failed")
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Order event listener lagged, events lost");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Order event bus closed");
                    break;
                }
            }
        }
    })
}
