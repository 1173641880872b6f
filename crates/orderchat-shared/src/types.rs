use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of an order room a user is on.
///
/// Never stored as a user attribute: it is derived on every access by
/// comparing a user id with the room's two fixed participant fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Client,
    Store,
}

impl Role {
    /// Derive the role of `user_id` in a room with the given participants.
    ///
    /// Returns `None` for anyone who is not one of the two participants.
    pub fn of(client_id: Uuid, store_id: Uuid, user_id: Uuid) -> Option<Self> {
        if user_id == client_id {
            Some(Self::Client)
        } else if user_id == store_id {
            Some(Self::Store)
        } else {
            None
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Client => Self::Store,
            Self::Store => Self::Client,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Store => "STORE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLIENT" => Some(Self::Client),
            "STORE" => Some(Self::Store),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    System,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::System => "SYSTEM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(Self::Text),
            "IMAGE" => Some(Self::Image),
            "SYSTEM" => Some(Self::System),
            _ => None,
        }
    }
}

/// Account-level role issued by the auth service. Unrelated to [`Role`],
/// which only exists inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountRole {
    Customer,
    StoreOwner,
    Courier,
    Admin,
}

impl AccountRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::StoreOwner => "STORE_OWNER",
            Self::Courier => "COURIER",
            Self::Admin => "ADMIN",
        }
    }
}

/// Order status as owned by the order lifecycle service. Mirrored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Preparing => "PREPARING",
            Self::Ready => "READY",
            Self::PickedUp => "PICKED_UP",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "PREPARING" => Some(Self::Preparing),
            "READY" => Some(Self::Ready),
            "PICKED_UP" => Some(Self::PickedUp),
            "DELIVERED" => Some(Self::Delivered),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Customer-facing wording used in system messages.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Pending => "is waiting for the store to confirm",
            Self::Confirmed => "has been confirmed by the store",
            Self::Preparing => "is being prepared",
            Self::Ready => "is ready for pickup",
            Self::PickedUp => "has been picked up by the courier",
            Self::Delivered => "has been delivered",
            Self::Cancelled => "has been cancelled",
        }
    }
}

/// Lifecycle event a system message narrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemEventType {
    OrderCreated,
    OrderConfirmed,
    StatusChanged,
    OutForDelivery,
    Delivered,
    OrderCancelled,
    Custom,
}

impl SystemEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrderCreated => "ORDER_CREATED",
            Self::OrderConfirmed => "ORDER_CONFIRMED",
            Self::StatusChanged => "STATUS_CHANGED",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::OrderCancelled => "ORDER_CANCELLED",
            Self::Custom => "CUSTOM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ORDER_CREATED" => Some(Self::OrderCreated),
            "ORDER_CONFIRMED" => Some(Self::OrderConfirmed),
            "STATUS_CHANGED" => Some(Self::StatusChanged),
            "OUT_FOR_DELIVERY" => Some(Self::OutForDelivery),
            "DELIVERED" => Some(Self::Delivered),
            "ORDER_CANCELLED" => Some(Self::OrderCancelled),
            "CUSTOM" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_of_participants() {
        let client = Uuid::new_v4();
        let store = Uuid::new_v4();

        assert_eq!(Role::of(client, store, client), Some(Role::Client));
        assert_eq!(Role::of(client, store, store), Some(Role::Store));
        assert_eq!(Role::of(client, store, Uuid::new_v4()), None);
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Client).unwrap(), "\"CLIENT\"");
        assert_eq!(Role::parse("STORE"), Some(Role::Store));
        assert_eq!(Role::Store.opposite(), Role::Client);
        assert!(Role::parse("store").is_none());
    }

    #[test]
    fn test_message_type_defaults_to_text() {
        assert_eq!(MessageType::default(), MessageType::Text);
        let parsed: MessageType = serde_json::from_str("\"IMAGE\"").unwrap();
        assert_eq!(parsed, MessageType::Image);
        assert!(serde_json::from_str::<MessageType>("\"VIDEO\"").is_err());
    }

    #[test]
    fn test_system_event_names_round_trip_through_parse() {
        for event in [
            SystemEventType::OrderCreated,
            SystemEventType::OrderConfirmed,
            SystemEventType::StatusChanged,
            SystemEventType::OutForDelivery,
            SystemEventType::Delivered,
            SystemEventType::OrderCancelled,
            SystemEventType::Custom,
        ] {
            assert_eq!(SystemEventType::parse(event.as_str()), Some(event));
        }
    }
}
