//! # orderchat-shared
//!
//! Vocabulary shared by the store and the server: participant roles, message
//! kinds, the realtime wire protocol, signed identity tokens, the chat error
//! taxonomy, and the DTOs handed to HTTP and socket clients.

pub mod constants;
pub mod dto;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use error::ChatError;
pub use types::{AccountRole, MessageType, OrderStatus, Role, SystemEventType};
