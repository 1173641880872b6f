//! # orderchat-store
//!
//! Relational storage for order chat rooms, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for rooms, messages
//! and the order directory, plus [`SharedDatabase`], which runs those helpers
//! on the blocking pool so async callers never stall the runtime.

pub mod database;
pub mod handle;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod orders;
pub mod rooms;

mod error;
#[cfg(test)]
mod testing;

pub use database::Database;
pub use error::{Result, StoreError};
pub use handle::SharedDatabase;
pub use models::*;
