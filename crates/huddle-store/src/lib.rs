//! # huddle-store
//!
//! Storage gateway for the Huddle chat backend, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model, plus a [`DatabasePool`] that hands out scoped connections. Every
//! public operation is a single transaction: it commits in full or leaves
//! the database untouched.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod tasks;
pub mod users;

mod error;
#[cfg(test)]
mod testing;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use pool::{DatabasePool, PooledDatabase};
