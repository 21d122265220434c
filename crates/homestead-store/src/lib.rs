//! # homestead-store
//!
//! Persistence for buyer/owner inquiry threads, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides the inquiry operations: thread
//! resolution on the `(property, owner, buyer e-mail)` key, the append-only
//! message ledger, unread counters with read markers, and role-scoped
//! listings. [`StoreHandle`] owns the database location for a host process.

pub mod database;
pub mod inbox;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod threads;
pub mod unread;

mod error;

pub use database::{Database, StoreHandle};
pub use error::{Result, StoreError};
pub use inbox::Submission;
pub use models::*;
pub use unread::{seen_by_counterpart, seen_state};
