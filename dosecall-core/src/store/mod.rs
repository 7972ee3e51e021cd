//! Storage layer for dosecall
//!
//! SQLite-backed session store with:
//! - Schema migrations keyed off PRAGMA user_version
//! - Repository pattern for queries
//! - Per-call-id write serialization for reconciliation

pub mod repo;
pub mod schema;

pub use repo::{Database, Page, SessionFilter};
