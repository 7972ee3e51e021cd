//! # dosecall-core
//!
//! Core library for dosecall - a medication reminder call tracker.
//!
//! This library provides:
//! - Domain types for call sessions and canonical updates
//! - Event normalization for telephony provider callbacks
//! - An order-independent session reconciler
//! - Database storage layer with SQLite
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Provider callbacks arrive out of order and possibly duplicated. Each one
//! flows through three stages:
//! - **Normalize:** raw payload → typed [`CanonicalUpdate`]
//! - **Reconcile:** pure merge against the stored session under precedence
//!   rules (AMD verdicts outrank progress inferences, terminal statuses
//!   never revert, replays are no-ops)
//! - **Persist:** the merged session is written back atomically
//!
//! ## Example
//!
//! ```rust,no_run
//! use dosecall_core::{Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use reconcile::{reconcile, Reconciled};
pub use store::{Database, Page, SessionFilter};
pub use types::*;
pub use webhook::WebhookProcessor;

// Public modules
pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod store;
pub mod twiml;
pub mod types;
pub mod webhook;
