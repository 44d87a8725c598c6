//! userblock - blocks user accounts that stay unconfirmed too long
//!
//! An account that has been neither confirmed nor blocked for longer than the
//! configured grace period (three days by default) is blocked: its
//! `blocked_at` is set, its auth key rotated, and registered observers are
//! notified before and after the change.
//!
//! # Features
//!
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use userblock::blocker::AccountExpiryBlocker;
//! use userblock::clock::SystemClock;
//! use userblock::events::AuditLogObserver;
//! use userblock::store::Database;
//!
//! let db = Database::from_config().await?;
//! let blocker = AccountExpiryBlocker::new(db, Arc::new(SystemClock), chrono::Duration::days(3))
//!     .with_observer(Arc::new(AuditLogObserver));
//! let outcome = blocker.block_by_id(42).await?;
//! println!("{}", outcome.message());
//! ```

pub mod account;
pub mod auth_key;
pub mod blocker;
pub mod clock;
pub mod commands;
pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod repository;
pub mod store;

pub use account::{Account, AccountId, AccountState};
pub use blocker::{AccountExpiryBlocker, BatchMode, BatchReport, Evaluation, Outcome, Severity};
pub use errors::{BlockerError, BlockerResult};
