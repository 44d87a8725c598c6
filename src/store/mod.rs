//! SQL storage for accounts.
//!
//! - `database` → DB abstraction over SQLite/Postgres implementing
//!   [`AccountRepository`](crate::repository::AccountRepository)

pub mod database;

pub use database::Database;
