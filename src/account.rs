//! Account records as seen by the blocker.
//!
//! Accounts are owned by the user-management module. This crate reads them,
//! decides which of three states they are in, and only ever writes the
//! `blocked_at` / `auth_key` pair.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Primary key of the `users` table.
pub type AccountId = i64;

/// A user account row.
///
/// Timestamps are UTC. The SQL store keeps them as Unix seconds, see
/// [`Database`](crate::store::database::Database).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    /// Session / remember-me key. Rotated when the account is blocked.
    pub auth_key: Option<String>,
    pub created_at: NaiveDateTime,
    pub confirmed_at: Option<NaiveDateTime>,
    pub blocked_at: Option<NaiveDateTime>,
}

/// Logical state of an account at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Confirmed,
    Blocked,
    /// Neither confirmed nor blocked.
    Pending,
}

impl Account {
    /// Create a pending account created at `created_at`.
    pub fn new(
        id: AccountId,
        username: impl Into<String>,
        email: impl Into<String>,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
            auth_key: None,
            created_at,
            confirmed_at: None,
            blocked_at: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_at.is_some()
    }

    /// Confirmation wins over blocking when both timestamps are present.
    pub fn state(&self) -> AccountState {
        if self.is_confirmed() {
            AccountState::Confirmed
        } else if self.is_blocked() {
            AccountState::Blocked
        } else {
            AccountState::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn pending() -> Account {
        Account::new(1, "alice", "alice@example.com", Utc::now().naive_utc())
    }

    #[test]
    fn new_account_is_pending() {
        assert_eq!(pending().state(), AccountState::Pending);
    }

    #[test]
    fn blocked_account_state() {
        let mut account = pending();
        account.blocked_at = Some(account.created_at + Duration::days(4));
        assert_eq!(account.state(), AccountState::Blocked);
    }

    #[test]
    fn confirmed_takes_precedence_over_blocked() {
        let mut account = pending();
        account.confirmed_at = Some(account.created_at);
        account.blocked_at = Some(account.created_at);
        assert_eq!(account.state(), AccountState::Confirmed);
    }
}
