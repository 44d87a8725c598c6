//! Storage interface for accounts.
//!
//! The blocker only needs three things from storage, so that is all the trait
//! asks for. [`Database`](crate::store::database::Database) implements it over
//! SQLite/Postgres; [`MemoryRepository`] keeps rows in a map for tests and
//! dry runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::account::{Account, AccountId};
use crate::errors::{BlockerError, BlockerResult};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Fetch an account by id.
    ///
    /// Returns:
    /// - `Ok(Some(Account))` if found
    /// - `Ok(None)` if not found
    /// - `Err(BlockerError::DatabaseError)` on storage failure
    async fn find_by_id(&self, id: AccountId) -> BlockerResult<Option<Account>>;

    /// Fetch every account whose `confirmed_at` is unset.
    async fn find_all_unconfirmed(&self) -> BlockerResult<Vec<Account>>;

    /// Write the mutable columns (`confirmed_at`, `blocked_at`, `auth_key`)
    /// of an existing account back to storage.
    async fn save(&self, account: &Account) -> BlockerResult<()>;
}

/// In-memory repository keyed by account id.
///
/// Unconfirmed accounts are returned in id order.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    accounts: Mutex<BTreeMap<AccountId, Account>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository pre-populated with `accounts`.
    ///
    /// A later account replaces an earlier one with the same id.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: Mutex::new(accounts.into_iter().map(|a| (a.id, a)).collect()),
        }
    }

    /// Insert or replace an account.
    pub fn insert(&self, account: Account) -> BlockerResult<()> {
        self.lock()?.insert(account.id, account);
        Ok(())
    }

    /// Current copy of an account, if present.
    pub fn get(&self, id: AccountId) -> Option<Account> {
        self.lock().ok().and_then(|map| map.get(&id).cloned())
    }

    fn lock(&self) -> BlockerResult<std::sync::MutexGuard<'_, BTreeMap<AccountId, Account>>> {
        self.accounts
            .lock()
            .map_err(|_| BlockerError::DatabaseError("failed to acquire account store lock".into()))
    }
}

#[async_trait]
impl AccountRepository for MemoryRepository {
    async fn find_by_id(&self, id: AccountId) -> BlockerResult<Option<Account>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn find_all_unconfirmed(&self) -> BlockerResult<Vec<Account>> {
        Ok(self
            .lock()?
            .values()
            .filter(|account| account.confirmed_at.is_none())
            .cloned()
            .collect())
    }

    async fn save(&self, account: &Account) -> BlockerResult<()> {
        let mut map = self.lock()?;
        match map.get_mut(&account.id) {
            Some(stored) => {
                stored.confirmed_at = account.confirmed_at;
                stored.blocked_at = account.blocked_at;
                stored.auth_key = account.auth_key.clone();
                Ok(())
            }
            None => Err(BlockerError::DatabaseError(format!(
                "cannot save account {}: no such row",
                account.id
            ))),
        }
    }
}
