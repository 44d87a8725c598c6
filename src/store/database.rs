use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use sqlx::{query, query_as, FromRow};
use std::sync::Arc;
use tracing::error;

#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::account::{Account, AccountId};
use crate::config::{get_config, DatabaseConfig};
use crate::errors::{BlockerError, BlockerResult};
use crate::repository::AccountRepository;

/// Default name of the accounts table.
pub const DEFAULT_USERS_TABLE: &str = "users";

fn db_err(backend: &str, op: &str, e: sqlx::Error) -> BlockerError {
    error!("{backend} {op} failed: {e}");
    BlockerError::DatabaseError(e.to_string())
}

/// Check that `name` can be spliced into SQL as a quoted identifier.
pub fn validate_table_name(name: &str) -> BlockerResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !name.as_bytes()[0].is_ascii_digit();

    if valid {
        Ok(())
    } else {
        Err(BlockerError::ConfigError(format!(
            "invalid users table name '{name}': use letters, digits and underscores"
        )))
    }
}

/// Row layout of the accounts table.
///
/// The user-management module stores every timestamp as integer Unix
/// seconds, so that is what is read and written here.
#[derive(Debug, FromRow)]
struct AccountRow {
    id: i64,
    username: String,
    email: String,
    auth_key: Option<String>,
    created_at: i64,
    confirmed_at: Option<i64>,
    blocked_at: Option<i64>,
}

fn from_unix(column: &str, secs: i64) -> BlockerResult<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| {
            BlockerError::DatabaseError(format!("{column} holds out-of-range timestamp {secs}"))
        })
}

fn to_unix(at: NaiveDateTime) -> i64 {
    at.and_utc().timestamp()
}

impl TryFrom<AccountRow> for Account {
    type Error = BlockerError;

    fn try_from(row: AccountRow) -> BlockerResult<Self> {
        Ok(Account {
            id: row.id,
            username: row.username,
            email: row.email,
            auth_key: row.auth_key,
            created_at: from_unix("created_at", row.created_at)?,
            confirmed_at: row
                .confirmed_at
                .map(|s| from_unix("confirmed_at", s))
                .transpose()?,
            blocked_at: row
                .blocked_at
                .map(|s| from_unix("blocked_at", s))
                .transpose()?,
        })
    }
}

/// Connection pool for the enabled backends.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Pool::SQLite`
/// - `postgres` feature enables `Pool::Postgres`
#[derive(Debug, Clone)]
pub enum Pool {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

/// Account storage in the user-management database.
///
/// Timestamps are stored as integer Unix seconds (UTC), matching the table
/// the user-management module maintains. Sub-second precision is dropped on
/// write.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool,
    users_table: String,
}

impl Database {
    /// Wrap a pool, using the default `users` table.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            users_table: DEFAULT_USERS_TABLE.to_string(),
        }
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self::new(Pool::SQLite(pool))
    }

    #[cfg(feature = "postgres")]
    pub fn postgres(pool: PgPool) -> Self {
        Self::new(Pool::Postgres(pool))
    }

    /// Read and write accounts in `table` instead of `users`.
    pub fn with_users_table(mut self, table: &str) -> BlockerResult<Self> {
        validate_table_name(table)?;
        self.users_table = table.to_string();
        Ok(self)
    }

    pub fn users_table(&self) -> &str {
        &self.users_table
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Initialize the database connection from the global configuration.
    ///
    /// See `crate::config` for configuration options.
    pub async fn from_config() -> BlockerResult<Arc<Self>> {
        let config = get_config()?;
        Self::connect(&config.database).await
    }

    /// Connect to the database described by `db_config`.
    pub async fn connect(db_config: &DatabaseConfig) -> BlockerResult<Arc<Self>> {
        let pool = match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePool::connect(&db_config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        BlockerError::DatabaseError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Pool::SQLite(pool)
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => {
                return Err(BlockerError::ConfigError(
                    "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
                ))
            }
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        BlockerError::DatabaseError(format!(
                            "failed to connect to PostgreSQL: {e}"
                        ))
                    })?;

                Pool::Postgres(pool)
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => {
                return Err(BlockerError::ConfigError(
                    "PostgreSQL support not compiled in. Enable the 'postgres' feature."
                        .to_string(),
                ))
            }
            other => {
                return Err(BlockerError::ConfigError(format!(
                    "unsupported database type: {other}"
                )))
            }
        };

        Ok(Arc::new(
            Self::new(pool).with_users_table(&db_config.users_table)?,
        ))
    }

    /// Create the accounts table if it does not exist yet.
    ///
    /// Deployments normally point at the table the user-management module
    /// already maintains; this exists for fresh databases and tests.
    pub async fn ensure_schema(&self) -> BlockerResult<()> {
        match &self.pool {
            #[cfg(feature = "sqlite")]
            Pool::SQLite(pool) => {
                let sql = format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS "{}" (
                        id           INTEGER PRIMARY KEY,
                        username     TEXT NOT NULL,
                        email        TEXT NOT NULL,
                        auth_key     TEXT,
                        created_at   INTEGER NOT NULL,
                        confirmed_at INTEGER,
                        blocked_at   INTEGER
                    )
                    "#,
                    self.users_table
                );
                query(&sql)
                    .execute(pool)
                    .await
                    .map_err(|e| db_err("SQLite", "ensure_schema", e))?;
            }
            #[cfg(feature = "postgres")]
            Pool::Postgres(pool) => {
                let sql = format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS "{}" (
                        id           BIGINT PRIMARY KEY,
                        username     TEXT NOT NULL,
                        email        TEXT NOT NULL,
                        auth_key     TEXT,
                        created_at   BIGINT NOT NULL,
                        confirmed_at BIGINT,
                        blocked_at   BIGINT
                    )
                    "#,
                    self.users_table
                );
                query(&sql)
                    .execute(pool)
                    .await
                    .map_err(|e| db_err("Postgres", "ensure_schema", e))?;
            }
        }

        Ok(())
    }

    /// Insert a new account row.
    pub async fn insert_account(&self, account: &Account) -> BlockerResult<()> {
        let columns = "id, username, email, auth_key, created_at, confirmed_at, blocked_at";

        match &self.pool {
            #[cfg(feature = "sqlite")]
            Pool::SQLite(pool) => {
                let sql = format!(
                    r#"INSERT INTO "{}" ({columns}) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                    self.users_table
                );
                query(&sql)
                    .bind(account.id)
                    .bind(&account.username)
                    .bind(&account.email)
                    .bind(&account.auth_key)
                    .bind(to_unix(account.created_at))
                    .bind(account.confirmed_at.map(to_unix))
                    .bind(account.blocked_at.map(to_unix))
                    .execute(pool)
                    .await
                    .map_err(|e| db_err("SQLite", "insert_account", e))?;
            }
            #[cfg(feature = "postgres")]
            Pool::Postgres(pool) => {
                let sql = format!(
                    r#"INSERT INTO "{}" ({columns}) VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
                    self.users_table
                );
                query(&sql)
                    .bind(account.id)
                    .bind(&account.username)
                    .bind(&account.email)
                    .bind(&account.auth_key)
                    .bind(to_unix(account.created_at))
                    .bind(account.confirmed_at.map(to_unix))
                    .bind(account.blocked_at.map(to_unix))
                    .execute(pool)
                    .await
                    .map_err(|e| db_err("Postgres", "insert_account", e))?;
            }
        }

        Ok(())
    }

    fn select_columns(&self) -> String {
        format!(
            r#"SELECT id, username, email, auth_key, created_at, confirmed_at, blocked_at FROM "{}""#,
            self.users_table
        )
    }
}

#[async_trait]
impl AccountRepository for Database {
    async fn find_by_id(&self, id: AccountId) -> BlockerResult<Option<Account>> {
        let row = match &self.pool {
            #[cfg(feature = "sqlite")]
            Pool::SQLite(pool) => {
                let sql = format!("{} WHERE id = ?", self.select_columns());
                query_as::<_, AccountRow>(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| db_err("SQLite", "find_by_id", e))?
            }
            #[cfg(feature = "postgres")]
            Pool::Postgres(pool) => {
                let sql = format!("{} WHERE id = $1", self.select_columns());
                query_as::<_, AccountRow>(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| db_err("Postgres", "find_by_id", e))?
            }
        };

        row.map(Account::try_from).transpose()
    }

    async fn find_all_unconfirmed(&self) -> BlockerResult<Vec<Account>> {
        let sql = format!(
            "{} WHERE confirmed_at IS NULL ORDER BY id",
            self.select_columns()
        );

        let rows = match &self.pool {
            #[cfg(feature = "sqlite")]
            Pool::SQLite(pool) => query_as::<_, AccountRow>(&sql)
                .fetch_all(pool)
                .await
                .map_err(|e| db_err("SQLite", "find_all_unconfirmed", e))?,
            #[cfg(feature = "postgres")]
            Pool::Postgres(pool) => query_as::<_, AccountRow>(&sql)
                .fetch_all(pool)
                .await
                .map_err(|e| db_err("Postgres", "find_all_unconfirmed", e))?,
        };

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn save(&self, account: &Account) -> BlockerResult<()> {
        let rows_affected = match &self.pool {
            #[cfg(feature = "sqlite")]
            Pool::SQLite(pool) => {
                let sql = format!(
                    r#"UPDATE "{}" SET confirmed_at = ?, blocked_at = ?, auth_key = ? WHERE id = ?"#,
                    self.users_table
                );
                query(&sql)
                    .bind(account.confirmed_at.map(to_unix))
                    .bind(account.blocked_at.map(to_unix))
                    .bind(&account.auth_key)
                    .bind(account.id)
                    .execute(pool)
                    .await
                    .map_err(|e| db_err("SQLite", "save", e))?
                    .rows_affected()
            }
            #[cfg(feature = "postgres")]
            Pool::Postgres(pool) => {
                let sql = format!(
                    r#"UPDATE "{}" SET confirmed_at = $1, blocked_at = $2, auth_key = $3 WHERE id = $4"#,
                    self.users_table
                );
                query(&sql)
                    .bind(account.confirmed_at.map(to_unix))
                    .bind(account.blocked_at.map(to_unix))
                    .bind(&account.auth_key)
                    .bind(account.id)
                    .execute(pool)
                    .await
                    .map_err(|e| db_err("Postgres", "save", e))?
                    .rows_affected()
            }
        };

        if rows_affected == 0 {
            return Err(BlockerError::DatabaseError(format!(
                "cannot save account {}: no such row",
                account.id
            )));
        }

        Ok(())
    }
}
