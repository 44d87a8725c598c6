use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;

use userblock::errors::{BlockerError, BlockerResult};
use userblock::repository::AccountRepository;
use userblock::store::Database;
use userblock::Account;

/// Helper: create an in-memory SQLite Database with the `users` table.
async fn setup_in_memory_db() -> BlockerResult<Arc<Database>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| BlockerError::DatabaseError(format!("db connect failed: {e}")))?;

    let db = Database::sqlite(pool);
    db.ensure_schema().await?;
    Ok(Arc::new(db))
}

/// A timestamp without sub-second part; the store keeps whole seconds.
fn registered_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2018, 1, 10)
        .unwrap()
        .and_hms_opt(16, 0, 0)
        .unwrap()
}

fn account(id: i64, created_at: NaiveDateTime) -> Account {
    Account::new(id, format!("user{id}"), format!("user{id}@example.com"), created_at)
}

#[tokio::test]
async fn find_by_id_round_trips_all_columns() -> BlockerResult<()> {
    let db = setup_in_memory_db().await?;
    let created = registered_at();

    let mut stored = account(1, created);
    stored.auth_key = Some("auth-key".to_string());
    db.insert_account(&stored).await?;

    let found = db.find_by_id(1).await?.expect("account should exist");
    assert_eq!(found, stored);

    assert!(db.find_by_id(2).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn find_all_unconfirmed_filters_and_orders_by_id() -> BlockerResult<()> {
    let db = setup_in_memory_db().await?;
    let created = Utc::now().naive_utc() - Duration::days(10);

    let mut confirmed = account(2, created);
    confirmed.confirmed_at = Some(created + Duration::hours(1));
    let mut blocked = account(1, created);
    blocked.blocked_at = Some(created + Duration::days(4));

    db.insert_account(&account(3, created)).await?;
    db.insert_account(&confirmed).await?;
    db.insert_account(&blocked).await?;

    let ids: Vec<i64> = db
        .find_all_unconfirmed()
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();

    assert_eq!(ids, vec![1, 3]);
    Ok(())
}

#[tokio::test]
async fn save_updates_block_columns() -> BlockerResult<()> {
    let db = setup_in_memory_db().await?;
    let created = Utc::now().naive_utc() - Duration::days(5);
    db.insert_account(&account(1, created)).await?;

    let mut changed = account(1, created);
    changed.blocked_at = Some(created + Duration::days(4));
    changed.auth_key = Some("rotated".to_string());
    db.save(&changed).await?;

    let found = db.find_by_id(1).await?.expect("account should exist");
    assert_eq!(found.blocked_at, changed.blocked_at);
    assert_eq!(found.auth_key.as_deref(), Some("rotated"));
    assert!(found.confirmed_at.is_none());
    Ok(())
}

#[tokio::test]
async fn save_missing_row_is_an_error() -> BlockerResult<()> {
    let db = setup_in_memory_db().await?;

    let err = db
        .save(&account(99, Utc::now().naive_utc()))
        .await
        .expect_err("no row to update");

    assert!(matches!(err, BlockerError::DatabaseError(_)));
    Ok(())
}

#[tokio::test]
async fn ensure_schema_is_repeatable() -> BlockerResult<()> {
    let db = setup_in_memory_db().await?;
    db.ensure_schema().await?;
    db.ensure_schema().await?;
    Ok(())
}

#[tokio::test]
async fn timestamps_are_stored_as_unix_seconds() -> BlockerResult<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| BlockerError::DatabaseError(format!("db connect failed: {e}")))?;

    // Table as maintained by the user-management module.
    sqlx::query(
        r#"
        CREATE TABLE "user" (
            id           INTEGER PRIMARY KEY,
            username     TEXT NOT NULL,
            email        TEXT NOT NULL,
            auth_key     TEXT,
            created_at   INTEGER NOT NULL,
            confirmed_at INTEGER,
            blocked_at   INTEGER
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(|e| BlockerError::DatabaseError(format!("table create failed: {e}")))?;

    sqlx::query(
        r#"INSERT INTO "user" (id, username, email, created_at) VALUES (1, 'alice', 'a@example.com', 1515600000)"#,
    )
    .execute(&pool)
    .await
    .map_err(|e| BlockerError::DatabaseError(format!("insert failed: {e}")))?;

    let db = Database::sqlite(pool.clone()).with_users_table("user")?;

    let mut pending = db.find_all_unconfirmed().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].created_at, registered_at());

    let mut account = pending.remove(0);
    account.blocked_at = Some(registered_at() + Duration::days(4));
    db.save(&account).await?;

    let (kind, value): (String, i64) =
        sqlx::query_as(r#"SELECT typeof(blocked_at), blocked_at FROM "user" WHERE id = 1"#)
            .fetch_one(&pool)
            .await
            .map_err(|e| BlockerError::DatabaseError(format!("select failed: {e}")))?;
    assert_eq!(kind, "integer");
    assert_eq!(value, 1_515_600_000 + 4 * 86_400);

    let found = db.find_by_id(1).await?.expect("account should exist");
    assert_eq!(found.blocked_at, account.blocked_at);
    Ok(())
}

#[tokio::test]
async fn invalid_table_name_is_rejected() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("db connect failed");

    let err = Database::sqlite(pool)
        .with_users_table("users; DROP TABLE users")
        .unwrap_err();
    assert!(matches!(err, BlockerError::ConfigError(_)));
}
