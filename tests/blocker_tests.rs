//! Blocker behavior against the SQLite store.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use sqlx::sqlite::SqlitePoolOptions;

use userblock::clock::ManualClock;
use userblock::config::BlockerConfig;
use userblock::events::{AuditLogObserver, BlockEvent, RecordingObserver};
use userblock::repository::AccountRepository;
use userblock::store::Database;
use userblock::{Account, AccountExpiryBlocker, BatchMode, BlockerError, Outcome};

const GRACE_SECS: i64 = 259_200;

/// Helper to create a test database.
async fn setup_test_db() -> Arc<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to create database");

    let db = Database::sqlite(pool);
    db.ensure_schema().await.expect("failed to create users table");
    Arc::new(db)
}

/// Helper to create an account with specific timestamps.
async fn create_test_account(
    db: &Database,
    id: i64,
    created_at: NaiveDateTime,
    confirmed_at: Option<NaiveDateTime>,
    blocked_at: Option<NaiveDateTime>,
) {
    let mut account = Account::new(id, format!("user{id}"), format!("user{id}@example.com"), created_at);
    account.confirmed_at = confirmed_at;
    account.blocked_at = blocked_at;
    account.auth_key = Some(format!("key-{id}"));

    db.insert_account(&account)
        .await
        .expect("failed to insert account");
}

fn t() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn blocker_at(
    db: &Arc<Database>,
    now: NaiveDateTime,
) -> (AccountExpiryBlocker, Arc<RecordingObserver>) {
    let recorder = Arc::new(RecordingObserver::default());
    let config = BlockerConfig::default();
    let blocker = AccountExpiryBlocker::from_config(db.clone(), Arc::new(ManualClock::new(now)), &config)
        .expect("valid config")
        .with_observer(Arc::new(AuditLogObserver))
        .with_observer(recorder.clone());
    (blocker, recorder)
}

// ============================================================================
// Single account
// ============================================================================

#[tokio::test]
async fn account_past_grace_period_is_blocked() {
    let db = setup_test_db().await;
    create_test_account(&db, 1, t(), None, None).await;

    let now = t() + Duration::seconds(GRACE_SECS + 1);
    let (blocker, recorder) = blocker_at(&db, now);

    assert_eq!(blocker.block_by_id(1).await.unwrap(), Outcome::Blocked);

    let account = db.find_by_id(1).await.unwrap().unwrap();
    assert_eq!(account.blocked_at, Some(now));
    assert_ne!(account.auth_key.as_deref(), Some("key-1"));
    assert_eq!(
        recorder.events(),
        vec![(BlockEvent::BeforeBlock, 1), (BlockEvent::AfterBlock, 1)]
    );
}

#[tokio::test]
async fn account_within_grace_period_is_untouched() {
    let db = setup_test_db().await;
    create_test_account(&db, 1, t(), None, None).await;

    let (blocker, recorder) = blocker_at(&db, t() + Duration::seconds(GRACE_SECS));

    assert_eq!(blocker.block_by_id(1).await.unwrap(), Outcome::NotYetEligible);

    let account = db.find_by_id(1).await.unwrap().unwrap();
    assert!(account.blocked_at.is_none());
    assert_eq!(account.auth_key.as_deref(), Some("key-1"));
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn confirmed_account_is_reported_not_blocked() {
    let db = setup_test_db().await;
    create_test_account(&db, 1, t(), Some(t() + Duration::hours(2)), None).await;

    let (blocker, recorder) = blocker_at(&db, t() + Duration::days(30));

    assert_eq!(blocker.block_by_id(1).await.unwrap(), Outcome::AlreadyConfirmed);
    assert!(db.find_by_id(1).await.unwrap().unwrap().blocked_at.is_none());
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn blocking_twice_is_a_no_op() {
    let db = setup_test_db().await;
    create_test_account(&db, 1, t(), None, None).await;

    let first_run = t() + Duration::days(4);
    let (blocker, recorder) = blocker_at(&db, first_run);
    assert_eq!(blocker.block_by_id(1).await.unwrap(), Outcome::Blocked);
    assert_eq!(blocker.block_by_id(1).await.unwrap(), Outcome::AlreadyBlocked);

    let (later, later_recorder) = blocker_at(&db, t() + Duration::days(8));
    assert_eq!(later.block_by_id(1).await.unwrap(), Outcome::AlreadyBlocked);

    assert_eq!(
        db.find_by_id(1).await.unwrap().unwrap().blocked_at,
        Some(first_run)
    );
    assert_eq!(recorder.events().len(), 2);
    assert!(later_recorder.events().is_empty());
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let db = setup_test_db().await;
    let (blocker, _) = blocker_at(&db, t());

    let err = blocker.block_by_id(999).await.unwrap_err();
    assert!(matches!(err, BlockerError::NotFound(999)));
}

// ============================================================================
// Batch
// ============================================================================

#[tokio::test]
async fn batch_stops_at_first_account_not_blocked() {
    let db = setup_test_db().await;
    let now = t() + Duration::days(4);

    // Account 1 was created an hour ago, account 2 long enough ago to block.
    create_test_account(&db, 1, now - Duration::hours(1), None, None).await;
    create_test_account(&db, 2, t(), None, None).await;

    let (blocker, recorder) = blocker_at(&db, now);
    let report = blocker.block_all().await.unwrap();

    assert_eq!(report.outcomes(), vec![Outcome::NotYetEligible]);
    assert!(report.stopped_early);
    assert!(db.find_by_id(2).await.unwrap().unwrap().blocked_at.is_none());
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn batch_in_continue_mode_blocks_every_eligible_account() {
    let db = setup_test_db().await;
    let now = t() + Duration::days(4);

    create_test_account(&db, 1, now - Duration::hours(1), None, None).await;
    create_test_account(&db, 2, t(), None, None).await;
    create_test_account(&db, 3, t(), Some(t()), None).await;
    create_test_account(&db, 4, t(), None, Some(t() + Duration::days(3))).await;
    create_test_account(&db, 5, t() - Duration::days(1), None, None).await;

    let (blocker, recorder) = blocker_at(&db, now);
    let blocker = blocker.with_batch_mode(BatchMode::Continue);
    let report = blocker.block_all().await.unwrap();

    // Confirmed account 3 is not part of the unconfirmed set.
    assert_eq!(
        report.outcomes(),
        vec![
            Outcome::NotYetEligible,
            Outcome::Blocked,
            Outcome::AlreadyBlocked,
            Outcome::Blocked,
        ]
    );
    assert_eq!(report.blocked_count(), 2);
    assert!(!report.stopped_early);
    assert_eq!(db.find_by_id(5).await.unwrap().unwrap().blocked_at, Some(now));
    assert_eq!(
        recorder.events(),
        vec![
            (BlockEvent::BeforeBlock, 2),
            (BlockEvent::AfterBlock, 2),
            (BlockEvent::BeforeBlock, 5),
            (BlockEvent::AfterBlock, 5),
        ]
    );
}

#[tokio::test]
async fn batch_over_empty_set_reports_nothing() {
    let db = setup_test_db().await;
    let (blocker, _) = blocker_at(&db, t());

    let report = blocker.block_all().await.unwrap();

    assert!(report.evaluations.is_empty());
    assert!(!report.stopped_early);
}
