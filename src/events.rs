//! Block notification hooks.
//!
//! The blocker calls every registered [`BlockObserver`] immediately before and
//! immediately after an account is blocked. Observers run in registration
//! order; the first error aborts the evaluation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use userblock::events::{AuditLogObserver, RecordingObserver};
//!
//! let recorder = Arc::new(RecordingObserver::default());
//! let blocker = AccountExpiryBlocker::new(repo, clock, grace)
//!     .with_observer(Arc::new(AuditLogObserver))
//!     .with_observer(recorder.clone());
//! ```

use std::sync::Mutex;

use tracing::{info, info_span};

use crate::account::{Account, AccountId};
use crate::errors::{BlockerError, BlockerResult};

/// Block lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEvent {
    /// Emitted before `blocked_at` is written
    BeforeBlock,
    /// Emitted after the blocked account was persisted
    AfterBlock,
}

impl std::fmt::Display for BlockEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BlockEvent::BeforeBlock => "before_block",
            BlockEvent::AfterBlock => "after_block",
        };
        write!(f, "{}", s)
    }
}

/// Subscriber to block events.
///
/// Both hooks default to doing nothing so implementors only override what
/// they need.
pub trait BlockObserver: Send + Sync {
    /// Called with the account as it was before the transition.
    fn on_before_block(&self, _account: &Account) -> BlockerResult<()> {
        Ok(())
    }

    /// Called with the account as it was persisted.
    fn on_after_block(&self, _account: &Account) -> BlockerResult<()> {
        Ok(())
    }
}

/// Writes a structured `tracing` event for every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogObserver;

impl AuditLogObserver {
    fn log(event: BlockEvent, account: &Account) {
        let span = info_span!(
            "account_event",
            event = %event,
            account_id = %account.id,
            username = %account.username,
        );
        let _enter = span.enter();

        match event {
            BlockEvent::BeforeBlock => info!(created_at = %account.created_at, "Blocking account"),
            BlockEvent::AfterBlock => info!(
                blocked_at = ?account.blocked_at,
                "Account blocked"
            ),
        }
    }
}

impl BlockObserver for AuditLogObserver {
    fn on_before_block(&self, account: &Account) -> BlockerResult<()> {
        Self::log(BlockEvent::BeforeBlock, account);
        Ok(())
    }

    fn on_after_block(&self, account: &Account) -> BlockerResult<()> {
        Self::log(BlockEvent::AfterBlock, account);
        Ok(())
    }
}

/// Keeps every event it sees, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(BlockEvent, AccountId)>>,
}

impl RecordingObserver {
    fn record(&self, event: BlockEvent, account: &Account) -> BlockerResult<()> {
        self.events
            .lock()
            .map_err(|_| BlockerError::ObserverError("recorder lock poisoned".to_string()))?
            .push((event, account.id));
        Ok(())
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<(BlockEvent, AccountId)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl BlockObserver for RecordingObserver {
    fn on_before_block(&self, account: &Account) -> BlockerResult<()> {
        self.record(BlockEvent::BeforeBlock, account)
    }

    fn on_after_block(&self, account: &Account) -> BlockerResult<()> {
        self.record(BlockEvent::AfterBlock, account)
    }
}
