//! Expiry blocking of unconfirmed accounts.
//!
//! An account that is neither confirmed nor blocked is *pending*. Once a
//! pending account is older than the configured grace period it becomes
//! block-eligible, and [`AccountExpiryBlocker`] blocks it:
//!
//! 1. every observer's `on_before_block` runs
//! 2. `blocked_at` is set to the clock's current time and the auth key rotated
//! 3. the account is saved through the repository
//! 4. every observer's `on_after_block` runs
//!
//! Confirmed, already blocked and not-yet-eligible accounts are left alone.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::{Account, AccountId, AccountState};
use crate::auth_key::generate_auth_key;
use crate::clock::Clock;
use crate::config::BlockerConfig;
use crate::errors::{BlockerError, BlockerResult};
use crate::events::BlockObserver;
use crate::repository::AccountRepository;

/// Default grace period: 3 days.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 3 * 86_400;

/// Result of evaluating one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    AlreadyConfirmed,
    AlreadyBlocked,
    NotYetEligible,
    Blocked,
}

/// How an outcome should be presented to an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Success,
}

impl Outcome {
    /// Status line printed for this outcome.
    pub fn message(&self) -> &'static str {
        match self {
            Outcome::AlreadyConfirmed => "User confirmed",
            Outcome::AlreadyBlocked => "User already blocked",
            Outcome::NotYetEligible => "User not blocked",
            Outcome::Blocked => "User has been blocked",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Outcome::AlreadyConfirmed | Outcome::AlreadyBlocked => Severity::Info,
            Outcome::NotYetEligible => Severity::Warning,
            Outcome::Blocked => Severity::Success,
        }
    }

    /// Machine-readable name, as used in JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::AlreadyConfirmed => "already_confirmed",
            Outcome::AlreadyBlocked => "already_blocked",
            Outcome::NotYetEligible => "not_yet_eligible",
            Outcome::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a batch run does after an account that was not blocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Stop the whole batch at the first confirmed, already blocked or
    /// not-yet-eligible account. This is how the batch command has always
    /// behaved, although it is most likely an accident.
    #[default]
    StopOnSkip,
    /// Evaluate every unconfirmed account.
    Continue,
}

/// Outcome for a specific account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    #[serde(rename = "id")]
    pub account_id: AccountId,
    pub outcome: Outcome,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Evaluations in processing order, including the one that stopped the
    /// batch.
    pub evaluations: Vec<Evaluation>,
    /// True when [`BatchMode::StopOnSkip`] cut the batch short.
    pub stopped_early: bool,
}

impl BatchReport {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.evaluations.iter().map(|e| e.outcome).collect()
    }

    pub fn blocked_count(&self) -> usize {
        self.evaluations
            .iter()
            .filter(|e| e.outcome == Outcome::Blocked)
            .count()
    }
}

/// Convert a grace period in seconds into a [`Duration`].
pub fn grace_period_from_secs(secs: u64) -> BlockerResult<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| BlockerError::ConfigError(format!("grace period {secs}s is out of range")))
}

/// Blocks pending accounts whose grace period has elapsed.
pub struct AccountExpiryBlocker {
    repo: Arc<dyn AccountRepository>,
    clock: Arc<dyn Clock>,
    grace_period: Duration,
    batch_mode: BatchMode,
    observers: Vec<Arc<dyn BlockObserver>>,
}

impl std::fmt::Debug for AccountExpiryBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountExpiryBlocker")
            .field("grace_period", &self.grace_period)
            .field("batch_mode", &self.batch_mode)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl AccountExpiryBlocker {
    /// Create a blocker with [`BatchMode::StopOnSkip`] and no observers.
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        clock: Arc<dyn Clock>,
        grace_period: Duration,
    ) -> Self {
        Self {
            repo,
            clock,
            grace_period,
            batch_mode: BatchMode::default(),
            observers: Vec::new(),
        }
    }

    /// Create a blocker from the `[blocker]` configuration section.
    pub fn from_config(
        repo: Arc<dyn AccountRepository>,
        clock: Arc<dyn Clock>,
        config: &BlockerConfig,
    ) -> BlockerResult<Self> {
        let grace_period = grace_period_from_secs(config.grace_period_secs)?;
        Ok(Self::new(repo, clock, grace_period).with_batch_mode(config.batch_mode))
    }

    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn BlockObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register an observer on an existing blocker.
    pub fn register(&mut self, observer: Arc<dyn BlockObserver>) {
        self.observers.push(observer);
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn batch_mode(&self) -> BatchMode {
        self.batch_mode
    }

    /// Evaluate one account and block it if it is eligible.
    ///
    /// On [`Outcome::Blocked`] the passed account carries the new
    /// `blocked_at` and `auth_key`. Any other outcome leaves it untouched.
    pub async fn evaluate_and_block(&self, account: &mut Account) -> BlockerResult<Outcome> {
        let now = self.clock.now();

        match account.state() {
            AccountState::Confirmed => {
                debug!("Account {} is confirmed, skipping", account.id);
                return Ok(Outcome::AlreadyConfirmed);
            }
            AccountState::Blocked => {
                debug!(
                    "Account {} already blocked at {:?}",
                    account.id, account.blocked_at
                );
                return Ok(Outcome::AlreadyBlocked);
            }
            AccountState::Pending => {}
        }

        // An unrepresentable threshold lies beyond any clock reading.
        let eligible = account
            .created_at
            .checked_add_signed(self.grace_period)
            .is_some_and(|threshold| now > threshold);

        if !eligible {
            debug!(
                "Account {} created at {} is still within its grace period",
                account.id, account.created_at
            );
            return Ok(Outcome::NotYetEligible);
        }

        for observer in &self.observers {
            observer.on_before_block(account)?;
        }

        let mut blocked = account.clone();
        blocked.blocked_at = Some(now);
        blocked.auth_key = Some(generate_auth_key());
        self.repo.save(&blocked).await?;
        *account = blocked;

        info!(
            "Account {} ({}) blocked: unconfirmed since {}",
            account.id, account.username, account.created_at
        );

        for observer in &self.observers {
            observer.on_after_block(account)?;
        }

        Ok(Outcome::Blocked)
    }

    /// Resolve an account by id and evaluate it.
    ///
    /// Fails with [`BlockerError::NotFound`] if no such account exists.
    pub async fn block_by_id(&self, id: AccountId) -> BlockerResult<Outcome> {
        let mut account = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(BlockerError::NotFound(id))?;

        self.evaluate_and_block(&mut account).await
    }

    /// Evaluate every unconfirmed account in the order storage returns them.
    ///
    /// Under [`BatchMode::StopOnSkip`] the run ends at the first account that
    /// was not blocked.
    pub async fn block_all(&self) -> BlockerResult<BatchReport> {
        self.block_all_with(|_| Ok(())).await
    }

    /// Like [`block_all`](Self::block_all), calling `on_evaluation` with each
    /// evaluation as soon as it is made.
    ///
    /// If a later account fails, the callback has already seen every
    /// evaluation before it. An error from the callback ends the run.
    pub async fn block_all_with<F>(&self, mut on_evaluation: F) -> BlockerResult<BatchReport>
    where
        F: FnMut(&Evaluation) -> BlockerResult<()>,
    {
        let accounts = self.repo.find_all_unconfirmed().await?;
        debug!("Evaluating {} unconfirmed accounts", accounts.len());

        let mut report = BatchReport::default();

        for mut account in accounts {
            let outcome = self.evaluate_and_block(&mut account).await?;
            let evaluation = Evaluation {
                account_id: account.id,
                outcome,
            };
            on_evaluation(&evaluation)?;
            report.evaluations.push(evaluation);

            if outcome != Outcome::Blocked && self.batch_mode == BatchMode::StopOnSkip {
                warn!(
                    "Batch stopped at account {} ({}); remaining accounts were not evaluated",
                    account.id, outcome
                );
                report.stopped_early = true;
                break;
            }
        }

        info!(
            "Batch finished: {} evaluated, {} blocked",
            report.evaluations.len(),
            report.blocked_count()
        );

        Ok(report)
    }
}
