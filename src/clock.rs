//! Time source used by the eligibility check.

use chrono::{Duration, NaiveDateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Supplies the current UTC time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.instant() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.instant() += by;
    }

    // A plain timestamp stays valid even if a holder panicked.
    fn instant(&self) -> MutexGuard<'_, NaiveDateTime> {
        self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.instant()
    }
}
