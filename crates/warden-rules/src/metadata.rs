//! Evaluation metadata readable while an evaluation is in flight.
//!
//! Every field is synchronized on its own, so a reader of one field never
//! waits on a writer of another, and none of them share a lock with the
//! active-alert map.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::types::RuleHealth;

/// Marks an evaluation timestamp that was never set.
const UNSET: i64 = i64::MIN;

/// Health, last error and timing of the most recent evaluation.
#[derive(Debug)]
pub struct RuleMetadata {
    health: AtomicU8,
    last_error: RwLock<Option<String>>,
    /// Unix milliseconds, or [`UNSET`].
    evaluation_timestamp: AtomicI64,
    /// Nanoseconds.
    evaluation_duration: AtomicU64,
}

impl RuleMetadata {
    /// Creates metadata for a rule that has not been evaluated.
    #[must_use]
    pub fn new() -> Self {
        Self {
            health: AtomicU8::new(RuleHealth::Unknown.to_u8()),
            last_error: RwLock::new(None),
            evaluation_timestamp: AtomicI64::new(UNSET),
            evaluation_duration: AtomicU64::new(0),
        }
    }

    /// Returns the health.
    pub fn health(&self) -> RuleHealth {
        RuleHealth::from_u8(self.health.load(Ordering::Acquire))
    }

    /// Sets the health.
    pub fn set_health(&self, health: RuleHealth) {
        self.health.store(health.to_u8(), Ordering::Release);
    }

    /// Returns the last error message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Sets or clears the last error message.
    pub fn set_last_error(&self, error: Option<String>) {
        *self.last_error.write() = error;
    }

    /// Returns the timestamp of the last successful evaluation.
    pub fn evaluation_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.evaluation_timestamp.load(Ordering::Acquire) {
            UNSET => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    /// Sets the evaluation timestamp.
    pub fn set_evaluation_timestamp(&self, at: DateTime<Utc>) {
        self.evaluation_timestamp
            .store(at.timestamp_millis(), Ordering::Release);
    }

    /// Returns how long the last successful evaluation took.
    pub fn evaluation_duration(&self) -> Duration {
        Duration::from_nanos(self.evaluation_duration.load(Ordering::Acquire))
    }

    /// Sets the evaluation duration.
    #[allow(clippy::cast_possible_truncation)] // Saturates at ~584 years
    pub fn set_evaluation_duration(&self, duration: Duration) {
        let nanos = duration.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.evaluation_duration.store(nanos, Ordering::Release);
    }
}

impl Default for RuleMetadata {
    fn default() -> Self {
        Self::new()
    }
}
