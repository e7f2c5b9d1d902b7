//! Core types for alerting rules.
//!
//! - [`AlertState`]: the lifecycle state of an alert
//! - [`RuleHealth`]: the health of a rule after its last evaluation
//! - [`Alert`]: one tracked label set of a rule

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use warden_series::LabelSet;

/// Metric name of the series reporting alert state.
pub const ALERTS_METRIC: &str = "ALERTS";

/// Metric name of the series carrying alert activation time.
pub const ALERTS_FOR_STATE_METRIC: &str = "ALERTS_FOR_STATE";

/// The state of an alert.
///
/// States are ordered by severity: `Inactive < Pending < Firing`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// The alert is not active. Resolved alerts are kept in this state for
    /// a retention period.
    #[default]
    Inactive,
    /// The expression matches but has not matched for the hold duration.
    Pending,
    /// The alert is actively firing.
    Firing,
}

impl AlertState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Pending => "pending",
            Self::Firing => "firing",
        }
    }

    /// Returns true if the alert is currently active (pending or firing).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Firing)
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The health of a rule as of its last evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleHealth {
    /// The rule has not been evaluated yet.
    #[default]
    Unknown,
    /// The last evaluation succeeded.
    Ok,
    /// The last evaluation failed.
    Err,
}

impl RuleHealth {
    /// Returns the health as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ok => "ok",
            Self::Err => "err",
        }
    }

    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Ok => 1,
            Self::Err => 2,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ok,
            2 => Self::Err,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for RuleHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One label set tracked by an alerting rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// The current state of the alert.
    pub state: AlertState,
    /// Identifying labels: series labels, rule labels and `alertname`.
    pub labels: LabelSet,
    /// Templated annotations.
    pub annotations: LabelSet,
    /// The value of the matching sample at the last evaluation.
    pub value: f64,
    /// When the alert became pending.
    pub active_at: DateTime<Utc>,
    /// When the alert started firing.
    pub fired_at: Option<DateTime<Utc>>,
    /// When the alert was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// When the alert was last handed to delivery.
    pub last_sent_at: Option<DateTime<Utc>>,
    /// How long the last delivered copy stays valid downstream.
    pub valid_until: Option<DateTime<Utc>>,
}

impl Alert {
    /// Creates a new pending alert.
    #[must_use]
    pub fn new_pending(
        labels: LabelSet,
        annotations: LabelSet,
        value: f64,
        active_at: DateTime<Utc>,
    ) -> Self {
        Self {
            state: AlertState::Pending,
            labels,
            annotations,
            value,
            active_at,
            ..Self::default()
        }
    }

    /// Transitions the alert from pending to firing.
    pub fn fire(&mut self, at: DateTime<Utc>) {
        if self.state == AlertState::Pending {
            self.state = AlertState::Firing;
            self.fired_at = Some(at);
        }
    }

    /// Resolves the alert.
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        if self.state != AlertState::Inactive {
            self.state = AlertState::Inactive;
            self.resolved_at = Some(at);
        }
    }

    /// Returns true if the alert is currently active (pending or firing).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Returns true if the alert should be handed to delivery at `at`.
    ///
    /// Pending alerts are never sent. A resolution that happened after the
    /// last send is always sent; otherwise the alert is re-sent once
    /// `resend_delay` has passed since the last send.
    #[must_use]
    pub fn needs_sending(&self, at: DateTime<Utc>, resend_delay: Duration) -> bool {
        if self.state == AlertState::Pending {
            return false;
        }

        match (self.resolved_at, self.last_sent_at) {
            (Some(_), None) => return true,
            (Some(resolved), Some(sent)) if resolved > sent => return true,
            _ => {}
        }

        self.last_sent_at.is_none_or(|sent| {
            sent.checked_add_signed(to_time_delta(resend_delay))
                .is_some_and(|due| due < at)
        })
    }
}

/// Converts a std duration to a chrono delta, saturating on overflow.
pub(crate) fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
