//! Tunables for alerting rules.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings that control how a rule keeps alert state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    /// How long a resolved alert is kept so its resolution can be delivered
    /// (in seconds).
    pub resolved_retention_secs: u64,
}

impl RuleSettings {
    /// Returns the resolved-alert retention as a [`Duration`].
    #[must_use]
    pub const fn resolved_retention(&self) -> Duration {
        Duration::from_secs(self.resolved_retention_secs)
    }
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            resolved_retention_secs: 15 * 60,
        }
    }
}

/// Settings that control restoring alert state after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreSettings {
    /// Longest downtime after which state is still restored (in seconds).
    pub outage_tolerance_secs: u64,
    /// Minimum time an alert stays pending after a restore before it may
    /// fire (in seconds). Rules with a shorter hold duration are not
    /// restored.
    pub for_grace_period_secs: u64,
}

impl RestoreSettings {
    /// Returns the outage tolerance as a [`Duration`].
    #[must_use]
    pub const fn outage_tolerance(&self) -> Duration {
        Duration::from_secs(self.outage_tolerance_secs)
    }

    /// Returns the grace period as a [`Duration`].
    #[must_use]
    pub const fn for_grace_period(&self) -> Duration {
        Duration::from_secs(self.for_grace_period_secs)
    }
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            outage_tolerance_secs: 3600, // 1 hour
            for_grace_period_secs: 600,  // 10 minutes
        }
    }
}
