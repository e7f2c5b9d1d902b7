//! Restoring alert activation times after a restart.
//!
//! Every evaluation writes an `ALERTS_FOR_STATE` sample per active alert
//! whose value is the activation time in unix seconds. After a restart the
//! latest such sample tells how long an alert had already been pending, so
//! it does not have to wait out its full hold duration again.

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use warden_series::{
    LabelMatcher, LabelSet, Querier, SelectHints, Series, ALERT_NAME, METRIC_NAME,
};

use crate::error::Result;
use crate::rule::AlertingRule;
use crate::types::{to_time_delta, Alert, ALERTS_FOR_STATE_METRIC};

impl AlertingRule {
    /// Looks up the `ALERTS_FOR_STATE` series of `alert`.
    ///
    /// Returns `Ok(None)` if no series matches exactly, and the first exactly
    /// matching series otherwise.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::RestorationQuery` if the querier fails.
    pub fn query_for_state_series(
        &self,
        alert: &Alert,
        querier: &dyn Querier,
    ) -> Result<Option<Series>> {
        self.select_state_series(&alert.labels, querier, &SelectHints::unbounded())
    }

    /// Restores the activation time of every active alert from history.
    ///
    /// Does nothing if the rule has no querier or its hold duration is
    /// shorter than the grace period. Lookup failures are logged and leave
    /// the alert untouched. Returns the number of alerts restored.
    pub fn restore_for_state(&self, ctx: &CancellationToken, ts: DateTime<Utc>) -> usize {
        let _entered = self.span.enter();
        let Some(querier) = self.querier.as_deref() else {
            self.set_restored(true);
            return 0;
        };

        let candidates: Vec<(u64, LabelSet)> = self
            .active
            .lock()
            .iter()
            .filter(|(_, alert)| alert.is_active())
            .map(|(fp, alert)| (*fp, alert.labels.clone()))
            .collect();

        let mut updates = Vec::new();
        for (fp, labels) in candidates {
            if ctx.is_cancelled() {
                debug!(rule = %self.name, "restoration canceled");
                return 0;
            }
            match self.restored_active_at(&labels, querier, ts) {
                Ok(Some(active_at)) => updates.push((fp, active_at)),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        rule = %self.name,
                        labels = %labels,
                        error = %e,
                        "failed to restore alert state"
                    );
                }
            }
        }

        let mut restored = 0;
        {
            let mut active = self.active.lock();
            for (fp, active_at) in updates {
                if let Some(alert) = active.get_mut(&fp).filter(|a| a.is_active()) {
                    alert.active_at = active_at;
                    restored += 1;
                }
            }
        }
        self.set_restored(true);
        restored
    }

    /// Computes the activation time to restore for an alert with `labels`.
    ///
    /// Returns `Ok(None)` when there is nothing to restore: restoration is
    /// disabled for this rule's hold duration, no history exists inside the
    /// outage tolerance, or the alert was not active at shutdown.
    pub(crate) fn restored_active_at(
        &self,
        labels: &LabelSet,
        querier: &dyn Querier,
        ts: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let hold = to_time_delta(self.hold_duration);
        let grace = to_time_delta(self.restore_settings.for_grace_period());
        if hold < grace {
            return Ok(None);
        }

        let lookback = to_time_delta(self.restore_settings.outage_tolerance())
            .checked_add(&hold)
            .unwrap_or(TimeDelta::MAX);
        let start = ts
            .checked_sub_signed(lookback)
            .map_or(i64::MIN, |start| start.timestamp_millis());
        let hints = SelectHints::new(start, ts.timestamp_millis());

        let Some(series) = self.select_state_series(labels, querier, &hints)? else {
            return Ok(None);
        };
        let Some(point) = series.last() else {
            return Ok(None);
        };
        if point.value.is_nan() {
            return Ok(None);
        }

        #[allow(clippy::cast_possible_truncation)] // Activation times are whole seconds
        let restored = DateTime::from_timestamp(point.value as i64, 0);
        let (Some(restored), Some(down_at)) =
            (restored, DateTime::from_timestamp_millis(point.timestamp))
        else {
            return Ok(None);
        };

        let Some(active_at) = adjust_active_at(restored, down_at, ts, hold, grace) else {
            warn!(
                rule = %self.name,
                labels = %labels,
                restored = %restored,
                down_at = %down_at,
                "stored activation time out of range, not restoring"
            );
            return Ok(None);
        };
        debug!(
            rule = %self.name,
            labels = %labels,
            restored = %restored,
            down_at = %down_at,
            active_at = %active_at,
            "restored alert activation time"
        );
        Ok(Some(active_at))
    }

    fn select_state_series(
        &self,
        labels: &LabelSet,
        querier: &dyn Querier,
        hints: &SelectHints,
    ) -> Result<Option<Series>> {
        let matchers = self.state_series_matchers(labels);
        let series = querier.select(hints, &matchers)?;
        Ok(series
            .into_iter()
            .find(|s| s.labels.len() == matchers.len()))
    }

    /// Equality matchers selecting the `ALERTS_FOR_STATE` series of an alert.
    ///
    /// Rule labels the alert does not carry are matched by their raw
    /// template text.
    fn state_series_matchers(&self, labels: &LabelSet) -> Vec<LabelMatcher> {
        let mut selector = labels.clone();
        for (name, value) in &self.labels {
            if !selector.contains(name) {
                selector.set(name.as_str(), value.as_str());
            }
        }
        selector.set(METRIC_NAME, ALERTS_FOR_STATE_METRIC);
        selector.set(ALERT_NAME, self.name.as_str());

        selector
            .iter()
            .map(|(name, value)| LabelMatcher::equal(name, value))
            .collect()
    }
}

/// Shifts a restored activation time across the downtime.
///
/// An alert that had already been pending for its whole hold duration keeps
/// its time. One that would fire within the grace period is pushed back so
/// it fires no earlier than `grace` after `ts`. Otherwise the downtime does
/// not count towards the hold duration.
///
/// Returns `None` if the stored times put the result out of range.
fn adjust_active_at(
    restored: DateTime<Utc>,
    down_at: DateTime<Utc>,
    ts: DateTime<Utc>,
    hold: TimeDelta,
    grace: TimeDelta,
) -> Option<DateTime<Utc>> {
    let spent = down_at.signed_duration_since(restored);
    let remaining = hold.checked_sub(&spent)?;
    if remaining <= TimeDelta::zero() {
        Some(restored)
    } else if remaining < grace {
        ts.checked_sub_signed(hold)?.checked_add_signed(grace)
    } else {
        restored.checked_add_signed(ts.signed_duration_since(down_at))
    }
}
