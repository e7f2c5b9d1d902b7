//! One evaluation pass of an alerting rule.
//!
//! A pass runs in three phases:
//!
//! 1. **Query and expand**: run the expression, render label and annotation
//!    templates for every result. Nothing is locked.
//! 2. **Check**: reject duplicate label sets, enforce the limit, look up
//!    restored activation times on the first pass, observe cancellation.
//! 3. **Commit**: under the active-set lock, merge the results, resolve or
//!    drop unmatched alerts, promote pending alerts that held long enough,
//!    and build the `ALERTS` / `ALERTS_FOR_STATE` output.
//!
//! A pass that fails in phase 1 or 2 leaves the active set untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_series::{LabelSet, Sample, Vector, ALERT_NAME, ALERT_STATE, METRIC_NAME};

use crate::error::{AlertError, Result};
use crate::query::{QueryFn, QueryFunc};
use crate::rule::AlertingRule;
use crate::template::{TemplateData, TemplateExpander};
use crate::types::{
    to_time_delta, Alert, AlertState, RuleHealth, ALERTS_FOR_STATE_METRIC, ALERTS_METRIC,
};

/// A query result after template expansion.
struct Candidate {
    labels: LabelSet,
    annotations: LabelSet,
    value: f64,
}

impl AlertingRule {
    /// Evaluates the rule at `ts`.
    ///
    /// Runs the expression through `query`, updates the active alerts and
    /// returns the `ALERTS` and `ALERTS_FOR_STATE` samples for every pending
    /// or firing alert, sorted by labels. `external_labels` overrides the
    /// configured external labels for this pass when given. A positive
    /// `limit` caps the number of alerts; zero or negative means unlimited.
    ///
    /// On success the rule health becomes [`RuleHealth::Ok`] and the
    /// evaluation timestamp and duration are recorded.
    ///
    /// # Errors
    ///
    /// - `AlertError::QueryExecution` if the expression fails
    /// - `AlertError::TemplateExpansion` if a template fails to render
    /// - `AlertError::Canceled` if `ctx` is cancelled before the commit
    /// - `AlertError::DuplicateLabelSet` if two results share alert labels
    /// - `AlertError::LimitExceeded` if the limit is exceeded
    ///
    /// The first three also mark the rule unhealthy. The active alerts are
    /// unchanged whenever an error is returned.
    pub fn eval(
        &self,
        ctx: &CancellationToken,
        ts: DateTime<Utc>,
        query: &QueryFn,
        external_labels: Option<&LabelSet>,
        limit: i64,
    ) -> Result<Vector> {
        let _entered = self.span.enter();
        let started = Instant::now();

        match self.eval_pass(ctx, ts, query, external_labels, limit) {
            Ok(vector) => {
                self.set_health(RuleHealth::Ok);
                self.set_last_error(None);
                self.set_evaluation_timestamp(ts);
                self.set_evaluation_duration(started.elapsed());
                Ok(vector)
            }
            Err(err) => {
                if err.degrades_health() {
                    self.set_health(RuleHealth::Err);
                    self.set_last_error(Some(err.to_string()));
                }
                warn!(rule = %self.name, error = %err, "alerting rule evaluation failed");
                Err(err)
            }
        }
    }

    fn eval_pass(
        &self,
        ctx: &CancellationToken,
        ts: DateTime<Utc>,
        query: &QueryFn,
        external_labels: Option<&LabelSet>,
        limit: i64,
    ) -> Result<Vector> {
        if ctx.is_cancelled() {
            return Err(AlertError::Canceled);
        }
        let results = query.query(ctx, &self.expr, ts)?;
        if ctx.is_cancelled() {
            return Err(AlertError::Canceled);
        }

        let candidates = self.expand(ctx, ts, query, &results, external_labels)?;

        if let Ok(max) = usize::try_from(limit) {
            if max > 0 && candidates.len() > max {
                return Err(AlertError::LimitExceeded {
                    limit,
                    count: candidates.len(),
                });
            }
        }

        let restored = self.restore_candidates(ctx, &candidates, ts);

        if ctx.is_cancelled() {
            return Err(AlertError::Canceled);
        }

        Ok(self.commit(candidates, &restored, ts))
    }

    /// Renders labels and annotations for every result, keyed by the
    /// fingerprint of the resulting alert labels.
    fn expand(
        &self,
        ctx: &CancellationToken,
        ts: DateTime<Utc>,
        query: &QueryFn,
        results: &[Sample],
        external_labels: Option<&LabelSet>,
    ) -> Result<HashMap<u64, Candidate>> {
        let expander = TemplateExpander::new(ctx, Arc::clone(query), ts);
        let template_name = format!("__alert_{}", self.name);
        let external_labels = external_labels.unwrap_or(&self.external_labels);

        let mut candidates = HashMap::with_capacity(results.len());
        for sample in results {
            let data = TemplateData {
                labels: &sample.labels,
                value: sample.value,
                external_labels,
                external_url: &self.external_url,
            };

            let mut labels = sample.labels.without(METRIC_NAME);
            for (name, template) in &self.labels {
                let value = expander.expand(&template_name, template, &data)?;
                labels.set(name.as_str(), value);
            }
            labels.set(ALERT_NAME, self.name.as_str());

            let mut annotations = LabelSet::new();
            for (name, template) in &self.annotations {
                let value = expander.expand(&template_name, template, &data)?;
                annotations.set(name.as_str(), value);
            }

            let fingerprint = labels.fingerprint();
            if candidates.contains_key(&fingerprint) {
                return Err(AlertError::DuplicateLabelSet);
            }
            candidates.insert(
                fingerprint,
                Candidate {
                    labels,
                    annotations,
                    value: sample.value,
                },
            );
        }

        Ok(candidates)
    }

    /// Looks up restored activation times for new alerts on the first pass.
    ///
    /// Stops at the first lookup after `ctx` is cancelled.
    fn restore_candidates(
        &self,
        ctx: &CancellationToken,
        candidates: &HashMap<u64, Candidate>,
        ts: DateTime<Utc>,
    ) -> HashMap<u64, DateTime<Utc>> {
        let mut restored = HashMap::new();
        if self.restored() {
            return restored;
        }
        let Some(querier) = self.querier.as_deref() else {
            return restored;
        };

        let known: HashSet<u64> = self
            .active
            .lock()
            .iter()
            .filter(|(_, alert)| alert.is_active())
            .map(|(fp, _)| *fp)
            .collect();

        for (fp, candidate) in candidates.iter().filter(|(fp, _)| !known.contains(fp)) {
            if ctx.is_cancelled() {
                debug!(rule = %self.name, "restoration canceled");
                return restored;
            }
            match self.restored_active_at(&candidate.labels, querier, ts) {
                Ok(Some(active_at)) => {
                    restored.insert(*fp, active_at);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        rule = %self.name,
                        labels = %candidate.labels,
                        error = %e,
                        "failed to restore alert state"
                    );
                }
            }
        }
        restored
    }

    /// Applies a checked pass to the active set.
    fn commit(
        &self,
        candidates: HashMap<u64, Candidate>,
        restored: &HashMap<u64, DateTime<Utc>>,
        ts: DateTime<Utc>,
    ) -> Vector {
        let hold = to_time_delta(self.hold_duration);
        let retention = to_time_delta(self.settings.resolved_retention());
        let mut active = self.active.lock();

        active.retain(|fp, alert| {
            if candidates.contains_key(fp) {
                return true;
            }
            match alert.state {
                AlertState::Pending => {
                    debug!(rule = %self.name, fingerprint = fp, "pending alert no longer matches");
                    false
                }
                AlertState::Firing => {
                    alert.resolve(ts);
                    info!(rule = %self.name, labels = %alert.labels, "alert resolved");
                    true
                }
                AlertState::Inactive => !alert
                    .resolved_at
                    .and_then(|resolved| resolved.checked_add_signed(retention))
                    .is_some_and(|expires| expires < ts),
            }
        });

        for (fp, candidate) in candidates {
            if let Some(alert) = active.get_mut(&fp).filter(|a| a.is_active()) {
                alert.value = candidate.value;
                alert.labels = candidate.labels;
                alert.annotations = candidate.annotations;
                continue;
            }

            let active_at = restored.get(&fp).copied().unwrap_or(ts);
            debug!(
                rule = %self.name,
                labels = %candidate.labels,
                active_at = %active_at,
                "new pending alert"
            );
            active.insert(
                fp,
                Alert::new_pending(
                    candidate.labels,
                    candidate.annotations,
                    candidate.value,
                    active_at,
                ),
            );
        }

        let mut vector = Vec::new();
        for alert in active.values_mut() {
            let held = ts.signed_duration_since(alert.active_at);
            if alert.state == AlertState::Pending && held >= hold {
                alert.fire(ts);
                info!(rule = %self.name, labels = %alert.labels, "alert firing");
            }
            if alert.is_active() {
                vector.push(alerts_sample(alert, ts));
                vector.push(for_state_sample(alert, ts));
            }
        }
        self.set_restored(true);
        drop(active);

        vector.sort_by(|a, b| a.labels.cmp(&b.labels));
        vector
    }
}

/// `ALERTS{..., alertstate}` = 1.
fn alerts_sample(alert: &Alert, ts: DateTime<Utc>) -> Sample {
    let labels = alert
        .labels
        .clone()
        .with(METRIC_NAME, ALERTS_METRIC)
        .with(ALERT_STATE, alert.state.as_str());
    Sample::new(labels, 1.0, ts.timestamp_millis())
}

/// `ALERTS_FOR_STATE{...}` = activation time in unix seconds.
#[allow(clippy::cast_precision_loss)]
fn for_state_sample(alert: &Alert, ts: DateTime<Utc>) -> Sample {
    let labels = alert.labels.clone().with(METRIC_NAME, ALERTS_FOR_STATE_METRIC);
    Sample::new(labels, alert.active_at.timestamp() as f64, ts.timestamp_millis())
}
