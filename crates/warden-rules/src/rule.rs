//! The alerting rule and its active-alert set.
//!
//! An [`AlertingRule`] owns the alerts produced by its expression, keyed by
//! the fingerprint of their labels. This module holds construction,
//! accessors and the read side of the active set; evaluation and state
//! restoration are implemented alongside it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::Span;
use warden_series::{validate_label_name, LabelSet, Querier};

use crate::config::{RestoreSettings, RuleSettings};
use crate::error::{AlertError, Result};
use crate::metadata::RuleMetadata;
use crate::types::{to_time_delta, Alert, AlertState, RuleHealth};

/// An alerting rule with its active alerts and evaluation metadata.
///
/// Evaluation is expected to run on a single caller at a time. Every other
/// method may be called concurrently with an evaluation and returns the
/// state of the last completed pass.
pub struct AlertingRule {
    pub(crate) name: String,
    pub(crate) expr: String,
    pub(crate) hold_duration: Duration,
    /// Label templates, keyed by label name.
    pub(crate) labels: BTreeMap<String, String>,
    /// Annotation templates, keyed by annotation name.
    pub(crate) annotations: BTreeMap<String, String>,
    pub(crate) external_labels: LabelSet,
    pub(crate) external_url: String,
    pub(crate) settings: RuleSettings,
    pub(crate) restore_settings: RestoreSettings,
    /// Source of `ALERTS_FOR_STATE` history for restoration.
    pub(crate) querier: Option<Arc<dyn Querier>>,
    /// Set once restoration has run (or was never wanted).
    pub(crate) restored: AtomicBool,
    /// Fingerprint -> alert. Held only for snapshots and commits.
    pub(crate) active: Mutex<HashMap<u64, Alert>>,
    pub(crate) metadata: RuleMetadata,
    pub(crate) span: Span,
}

impl AlertingRule {
    /// Maximum allowed length for rule names.
    pub const MAX_NAME_LENGTH: usize = 256;

    /// Creates a new alerting rule builder.
    pub fn builder(name: impl Into<String>, expr: impl Into<String>) -> AlertingRuleBuilder {
        AlertingRuleBuilder::new(name, expr)
    }

    /// Returns the rule name, used as the `alertname` label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the query expression.
    #[must_use]
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Returns how long an alert must be pending before it fires.
    #[must_use]
    pub const fn hold_duration(&self) -> Duration {
        self.hold_duration
    }

    /// Returns the label templates.
    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Returns the annotation templates.
    #[must_use]
    pub const fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// Returns the configured external labels.
    #[must_use]
    pub const fn external_labels(&self) -> &LabelSet {
        &self.external_labels
    }

    /// Returns the configured external URL, empty if unset.
    #[must_use]
    pub fn external_url(&self) -> &str {
        &self.external_url
    }

    /// Returns the rule settings.
    #[must_use]
    pub const fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    /// Returns the restore settings.
    #[must_use]
    pub const fn restore_settings(&self) -> &RestoreSettings {
        &self.restore_settings
    }

    /// Returns true once alert state has been restored.
    pub fn restored(&self) -> bool {
        self.restored.load(Ordering::Acquire)
    }

    /// Marks restoration as done (or pending again).
    pub fn set_restored(&self, restored: bool) {
        self.restored.store(restored, Ordering::Release);
    }

    // ============ Metadata ============

    /// Returns the health of the rule as of its last evaluation.
    pub fn health(&self) -> RuleHealth {
        self.metadata.health()
    }

    /// Sets the health of the rule.
    pub fn set_health(&self, health: RuleHealth) {
        self.metadata.set_health(health);
    }

    /// Returns the error of the last evaluation, if any.
    pub fn last_error(&self) -> Option<String> {
        self.metadata.last_error()
    }

    /// Sets or clears the last error.
    pub fn set_last_error(&self, error: Option<String>) {
        self.metadata.set_last_error(error);
    }

    /// Returns the timestamp of the last successful evaluation.
    pub fn evaluation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.metadata.evaluation_timestamp()
    }

    /// Sets the evaluation timestamp.
    pub fn set_evaluation_timestamp(&self, at: DateTime<Utc>) {
        self.metadata.set_evaluation_timestamp(at);
    }

    /// Returns how long the last successful evaluation took.
    pub fn evaluation_duration(&self) -> Duration {
        self.metadata.evaluation_duration()
    }

    /// Sets the evaluation duration.
    pub fn set_evaluation_duration(&self, duration: Duration) {
        self.metadata.set_evaluation_duration(duration);
    }

    // ============ Alerts ============

    /// Returns the most severe state among the rule's alerts.
    ///
    /// A rule without alerts is [`AlertState::Inactive`].
    pub fn state(&self) -> AlertState {
        self.active
            .lock()
            .values()
            .map(|alert| alert.state)
            .max()
            .unwrap_or_default()
    }

    /// Returns a snapshot of the pending and firing alerts.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.active
            .lock()
            .values()
            .filter(|alert| alert.is_active())
            .cloned()
            .collect()
    }

    /// Returns a snapshot of every tracked alert, including resolved alerts
    /// still inside the retention window.
    pub fn current_alerts(&self) -> Vec<Alert> {
        self.active.lock().values().cloned().collect()
    }

    /// Calls `f` for each pending or firing alert.
    ///
    /// The active set is locked while `f` runs, so `f` must not call back
    /// into this rule.
    pub fn for_each_active_alert<F>(&self, mut f: F)
    where
        F: FnMut(&Alert),
    {
        for alert in self.active.lock().values().filter(|a| a.is_active()) {
            f(alert);
        }
    }

    /// Returns the alerts that are due for delivery at `ts` and records the
    /// send on each of them.
    ///
    /// A sent alert stays valid downstream for four times the larger of
    /// `resend_delay` and `interval`.
    pub fn alerts_to_send(
        &self,
        ts: DateTime<Utc>,
        resend_delay: Duration,
        interval: Duration,
    ) -> Vec<Alert> {
        let validity = resend_delay
            .max(interval)
            .checked_mul(4)
            .unwrap_or(Duration::MAX);
        let valid_until = ts.checked_add_signed(to_time_delta(validity));

        let mut active = self.active.lock();
        active
            .values_mut()
            .filter(|alert| alert.needs_sending(ts, resend_delay))
            .map(|alert| {
                alert.last_sent_at = Some(ts);
                alert.valid_until = valid_until;
                alert.clone()
            })
            .collect()
    }

    /// Returns a serializable view of the rule.
    #[must_use]
    pub fn definition(&self) -> AlertingRuleDefinition {
        AlertingRuleDefinition {
            alert: self.name.clone(),
            expr: self.expr.clone(),
            hold_secs: self.hold_duration.as_secs(),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
        }
    }
}

impl std::fmt::Debug for AlertingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertingRule")
            .field("name", &self.name)
            .field("expr", &self.expr)
            .field("hold_duration", &self.hold_duration)
            .field("labels", &self.labels)
            .field("annotations", &self.annotations)
            .field("restored", &self.restored())
            .field("health", &self.health())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for AlertingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(&self.definition()).map_err(|_| std::fmt::Error)?;
        f.write_str(&json)
    }
}

/// The configuration of an alerting rule as it would appear in a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertingRuleDefinition {
    /// The rule name.
    pub alert: String,
    /// The query expression.
    pub expr: String,
    /// Hold duration (in seconds).
    #[serde(rename = "for", default, skip_serializing_if = "is_zero")]
    pub hold_secs: u64,
    /// Label templates.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotation templates.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde passes a reference
const fn is_zero(secs: &u64) -> bool {
    *secs == 0
}

/// Builder for creating [`AlertingRule`] instances.
pub struct AlertingRuleBuilder {
    name: String,
    expr: String,
    hold_duration: Duration,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    external_labels: LabelSet,
    external_url: String,
    settings: RuleSettings,
    restore_settings: RestoreSettings,
    querier: Option<Arc<dyn Querier>>,
    restored: bool,
}

impl AlertingRuleBuilder {
    /// Creates a new builder with required fields.
    fn new(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
            hold_duration: Duration::ZERO,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            external_labels: LabelSet::new(),
            external_url: String::new(),
            settings: RuleSettings::default(),
            restore_settings: RestoreSettings::default(),
            querier: None,
            restored: false,
        }
    }

    /// Sets how long an alert must be pending before it fires.
    #[must_use]
    pub const fn hold_duration(mut self, duration: Duration) -> Self {
        self.hold_duration = duration;
        self
    }

    /// Adds a label template.
    #[must_use]
    pub fn label(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.labels.insert(name.into(), template.into());
        self
    }

    /// Adds multiple label templates.
    #[must_use]
    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Adds an annotation template.
    #[must_use]
    pub fn annotation(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.annotations.insert(name.into(), template.into());
        self
    }

    /// Adds multiple annotation templates.
    #[must_use]
    pub fn annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations.extend(annotations);
        self
    }

    /// Sets the external labels visible to templates.
    #[must_use]
    pub fn external_labels(mut self, labels: LabelSet) -> Self {
        self.external_labels = labels;
        self
    }

    /// Sets the external URL visible to templates.
    #[must_use]
    pub fn external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = url.into();
        self
    }

    /// Sets the rule settings.
    #[must_use]
    pub fn settings(mut self, settings: RuleSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the restore settings.
    #[must_use]
    pub fn restore_settings(mut self, settings: RestoreSettings) -> Self {
        self.restore_settings = settings;
        self
    }

    /// Sets the store that `ALERTS_FOR_STATE` history is restored from.
    #[must_use]
    pub fn querier(mut self, querier: Arc<dyn Querier>) -> Self {
        self.querier = Some(querier);
        self
    }

    /// Marks the rule as already restored, skipping restoration.
    #[must_use]
    pub const fn restored(mut self, restored: bool) -> Self {
        self.restored = restored;
        self
    }

    /// Builds the [`AlertingRule`].
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if:
    /// - The name or expression is empty
    /// - The name exceeds the maximum length
    /// - A label or annotation name is not a valid label name
    pub fn build(self) -> Result<AlertingRule> {
        if self.name.is_empty() {
            return Err(AlertError::InvalidRule {
                reason: "rule name cannot be empty".to_string(),
            });
        }

        if self.name.len() > AlertingRule::MAX_NAME_LENGTH {
            return Err(AlertError::InvalidRule {
                reason: format!(
                    "rule name exceeds maximum length of {} characters",
                    AlertingRule::MAX_NAME_LENGTH
                ),
            });
        }

        if self.expr.trim().is_empty() {
            return Err(AlertError::InvalidRule {
                reason: format!("rule '{}' has an empty expression", self.name),
            });
        }

        for name in self.labels.keys().chain(self.annotations.keys()) {
            validate_label_name(name).map_err(|e| AlertError::InvalidRule {
                reason: e.to_string(),
            })?;
        }

        let span = tracing::info_span!("alerting_rule", rule = %self.name);

        Ok(AlertingRule {
            name: self.name,
            expr: self.expr,
            hold_duration: self.hold_duration,
            labels: self.labels,
            annotations: self.annotations,
            external_labels: self.external_labels,
            external_url: self.external_url,
            settings: self.settings,
            restore_settings: self.restore_settings,
            querier: self.querier,
            restored: AtomicBool::new(self.restored),
            active: Mutex::new(HashMap::new()),
            metadata: RuleMetadata::new(),
            span,
        })
    }
}

impl std::fmt::Debug for AlertingRuleBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertingRuleBuilder")
            .field("name", &self.name)
            .field("expr", &self.expr)
            .field("hold_duration", &self.hold_duration)
            .field("has_querier", &self.querier.is_some())
            .finish_non_exhaustive()
    }
}
