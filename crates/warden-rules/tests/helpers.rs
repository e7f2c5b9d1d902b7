//! Test helpers for alerting rule integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use warden_rules::{QueryError, QueryFn, QueryFunc};
use warden_series::{LabelMatcher, LabelSet, Sample, SeriesStore, Vector};

/// How far back an instant query looks for the latest point.
pub const LOOKBACK: Duration = Duration::from_secs(300);

/// Returns the instant `secs` seconds after the epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Builds a label set from pairs.
pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> LabelSet {
    LabelSet::from_pairs(pairs)
}

/// Appends one point per `(seconds, value)` to the series `labels`.
pub fn append_points(store: &SeriesStore, labels: &LabelSet, points: &[(i64, f64)]) {
    for (secs, value) in points {
        store
            .append(Sample::new(labels.clone(), *value, secs * 1000))
            .unwrap();
    }
}

type Filter = Box<dyn Fn(f64) -> bool + Send + Sync>;

struct Selector {
    matchers: Vec<LabelMatcher>,
    filter: Filter,
}

/// A query engine that understands a fixed set of expressions, each mapped
/// to a selector over a [`SeriesStore`] and a value filter.
pub struct FakeEngine {
    store: SeriesStore,
    exprs: HashMap<String, Selector>,
}

impl FakeEngine {
    pub fn new(store: SeriesStore) -> Self {
        Self {
            store,
            exprs: HashMap::new(),
        }
    }

    /// Registers `expr` as "series matching `matchers` whose value passes
    /// `filter`".
    pub fn expr(
        mut self,
        expr: &str,
        matchers: Vec<LabelMatcher>,
        filter: impl Fn(f64) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.exprs.insert(
            expr.to_string(),
            Selector {
                matchers,
                filter: Box::new(filter),
            },
        );
        self
    }

    pub fn into_query(self) -> QueryFn {
        Arc::new(self)
    }
}

impl QueryFunc for FakeEngine {
    fn query(
        &self,
        ctx: &CancellationToken,
        expr: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vector, QueryError> {
        if ctx.is_cancelled() {
            return Err(QueryError::Canceled);
        }
        let selector = self
            .exprs
            .get(expr)
            .ok_or_else(|| QueryError::Execution(format!("unknown expression {expr:?}")))?;

        Ok(self
            .store
            .instant(&selector.matchers, ts.timestamp_millis(), LOOKBACK)
            .into_iter()
            .filter(|sample| (selector.filter)(sample.value))
            .collect())
    }
}

/// Returns `(alertstate, labels without __name__ and alertstate)` for every
/// `ALERTS` sample.
pub fn alert_states(vector: &Vector) -> Vec<(String, LabelSet)> {
    vector
        .iter()
        .filter(|s| s.metric_name() == Some("ALERTS"))
        .map(|s| {
            let state = s.labels.get("alertstate").unwrap_or_default().to_string();
            (state, s.labels.without("__name__").without("alertstate"))
        })
        .collect()
}

/// Returns the value of every `ALERTS_FOR_STATE` sample.
pub fn for_state_values(vector: &Vector) -> Vec<f64> {
    vector
        .iter()
        .filter(|s| s.metric_name() == Some("ALERTS_FOR_STATE"))
        .map(|s| s.value)
        .collect()
}
