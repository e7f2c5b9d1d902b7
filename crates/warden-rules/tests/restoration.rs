//! Integration tests for restoring alert state after a restart.
//!
//! Each test runs a rule for a while, writes its output back to the store,
//! then builds a fresh rule against the same store, the way a restarted
//! process would.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use warden_rules::{Alert, AlertState, AlertingRule, QueryFn, RestoreSettings, RuleHealth};
use warden_series::{LabelMatcher, LabelSet, SeriesError, SeriesStore, Series, SelectHints};

use helpers::{append_points, alert_states, at, for_state_values, labels, FakeEngine};

const HOLD: Duration = Duration::from_secs(3600);

fn up_labels() -> LabelSet {
    labels([("__name__", "up"), ("instance", "a")])
}

fn query(store: &SeriesStore) -> QueryFn {
    FakeEngine::new(store.clone())
        .expr("up == 0", vec![LabelMatcher::equal("__name__", "up")], |v| v == 0.0)
        .into_query()
}

fn rule(store: Option<&SeriesStore>) -> AlertingRule {
    let builder = AlertingRule::builder("InstanceDown", "up == 0")
        .hold_duration(HOLD)
        .label("severity", "page");
    match store {
        Some(store) => builder.querier(Arc::new(store.clone())).build().unwrap(),
        None => builder.build().unwrap(),
    }
}

/// Runs a rule every `step` seconds from 0 to `until`, writing its output
/// back to the store.
fn run_before_restart(store: &SeriesStore, until: i64, step: usize) {
    let rule = rule(None);
    let query = query(store);
    let ctx = CancellationToken::new();
    for secs in (0..=until).step_by(step) {
        append_points(store, &up_labels(), &[(secs, 0.0)]);
        let out = rule.eval(&ctx, at(secs), &query, None, 0).unwrap();
        store.append_vector(out).unwrap();
    }
}

/// Evaluates a fresh rule once at `secs` and returns the restored activation
/// time in seconds.
fn restart_at(store: &SeriesStore, secs: i64) -> (AlertingRule, f64) {
    append_points(store, &up_labels(), &[(secs, 0.0)]);
    let rule = rule(Some(store));
    let out = rule
        .eval(&CancellationToken::new(), at(secs), &query(store), None, 0)
        .unwrap();
    assert!(rule.restored());
    let values = for_state_values(&out);
    assert_eq!(values.len(), 1);
    (rule, values[0])
}

// ============================================================================
// State series lookup
// ============================================================================

#[test]
fn test_query_for_state_series() {
    let rule = rule(None);
    let alert = Alert::new_pending(
        labels([("alertname", "InstanceDown"), ("instance", "a"), ("severity", "page")]),
        LabelSet::new(),
        0.0,
        at(0),
    );

    let empty = |_: &SelectHints, _: &[LabelMatcher]| -> warden_series::Result<Vec<Series>> {
        Ok(Vec::new())
    };
    assert_eq!(rule.query_for_state_series(&alert, &empty).unwrap(), None);

    let failing = |_: &SelectHints, _: &[LabelMatcher]| -> warden_series::Result<Vec<Series>> {
        Err(SeriesError::Storage {
            reason: "unavailable".to_string(),
        })
    };
    assert!(rule.query_for_state_series(&alert, &failing).is_err());

    let store = SeriesStore::new();
    run_before_restart(&store, 0, 60);
    let series = rule
        .query_for_state_series(&alert, &store)
        .unwrap()
        .expect("state series written by the first pass");
    assert_eq!(series.labels.get("__name__"), Some("ALERTS_FOR_STATE"));
    assert_eq!(series.last().map(|p| p.value), Some(0.0));
}

// ============================================================================
// Restart
// ============================================================================

#[test]
fn test_restart_shifts_activation_by_downtime() {
    let store = SeriesStore::new();
    // Pending for 10 minutes, then down for 1000 seconds.
    run_before_restart(&store, 600, 60);
    let (rule, active_at) = restart_at(&store, 1600);
    assert_eq!(active_at, 1000.0);
    assert_eq!(rule.state(), AlertState::Pending);
}

#[test]
fn test_restart_close_to_firing_waits_grace_period() {
    let store = SeriesStore::new();
    // Pending for 55 minutes: 5 left, less than the 10 minute grace period.
    run_before_restart(&store, 3300, 300);
    let (rule, active_at) = restart_at(&store, 5000);
    assert_eq!(active_at, (5000 - 3600 + 600) as f64);

    let query = query(&store);
    let ctx = CancellationToken::new();
    append_points(&store, &up_labels(), &[(5599, 0.0), (5600, 0.0)]);
    rule.eval(&ctx, at(5599), &query, None, 0).unwrap();
    assert_eq!(rule.state(), AlertState::Pending);
    rule.eval(&ctx, at(5600), &query, None, 0).unwrap();
    assert_eq!(rule.state(), AlertState::Firing);
}

#[test]
fn test_restart_after_long_outage_starts_over() {
    let store = SeriesStore::new();
    run_before_restart(&store, 600, 60);
    // One hour of tolerance plus one hour of hold, and one second more.
    let restart = 600 + 7200 + 1;
    let (_, active_at) = restart_at(&store, restart);
    assert_eq!(active_at, restart as f64);
}

#[test]
fn test_short_hold_rules_are_not_restored() {
    let store = SeriesStore::new();
    run_before_restart(&store, 600, 60);

    append_points(&store, &up_labels(), &[(1600, 0.0)]);
    let rule = AlertingRule::builder("InstanceDown", "up == 0")
        .hold_duration(HOLD)
        .label("severity", "page")
        .restore_settings(RestoreSettings {
            for_grace_period_secs: 7200,
            ..RestoreSettings::default()
        })
        .querier(Arc::new(store.clone()))
        .build()
        .unwrap();
    let out = rule
        .eval(&CancellationToken::new(), at(1600), &query(&store), None, 0)
        .unwrap();
    assert_eq!(for_state_values(&out), vec![1600.0]);
}

#[test]
fn test_restore_only_on_first_pass() {
    let store = SeriesStore::new();
    run_before_restart(&store, 600, 60);
    let (rule, _) = restart_at(&store, 1600);

    // A new label set appearing later starts from its own evaluation time.
    append_points(
        &store,
        &labels([("__name__", "up"), ("instance", "b")]),
        &[(1660, 0.0)],
    );
    append_points(&store, &up_labels(), &[(1660, 0.0)]);
    let out = rule
        .eval(&CancellationToken::new(), at(1660), &query(&store), None, 0)
        .unwrap();
    assert_eq!(for_state_values(&out), vec![1000.0, 1660.0]);
    assert_eq!(alert_states(&out).len(), 2);
}

#[test]
fn test_explicit_restore_for_state() {
    let store = SeriesStore::new();
    run_before_restart(&store, 600, 60);

    append_points(&store, &up_labels(), &[(1600, 0.0)]);
    let rule = AlertingRule::builder("InstanceDown", "up == 0")
        .hold_duration(HOLD)
        .label("severity", "page")
        .querier(Arc::new(store.clone()))
        .restored(true)
        .build()
        .unwrap();
    let ctx = CancellationToken::new();
    rule.eval(&ctx, at(1600), &query(&store), None, 0).unwrap();
    assert_eq!(rule.active_alerts()[0].active_at, at(1600));

    assert_eq!(rule.restore_for_state(&ctx, at(1600)), 1);
    assert_eq!(rule.active_alerts()[0].active_at, at(1000));
}

#[test]
fn test_failing_querier_does_not_fail_evaluation() {
    let store = SeriesStore::new();
    append_points(&store, &up_labels(), &[(1600, 0.0)]);
    let unavailable = |_: &SelectHints, _: &[LabelMatcher]| -> warden_series::Result<Vec<Series>> {
        Err(SeriesError::Storage {
            reason: "unavailable".to_string(),
        })
    };
    let rule = AlertingRule::builder("InstanceDown", "up == 0")
        .hold_duration(HOLD)
        .label("severity", "page")
        .querier(Arc::new(unavailable))
        .build()
        .unwrap();

    let out = rule
        .eval(&CancellationToken::new(), at(1600), &query(&store), None, 0)
        .unwrap();
    assert_eq!(for_state_values(&out), vec![1600.0]);
    assert!(rule.restored());
    assert_eq!(rule.health(), RuleHealth::Ok);
    assert_eq!(rule.last_error(), None);
    assert_eq!(rule.state(), AlertState::Pending);
}

#[test]
fn test_out_of_range_activation_starts_over() {
    let store = SeriesStore::new();
    run_before_restart(&store, 600, 60);
    // Corrupt the last activation time so shifting it overflows.
    let state_labels = labels([
        ("__name__", "ALERTS_FOR_STATE"),
        ("alertname", "InstanceDown"),
        ("instance", "a"),
        ("severity", "page"),
    ]);
    #[allow(clippy::cast_precision_loss)]
    let far_future = (chrono::DateTime::<chrono::Utc>::MAX_UTC.timestamp() - 10) as f64;
    append_points(&store, &state_labels, &[(600, far_future)]);

    let (rule, active_at) = restart_at(&store, 1600);
    assert_eq!(active_at, 1600.0);
    assert_eq!(rule.health(), RuleHealth::Ok);
}
