//! Alerting rule evaluation for the Warden monitoring platform.
//!
//! `warden-rules` turns a query expression into alerts. Each evaluation pass
//! runs the expression, tracks which label sets match it, and drives every
//! label set through its lifecycle:
//!
//! ```text
//! inactive -> pending -> firing -> resolved
//! ```
//!
//! # Features
//!
//! - **Hold duration**: alerts stay pending until they have matched long enough
//! - **Templates**: labels and annotations rendered per result, with nested queries
//! - **Synthetic series**: `ALERTS` and `ALERTS_FOR_STATE` samples for every active alert
//! - **Restoration**: activation times recovered from `ALERTS_FOR_STATE` history after a restart
//! - **Concurrent reads**: health, last error, timing and state readable while an evaluation runs
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use chrono::{DateTime, Utc};
//! use tokio_util::sync::CancellationToken;
//! use warden_rules::{AlertState, AlertingRule, QueryError, QueryFn};
//! use warden_series::{LabelSet, Sample, Vector};
//!
//! let rule = AlertingRule::builder("InstanceDown", "up == 0")
//!     .hold_duration(Duration::from_secs(60))
//!     .label("severity", "page")
//!     .annotation("summary", "{{ labels.instance }} is down")
//!     .build()
//!     .unwrap();
//!
//! let query: QueryFn = Arc::new(
//!     |_: &CancellationToken, _: &str, ts: DateTime<Utc>| -> Result<Vector, QueryError> {
//!         let labels = LabelSet::from_pairs([("__name__", "up"), ("instance", "db-1")]);
//!         Ok(vec![Sample::new(labels, 0.0, ts.timestamp_millis())])
//!     },
//! );
//!
//! let ctx = CancellationToken::new();
//! let start = DateTime::from_timestamp(0, 0).unwrap();
//! rule.eval(&ctx, start, &query, None, 0).unwrap();
//! assert_eq!(rule.state(), AlertState::Pending);
//!
//! let later = DateTime::from_timestamp(60, 0).unwrap();
//! let samples = rule.eval(&ctx, later, &query, None, 0).unwrap();
//! assert_eq!(rule.state(), AlertState::Firing);
//! assert_eq!(samples.len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
mod eval;
pub mod metadata;
pub mod query;
mod restore;
pub mod rule;
pub mod template;
pub mod types;

// Re-export main types at crate root
pub use config::{RestoreSettings, RuleSettings};
pub use error::{AlertError, QueryError, Result};
pub use metadata::RuleMetadata;
pub use query::{QueryFn, QueryFunc};
pub use rule::{AlertingRule, AlertingRuleBuilder, AlertingRuleDefinition};
pub use template::{TemplateData, TemplateExpander};
pub use types::{Alert, AlertState, RuleHealth, ALERTS_FOR_STATE_METRIC, ALERTS_METRIC};
