//! Label sets, samples and series storage for the Warden rule engine.
//!
//! `warden-series` holds the time-series vocabulary shared by the rule
//! evaluator and the stores it reads from:
//!
//! - **Label sets**: sorted, deduplicated label pairs with a stable
//!   fingerprint used as the key of alert state
//! - **Samples and vectors**: the result shape of an instant query
//! - **Series and matchers**: what a [`Querier`] returns for a selector
//! - **In-memory storage**: [`SeriesStore`], a [`Querier`] that also accepts
//!   appended samples
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use warden_series::{LabelMatcher, LabelSet, Querier, Sample, SelectHints, SeriesStore};
//!
//! let store = SeriesStore::new();
//! let labels = LabelSet::from_pairs([("__name__", "up"), ("job", "api")]);
//! store.append(Sample::new(labels.clone(), 1.0, 1_000)).unwrap();
//!
//! let series = store
//!     .select(&SelectHints::unbounded(), &[LabelMatcher::equal("job", "api")])
//!     .unwrap();
//! assert_eq!(series.len(), 1);
//!
//! let vector = store.instant(&[], 2_000, Duration::from_secs(300));
//! assert_eq!(vector[0].labels.fingerprint(), labels.fingerprint());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod labels;
pub mod matcher;
pub mod storage;
pub mod types;

// Re-export main types at crate root
pub use error::{Result, SeriesError};
pub use labels::{validate_label_name, LabelSet, ALERT_NAME, ALERT_STATE, METRIC_NAME};
pub use matcher::{matches_all, LabelMatcher, MatchType};
pub use storage::{Querier, SeriesStore};
pub use types::{Point, Sample, SelectHints, Series, Vector};
