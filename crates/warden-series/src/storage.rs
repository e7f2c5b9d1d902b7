//! Series selection and in-memory series storage.
//!
//! The [`Querier`] trait is the single entry point the rule engine uses to
//! read historical series. [`SeriesStore`] is a thread-safe in-memory
//! implementation of it that also accepts appended samples, so evaluation
//! output can be written back and read again.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, SeriesError};
use crate::labels::LabelSet;
use crate::matcher::{matches_all, LabelMatcher};
use crate::types::{Point, Sample, SelectHints, Series, Vector};

/// Reads series matching a set of label matchers.
///
/// A select returns either no series, an error, or one or more series whose
/// points fall inside the hinted window.
pub trait Querier: Send + Sync {
    /// Selects every series matching all `matchers`.
    fn select(&self, hints: &SelectHints, matchers: &[LabelMatcher]) -> Result<Vec<Series>>;
}

impl<F> Querier for F
where
    F: Fn(&SelectHints, &[LabelMatcher]) -> Result<Vec<Series>> + Send + Sync,
{
    fn select(&self, hints: &SelectHints, matchers: &[LabelMatcher]) -> Result<Vec<Series>> {
        self(hints, matchers)
    }
}

/// Thread-safe in-memory series storage.
///
/// Series are keyed by their full label set. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    /// Points per series, in timestamp order.
    data: Arc<RwLock<BTreeMap<LabelSet, Vec<Point>>>>,
}

impl SeriesStore {
    /// Creates an empty store that keeps every point.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample to its series.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Storage` if the sample has no labels.
    pub fn append(&self, sample: Sample) -> Result<()> {
        self.append_vector(vec![sample])
    }

    /// Appends every sample of a vector in one batch.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Storage` if any sample has no labels; nothing is
    /// appended in that case.
    #[allow(clippy::significant_drop_tightening)] // Lock needed for batch atomic operation
    pub fn append_vector(&self, vector: Vector) -> Result<()> {
        if vector.iter().any(|s| s.labels.is_empty()) {
            return Err(SeriesError::Storage {
                reason: "cannot append a sample without labels".to_string(),
            });
        }

        let mut data = self.data.write();
        let appended = vector.len();

        for sample in vector {
            let points = data.entry(sample.labels).or_default();

            // Insert new point maintaining timestamp order, replacing a point
            // at the same timestamp.
            match points.binary_search_by_key(&sample.timestamp, |p| p.timestamp) {
                Ok(pos) => points[pos].value = sample.value,
                Err(pos) => points.insert(pos, Point::new(sample.timestamp, sample.value)),
            }
        }

        debug!(
            samples = appended,
            series_count = data.len(),
            "appended samples"
        );

        Ok(())
    }

    /// Evaluates an instant selector: the latest point at or before
    /// `timestamp`, no older than `lookback`, for every matching series.
    ///
    /// The returned samples are stamped with `timestamp`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn instant(&self, matchers: &[LabelMatcher], timestamp: i64, lookback: Duration) -> Vector {
        let lookback = lookback.as_millis() as i64;
        let data = self.data.read();
        data.iter()
            .filter(|(labels, _)| matches_all(matchers, labels))
            .filter_map(|(labels, points)| {
                let end = points.partition_point(|p| p.timestamp <= timestamp);
                let point = points[..end].last()?;
                (timestamp - point.timestamp <= lookback)
                    .then(|| Sample::new(labels.clone(), point.value, timestamp))
            })
            .collect()
    }

    /// Returns the number of series.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.data.read().len()
    }

    /// Returns the number of points stored for a series.
    ///
    /// Returns 0 if the series doesn't exist.
    #[must_use]
    pub fn point_count(&self, labels: &LabelSet) -> usize {
        self.data.read().get(labels).map_or(0, Vec::len)
    }

    /// Clears all series from the store.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl Querier for SeriesStore {
    fn select(&self, hints: &SelectHints, matchers: &[LabelMatcher]) -> Result<Vec<Series>> {
        let data = self.data.read();
        let series = data
            .iter()
            .filter(|(labels, _)| matches_all(matchers, labels))
            .filter_map(|(labels, points)| {
                let points: Vec<Point> = points
                    .iter()
                    .filter(|p| hints.contains(p.timestamp))
                    .copied()
                    .collect();
                (!points.is_empty()).then(|| Series::new(labels.clone(), points))
            })
            .collect();
        Ok(series)
    }
}
