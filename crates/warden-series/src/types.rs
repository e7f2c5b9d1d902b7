//! Core sample and series types.
//!
//! - [`Sample`]: one value of one series at one instant
//! - [`Vector`]: the result of an instant query
//! - [`Point`]: a timestamped value inside a [`Series`]
//! - [`Series`]: a label set with its ordered points
//! - [`SelectHints`]: the time window a select is expected to cover

use serde::{Deserialize, Serialize};

use crate::labels::{LabelSet, METRIC_NAME};

/// A single value of a series at an evaluation instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// The series labels, including `__name__` when the series has one.
    pub labels: LabelSet,
    /// The sampled value.
    pub value: f64,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

impl Sample {
    /// Creates a new sample.
    #[must_use]
    pub const fn new(labels: LabelSet, value: f64, timestamp: i64) -> Self {
        Self {
            labels,
            value,
            timestamp,
        }
    }

    /// Returns the metric name, if the sample carries one.
    #[must_use]
    pub fn metric_name(&self) -> Option<&str> {
        self.labels.get(METRIC_NAME)
    }
}

/// The result of an instant query: one sample per matching series.
pub type Vector = Vec<Sample>;

/// A timestamped value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    /// The value.
    pub value: f64,
}

impl Point {
    /// Creates a new point.
    #[must_use]
    pub const fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A series with its points in timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// The identifying labels.
    pub labels: LabelSet,
    /// Points in ascending timestamp order.
    pub points: Vec<Point>,
}

impl Series {
    /// Creates a series from labels and points, sorting the points.
    #[must_use]
    pub fn new(labels: LabelSet, mut points: Vec<Point>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self { labels, points }
    }

    /// Returns the most recent point.
    #[must_use]
    pub fn last(&self) -> Option<Point> {
        self.points.last().copied()
    }
}

/// Time window hints passed to a select.
///
/// Both bounds are inclusive Unix timestamps in milliseconds. Stores may use
/// them to bound the work a select does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectHints {
    /// Start timestamp (inclusive), in milliseconds.
    pub start: i64,
    /// End timestamp (inclusive), in milliseconds.
    pub end: i64,
}

impl SelectHints {
    /// Creates hints covering `[start, end]`.
    #[must_use]
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Hints covering every timestamp.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    /// Checks if a timestamp falls within the hinted window.
    #[must_use]
    pub const fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}
