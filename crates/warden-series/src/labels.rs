//! Label sets and their fingerprints.
//!
//! A [`LabelSet`] is the identity of a time series: a set of unique
//! `(name, value)` pairs kept sorted by name. Two label sets are equal when
//! their pairs are equal, regardless of the order they were added in, and
//! they hash to the same [`LabelSet::fingerprint`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Result, SeriesError};

/// Label carrying the metric name of a series.
pub const METRIC_NAME: &str = "__name__";

/// Label carrying the name of the alerting rule that produced an alert.
pub const ALERT_NAME: &str = "alertname";

/// Label carrying the state of an alert on the `ALERTS` series.
pub const ALERT_STATE: &str = "alertstate";

/// Byte separating names and values in the fingerprint input. It cannot
/// appear in valid UTF-8, so `{a="bc"}` and `{ab="c"}` never collide.
const SEP: u8 = 0xff;

/// An ordered set of unique label pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Creates an empty label set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a label set from `(name, value)` pairs.
    ///
    /// Later pairs win over earlier pairs with the same name, and pairs with
    /// an empty value are skipped.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.set(name, value);
        }
        set
    }

    /// Returns the value of a label, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns true if the label is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Sets a label. An empty value removes the label instead.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if value.is_empty() {
            self.0.remove(&name);
        } else {
            self.0.insert(name, value);
        }
    }

    /// Removes a label, returning its value if it was present.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    /// Returns a copy of this set without the given label.
    #[must_use]
    pub fn without(&self, name: &str) -> Self {
        let mut set = self.clone();
        set.0.remove(name);
        set
    }

    /// Returns a copy of this set with the given label set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns the number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set has no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Computes the stable 64-bit fingerprint of this set.
    ///
    /// The hash covers every name and value in sorted order, so it is
    /// independent of insertion order and identical across processes.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let size: usize = self.0.iter().map(|(k, v)| k.len() + v.len() + 2).sum();
        let mut buf = Vec::with_capacity(size);
        for (name, value) in &self.0 {
            buf.extend_from_slice(name.as_bytes());
            buf.push(SEP);
            buf.extend_from_slice(value.as_bytes());
            buf.push(SEP);
        }
        xxh3_64(&buf)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value:?}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::from_pairs(map)
    }
}

/// Validates a label name.
///
/// Label names must:
/// - Be non-empty
/// - Contain only ASCII alphanumeric characters and underscores
/// - Not start with a digit
pub fn validate_label_name(name: &str) -> Result<()> {
    let Some(first) = name.chars().next() else {
        return Err(SeriesError::InvalidLabelName {
            reason: "label name cannot be empty".to_string(),
        });
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(SeriesError::InvalidLabelName {
            reason: format!("label name '{name}' must start with a letter or underscore"),
        });
    }

    if let Some(c) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(SeriesError::InvalidLabelName {
            reason: format!("invalid character '{c}' in label name '{name}'"),
        });
    }

    Ok(())
}
