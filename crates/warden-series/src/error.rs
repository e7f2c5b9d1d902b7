//! Error types for the warden-series crate.

use thiserror::Error;

/// Errors that can occur while building label sets or reading series.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    /// The label name is invalid (empty or contains invalid characters).
    #[error("invalid label name: {reason}")]
    InvalidLabelName {
        /// The reason the name is invalid.
        reason: String,
    },

    /// Storage operation failed.
    #[error("storage error: {reason}")]
    Storage {
        /// The reason the storage operation failed.
        reason: String,
    },
}

/// Result type for series operations.
pub type Result<T> = std::result::Result<T, SeriesError>;
