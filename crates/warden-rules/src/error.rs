//! Error types for the warden-rules crate.

use thiserror::Error;
use warden_series::SeriesError;

/// Errors that can occur while evaluating an alerting rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    /// Invalid alerting rule configuration.
    #[error("invalid alerting rule: {reason}")]
    InvalidRule {
        /// The reason the rule is invalid.
        reason: String,
    },

    /// The rule expression could not be executed.
    #[error("query execution failed: {reason}")]
    QueryExecution {
        /// The error reported by the query function.
        reason: String,
    },

    /// A label or annotation template failed to render.
    #[error("error expanding template {name}: {reason}")]
    TemplateExpansion {
        /// The name of the template being expanded.
        name: String,
        /// The reason expansion failed.
        reason: String,
    },

    /// Two results of one evaluation map to the same alert labels.
    #[error("vector contains metrics with the same labelset after applying alert labels")]
    DuplicateLabelSet,

    /// More alerts are active than the evaluation limit allows.
    #[error("exceeded limit of {limit} with {count} alerts")]
    LimitExceeded {
        /// The configured limit.
        limit: i64,
        /// The number of alerts the evaluation produced.
        count: usize,
    },

    /// Looking up historical alert state failed.
    #[error("restoring alert state failed: {0}")]
    RestorationQuery(#[from] SeriesError),

    /// The evaluation was canceled through its context.
    #[error("evaluation canceled")]
    Canceled,
}

impl AlertError {
    /// Returns true if this error marks the rule unhealthy on its own.
    ///
    /// Duplicate and limit errors are reported to the caller, which decides
    /// how to record them.
    #[must_use]
    pub const fn degrades_health(&self) -> bool {
        matches!(
            self,
            Self::QueryExecution { .. } | Self::TemplateExpansion { .. } | Self::Canceled
        )
    }
}

/// Errors returned by a [`QueryFunc`](crate::QueryFunc).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query engine failed to execute the expression.
    #[error("{0}")]
    Execution(String),

    /// The query observed cancellation of its context.
    #[error("query canceled")]
    Canceled,
}

impl From<QueryError> for AlertError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Execution(reason) => Self::QueryExecution { reason },
            QueryError::Canceled => Self::Canceled,
        }
    }
}

/// Result type for alerting rule operations.
pub type Result<T> = std::result::Result<T, AlertError>;
