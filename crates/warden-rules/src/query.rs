//! The query capability a rule evaluates through.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use warden_series::Vector;

use crate::error::QueryError;

/// Executes an instant query at a timestamp.
///
/// Implementations must tolerate re-entrant calls: template expansion issues
/// nested queries through the same function while an evaluation is running.
/// Long-running implementations should observe `ctx` and return
/// [`QueryError::Canceled`] once it is cancelled.
pub trait QueryFunc: Send + Sync {
    /// Runs `expr` at `ts` and returns one sample per matching series.
    fn query(
        &self,
        ctx: &CancellationToken,
        expr: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vector, QueryError>;
}

impl<F> QueryFunc for F
where
    F: Fn(&CancellationToken, &str, DateTime<Utc>) -> Result<Vector, QueryError> + Send + Sync,
{
    fn query(
        &self,
        ctx: &CancellationToken,
        expr: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vector, QueryError> {
        self(ctx, expr, ts)
    }
}

/// A shared query function.
pub type QueryFn = Arc<dyn QueryFunc>;
