//! Label and annotation template expansion.
//!
//! Templates use Jinja syntax. Each expansion sees:
//!
//! - `labels`: the labels of the matching series, including `__name__`
//! - `value`: the sample value
//! - `external_labels`: the process-wide external labels
//! - `external_url`: the process-wide external URL, empty if unset
//!
//! and a `query(expr)` function that runs a nested instant query at the
//! evaluation timestamp and returns a list of `{labels, value, timestamp}`.
//!
//! ```text
//! {% if value > 100 %}critical{% else %}warning{% endif %}
//! {{ labels.instance }} is down ({{ query("up")|length }} targets up)
//! ```

use chrono::{DateTime, Utc};
use minijinja::{Environment, Error, ErrorKind, Value};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use warden_series::LabelSet;

use crate::error::{AlertError, Result};
use crate::query::{QueryFn, QueryFunc};

/// The variables visible to a template.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateData<'a> {
    /// Labels of the matching series.
    pub labels: &'a LabelSet,
    /// Value of the matching sample.
    pub value: f64,
    /// Process-wide external labels.
    pub external_labels: &'a LabelSet,
    /// Process-wide external URL.
    pub external_url: &'a str,
}

/// Expands templates for one evaluation pass.
///
/// The expander holds the query function so templates can issue nested
/// queries at the evaluation timestamp. It is built once per pass and
/// dropped when the pass ends.
pub struct TemplateExpander {
    env: Environment<'static>,
    ctx: CancellationToken,
}

impl TemplateExpander {
    /// Creates an expander whose `query` function evaluates at `ts`.
    pub fn new(ctx: &CancellationToken, query: QueryFn, ts: DateTime<Utc>) -> Self {
        let mut env = Environment::new();
        let token = ctx.clone();
        env.add_function("query", move |expr: String| -> std::result::Result<Value, Error> {
            if token.is_cancelled() {
                return Err(Error::new(ErrorKind::InvalidOperation, "query canceled"));
            }
            query
                .query(&token, &expr, ts)
                .map(|vector| Value::from_serialize(&vector))
                .map_err(|e| {
                    Error::new(
                        ErrorKind::InvalidOperation,
                        format!("error executing query {expr:?}: {e}"),
                    )
                })
        });

        Self {
            env,
            ctx: ctx.clone(),
        }
    }

    /// Expands `text` against `data`.
    ///
    /// Text without template syntax is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Canceled` if the context is cancelled, and
    /// `AlertError::TemplateExpansion` if rendering fails.
    pub fn expand(&self, name: &str, text: &str, data: &TemplateData<'_>) -> Result<String> {
        if self.ctx.is_cancelled() {
            return Err(AlertError::Canceled);
        }
        if !is_template(text) {
            return Ok(text.to_string());
        }

        self.env.render_str(text, data).map_err(|e| {
            if self.ctx.is_cancelled() {
                AlertError::Canceled
            } else {
                AlertError::TemplateExpansion {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}

impl std::fmt::Debug for TemplateExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateExpander")
            .field("canceled", &self.ctx.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn is_template(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}
