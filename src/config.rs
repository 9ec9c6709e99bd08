//! Run configuration, resolved once at startup and threaded explicitly.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

use crate::fetch::RetryPolicy;

/// Everything the backfill pipeline needs. Built once from flags,
/// environment variables, and defaults; nothing in the core reads ambient
/// state after this.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub token: String,
    pub station: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub output: PathBuf,
    /// Longest span the history endpoint serves in one request.
    pub max_span: Duration,
    pub retry: RetryPolicy,
    /// Abort on the first 401/403 instead of burning the rate limit on
    /// windows that will all fail the same way.
    pub abort_on_auth_failure: bool,
}
