//! Splits the requested backfill range into provider-sized query windows.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// A half-open sub-interval `[start, end)` of the requested range, sized to
/// the provider's per-request query limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn start_ts(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_ts(&self) -> i64 {
        self.end.timestamp()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// Lazily produces contiguous, non-overlapping windows covering
/// `[start, end)` in chronological order. Each window is at most `max_span`
/// long; the final one is truncated to `end`. An empty or inverted range
/// yields no windows.
pub fn windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_span: Duration,
) -> impl Iterator<Item = Window> {
    assert!(max_span > Duration::zero(), "max_span must be positive");

    let mut cursor = start;

    std::iter::from_fn(move || {
        if cursor >= end {
            return None;
        }

        let window_end = std::cmp::min(cursor + max_span, end);
        let window = Window {
            start: cursor,
            end: window_end,
        };
        cursor = window_end;

        Some(window)
    })
}

// -- Tests -------------------------------------------------------------------
