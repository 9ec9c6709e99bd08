//! The sequential fetch → decode → convert → emit loop over the window
//! sequence. Window-scoped failures degrade that window to zero rows; only
//! sink failures (and, under the default policy, credential rejections)
//! stop the run.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use indicatif::ProgressBar;
use tracing::{error, info, warn};

use crate::config::BackfillConfig;
use crate::emit::{ArchiveRow, RowEmitter};
use crate::fetch::{FetchError, Fetcher, ObservationSource};
use crate::reading;
use crate::window::{self, Window};

/// Terminal state of one window, carrying everything the run tally needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowOutcome {
    Written { rows: usize, skipped: usize },
    Empty { skipped: usize },
    FetchFailed,
    Rejected,
    AuthRejected,
    DecodeFailed,
}

/// Per-run tally, folded over the window sequence. The process exit status
/// comes from this data rather than from whatever was logged.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub windows: usize,
    pub rows: usize,
    pub empty_windows: usize,
    pub fetch_failed: usize,
    pub rejected: usize,
    pub decode_failed: usize,
    pub records_skipped: usize,
    pub interrupted: bool,
    pub aborted_on_auth: bool,
}

impl RunSummary {
    fn record(&mut self, outcome: WindowOutcome) {
        match outcome {
            WindowOutcome::Written { rows, skipped } => {
                self.rows += rows;
                self.records_skipped += skipped;
            }
            WindowOutcome::Empty { skipped } => {
                self.empty_windows += 1;
                self.records_skipped += skipped;
            }
            WindowOutcome::FetchFailed => self.fetch_failed += 1,
            WindowOutcome::Rejected | WindowOutcome::AuthRejected => self.rejected += 1,
            WindowOutcome::DecodeFailed => self.decode_failed += 1,
        }
    }

    /// True when every processed window contributed its rows cleanly. An
    /// interrupted run can still be clean; a degraded one cannot.
    pub fn clean(&self) -> bool {
        self.fetch_failed == 0
            && self.rejected == 0
            && self.decode_failed == 0
            && self.records_skipped == 0
            && !self.aborted_on_auth
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows from {} windows ({} empty, {} fetch failures, {} rejected, \
             {} undecodable, {} records skipped)",
            self.rows,
            self.windows,
            self.empty_windows,
            self.fetch_failed,
            self.rejected,
            self.decode_failed,
            self.records_skipped
        )?;
        if self.interrupted {
            write!(f, " [interrupted]")?;
        }
        if self.aborted_on_auth {
            write!(f, " [aborted: authentication rejected]")?;
        }
        Ok(())
    }
}

/// Runs the backfill over every window of the configured range, strictly in
/// chronological order, one window fully to completion before the next.
/// Cancellation is honored at window boundaries only, so the in-flight
/// window always finishes its write cleanly.
pub async fn run<S: ObservationSource>(
    config: &BackfillConfig,
    fetcher: &Fetcher<S>,
    emitter: &mut RowEmitter,
    cancel: &AtomicBool,
    progress: &ProgressBar,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    for window in window::windows(config.start, config.end, config.max_span) {
        if cancel.load(Ordering::SeqCst) {
            warn!("interrupt received, stopping before window {window}");
            summary.interrupted = true;
            break;
        }

        summary.windows += 1;
        let outcome = process_window(fetcher, emitter, &window).await?;
        summary.record(outcome);
        progress.inc(1);

        if outcome == WindowOutcome::AuthRejected && config.abort_on_auth_failure {
            error!("provider rejected the credentials, aborting the run");
            summary.aborted_on_auth = true;
            break;
        }
    }

    Ok(summary)
}

/// Takes one window through fetch, decode, convert, and write. Fetch and
/// decode failures are window-scoped and reported, like everything else
/// the tally needs, through the returned outcome; only sink errors
/// propagate.
async fn process_window<S: ObservationSource>(
    fetcher: &Fetcher<S>,
    emitter: &mut RowEmitter,
    window: &Window,
) -> Result<WindowOutcome> {
    let payload = match fetcher.fetch_window(window).await {
        Ok(payload) => payload,
        Err(e @ FetchError::Rejected { .. }) => {
            error!(window = %window, "window rejected: {e}");
            return Ok(if e.is_auth() {
                WindowOutcome::AuthRejected
            } else {
                WindowOutcome::Rejected
            });
        }
        Err(e) => {
            warn!(window = %window, "giving up on window: {e}");
            return Ok(WindowOutcome::FetchFailed);
        }
    };

    let (readings, skipped) = match reading::decode_payload(&payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(window = %window, "discarding window payload: {e}");
            return Ok(WindowOutcome::DecodeFailed);
        }
    };

    if readings.is_empty() {
        info!(window = %window, "no observations in window");
        return Ok(WindowOutcome::Empty { skipped });
    }

    for reading in &readings {
        emitter.append(&ArchiveRow::from(reading))?;
    }
    emitter.flush()?;

    info!(window = %window, rows = readings.len(), "window written");
    Ok(WindowOutcome::Written {
        rows: readings.len(),
        skipped,
    })
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RetryPolicy;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    /// Plays back one scripted response per window, in order.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Value, FetchError>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Value, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl ObservationSource for ScriptedSource {
        async fn request(&self, _window: &Window) -> Result<Value, FetchError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted source ran out of responses")
        }
    }

    fn obs(epoch: i64, temp_c: f64, wind_mps: f64) -> Value {
        json!([
            epoch, 0.0, 0.0, wind_mps, wind_mps, 180, 1000.0, 1000.0, temp_c,
            50, 0, 0.0, 0, 0.0, 0.0, 0, 0, null, 0, 0.0, 0, 0
        ])
    }

    fn config(days: i64, output: &Path) -> BackfillConfig {
        BackfillConfig {
            token: "token".to_string(),
            station: "12345".to_string(),
            start: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2023, 1, 1 + days as u32, 0, 0, 0).unwrap(),
            output: output.to_path_buf(),
            max_span: Duration::hours(24),
            retry: RetryPolicy::immediate(3),
            abort_on_auth_failure: true,
        }
    }

    async fn run_scripted(
        config: &BackfillConfig,
        responses: Vec<Result<Value, FetchError>>,
    ) -> RunSummary {
        let fetcher = Fetcher::new(ScriptedSource::new(responses), config.retry);
        let mut emitter = RowEmitter::create(&config.output).unwrap();
        let cancel = AtomicBool::new(false);

        run(config, &fetcher, &mut emitter, &cancel, &ProgressBar::hidden())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn should_emit_converted_rows_in_chronological_order() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wx.csv");
        let config = config(2, &output);

        // One observation per window: 0 C and 10 m/s.
        let summary = run_scripted(
            &config,
            vec![
                Ok(json!({ "obs": [obs(1672531200, 0.0, 10.0)] })),
                Ok(json!({ "obs": [obs(1672617600, 0.0, 10.0)] })),
            ],
        )
        .await;

        assert_eq!(summary.windows, 2);
        assert_eq!(summary.rows, 2);
        assert!(summary.clean());

        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let mut previous = i64::MIN;
        for line in &lines[1..] {
            let cells: Vec<&str> = line.split(',').collect();
            let date_time: i64 = cells[0].parse().unwrap();
            assert!(date_time > previous);
            previous = date_time;

            let out_temp: f64 = cells[1].parse().unwrap();
            let wind_speed: f64 = cells[2].parse().unwrap();
            assert_eq!(out_temp, 32.0);
            assert!((wind_speed - 22.3694).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn should_continue_past_failed_window() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wx.csv");
        let config = config(3, &output);

        let summary = run_scripted(
            &config,
            vec![
                Ok(json!({ "obs": [obs(1672531200, 5.0, 1.0)] })),
                // All three attempts fail: the window degrades to zero rows.
                Err(FetchError::Transient("timeout".to_string())),
                Err(FetchError::Transient("timeout".to_string())),
                Err(FetchError::Transient("timeout".to_string())),
                Ok(json!({ "obs": [obs(1672704000, 5.0, 1.0)] })),
            ],
        )
        .await;

        assert_eq!(summary.windows, 3);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.fetch_failed, 1);
        assert!(!summary.clean());

        let content = std::fs::read_to_string(&output).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn should_not_count_empty_window_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wx.csv");
        let config = config(1, &output);

        let summary = run_scripted(&config, vec![Ok(json!({ "obs": [] }))]).await;

        assert_eq!(summary.empty_windows, 1);
        assert_eq!(summary.rows, 0);
        assert!(summary.clean());
    }

    #[tokio::test]
    async fn should_abort_on_auth_rejection_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wx.csv");
        let config = config(3, &output);

        let summary = run_scripted(
            &config,
            vec![Err(FetchError::Rejected {
                status: StatusCode::UNAUTHORIZED,
            })],
        )
        .await;

        assert!(summary.aborted_on_auth);
        assert_eq!(summary.windows, 1);
        assert_eq!(summary.rejected, 1);
        assert!(!summary.clean());
    }

    #[tokio::test]
    async fn should_continue_past_rejection_when_policy_allows() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wx.csv");
        let mut config = config(2, &output);
        config.abort_on_auth_failure = false;

        let summary = run_scripted(
            &config,
            vec![
                Err(FetchError::Rejected {
                    status: StatusCode::UNAUTHORIZED,
                }),
                Ok(json!({ "obs": [obs(1672617600, 0.0, 0.0)] })),
            ],
        )
        .await;

        assert!(!summary.aborted_on_auth);
        assert_eq!(summary.windows, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.rows, 1);
    }

    #[tokio::test]
    async fn should_skip_window_with_malformed_payload() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wx.csv");
        let config = config(2, &output);

        let summary = run_scripted(
            &config,
            vec![
                Ok(json!({ "unexpected": true })),
                Ok(json!({ "obs": [obs(1672617600, 0.0, 0.0)] })),
            ],
        )
        .await;

        assert_eq!(summary.decode_failed, 1);
        assert_eq!(summary.rows, 1);
        assert!(!summary.clean());
    }

    #[tokio::test]
    async fn should_count_skipped_records() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wx.csv");
        let config = config(1, &output);

        let summary = run_scripted(
            &config,
            vec![Ok(json!({
                "obs": [obs(1, 0.0, 0.0), "bogus", obs(2, 0.0, 0.0)]
            }))],
        )
        .await;

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.records_skipped, 1);
        assert!(!summary.clean());
    }

    #[tokio::test]
    async fn should_count_skipped_records_when_window_ends_up_empty() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wx.csv");
        let config = config(1, &output);

        // Every record is malformed, so the window writes nothing but the
        // skips still show up in the tally.
        let summary = run_scripted(
            &config,
            vec![Ok(json!({ "obs": ["bogus", [1, 2]] }))],
        )
        .await;

        assert_eq!(summary.rows, 0);
        assert_eq!(summary.empty_windows, 1);
        assert_eq!(summary.records_skipped, 2);
        assert!(!summary.clean());
    }

    #[tokio::test]
    async fn should_stop_at_window_boundary_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wx.csv");
        let config = config(3, &output);

        let fetcher = Fetcher::new(
            ScriptedSource::new(vec![Ok(json!({ "obs": [obs(1672531200, 0.0, 0.0)] }))]),
            config.retry,
        );
        let mut emitter = RowEmitter::create(&config.output).unwrap();
        let cancel = AtomicBool::new(true);

        let summary = run(
            &config,
            &fetcher,
            &mut emitter,
            &cancel,
            &ProgressBar::hidden(),
        )
        .await
        .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.windows, 0);
        assert_eq!(summary.rows, 0);
    }
}
