use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::info;

use crate::{
    cli::create_progress_bar,
    config::BackfillConfig,
    emit::RowEmitter,
    fetch::{Fetcher, RetryPolicy, TempestApi},
    pipeline::{self, RunSummary},
    window,
};

pub async fn backfill(
    token: String,
    station: String,
    start_date: &str,
    end_date: Option<&str>,
    output: PathBuf,
) -> Result<RunSummary> {
    let start = parse_day(start_date)?;
    let end = match end_date {
        Some(day) => parse_day(day)?,
        None => Utc::now(),
    };

    let config = BackfillConfig {
        token,
        station,
        start,
        end,
        output,
        max_span: Duration::hours(24),
        retry: RetryPolicy::default(),
        abort_on_auth_failure: true,
    };

    let api = TempestApi::new(&config.token, &config.station)?;
    let fetcher = Fetcher::new(api, config.retry);
    let mut emitter = RowEmitter::create(&config.output)?;

    // Ctrl-C stops the run at the next window boundary so the in-flight
    // window still lands complete and flushed.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let total = window::windows(config.start, config.end, config.max_span).count();
    info!(
        windows = total,
        "backfilling station {} from {} to {}", config.station, config.start, config.end
    );

    let bar = create_progress_bar(total as u64, "Fetching windows".to_string());
    let summary = pipeline::run(&config, &fetcher, &mut emitter, &cancel, &bar).await?;
    bar.finish_with_message("Backfill finished");

    Ok(summary)
}

fn parse_day(day: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .with_context(|| format!("Invalid date `{day}`, expected YYYY-MM-DD"))?;

    Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc())
}

// -- Tests -------------------------------------------------------------------
