//! Command line interface.

use std::path::PathBuf;

use clap::{command, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

pub mod command;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backfill historical Tempest observations into a WeeWX-style CSV
    Backfill {
        /// Tempest API token
        #[arg(long, env = "TEMPEST_API_TOKEN")]
        token: String,

        /// Tempest station id
        #[arg(long, env = "TEMPEST_STATION_ID")]
        station: String,

        /// First day to backfill (YYYY-MM-DD)
        #[arg(long, default_value = "2020-01-01")]
        start_date: String,

        /// Day to stop before (YYYY-MM-DD, exclusive; defaults to now)
        #[arg(long)]
        end_date: Option<String>,

        /// Output CSV file
        #[arg(long, default_value = "wx.csv")]
        output: PathBuf,
    },
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-"),
    )
}
