mod cli;
mod config;
mod emit;
mod fetch;
mod pipeline;
mod reading;
mod units;
mod window;

use std::process::ExitCode;

use clap::Parser;
use cli::{command, Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backfill {
            token,
            station,
            start_date,
            end_date,
            output,
        } => match command::backfill(token, station, &start_date, end_date.as_deref(), output).await
        {
            Ok(summary) => {
                println!("{summary}");
                if summary.clean() {
                    ExitCode::SUCCESS
                } else {
                    // Completed with gaps: some windows contributed no rows.
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}
