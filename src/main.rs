use clap::Parser;

use gitlab_reporter::cli;
use gitlab_reporter::cli::args::Args;
use gitlab_reporter::infrastructure::logging::{setup_logging, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    setup_logging(LoggingConfig {
        level,
        ..Default::default()
    })?;

    cli::run(args).await
}
