//! buildwatch entrypoint.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod handlers;

use config::BuildwatchConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "buildwatch")]
#[command(author, version, about = "Schedules test suites as new builds land", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short = 'f', long, default_value = "buildwatch.yaml")]
    config: PathBuf,

    /// Events to fire once for --build, comma separated
    #[arg(short, long, value_delimiter = ',', requires = "build")]
    events: Vec<String>,

    /// Build to fire --events for, e.g. x86-alex-release/R20-2057.0.10
    #[arg(short = 'i', long, requires = "events")]
    build: Option<String>,

    /// List supported events and exit
    #[arg(short, long)]
    list_events: bool,

    /// Check the configuration and exit
    #[arg(short = 't', long)]
    sanity: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    if cli.list_events {
        handlers::list_events();
        return Ok(());
    }

    let config = BuildwatchConfig::from_file(&cli.config)?;

    if cli.sanity {
        handlers::sanity(&config)?;
        return Ok(());
    }

    match cli.build {
        Some(build) => handlers::force_events(&config, &cli.events, &build).await?,
        None => handlers::run(&config).await?,
    }

    Ok(())
}
