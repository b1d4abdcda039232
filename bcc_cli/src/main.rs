use std::{env::current_dir, fs::write, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use bcc_core::{
    bin_client::{
        self, CalendarOptions, ClientConfig, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS, DEFAULT_UPRN,
    },
    ics,
    schedule::{Horizon, DEFAULT_MONTHS_AHEAD},
};
use chrono::{Local, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Write the bin collection calendar of a property to an iCalendar file.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Arguments {
    /// the unique property reference number
    #[arg(long, env = "BINS_UPRN", default_value = DEFAULT_UPRN)]
    pub uprn: String,
    /// the collection details endpoint of the waste API
    #[arg(long, env = "BINS_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
    /// how many months (of 30 days) of collections to generate
    #[arg(long, env = "BINS_MONTHS_AHEAD", default_value_t = DEFAULT_MONTHS_AHEAD)]
    pub months_ahead: u32,
    /// timeout of the waste API request in seconds
    #[arg(long, env = "BINS_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
    /// exclude the collections of these services, e.g. `--exclude Garden,Food`
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
    /// the file to write, relative to the current directory
    #[arg(long, short, default_value = "bins.ics")]
    pub output: PathBuf,
}

impl From<&Arguments> for ClientConfig {
    fn from(value: &Arguments) -> Self {
        ClientConfig {
            api_url: value.api_url.clone(),
            uprn: value.uprn.clone(),
            timeout: Duration::from_secs(value.timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Arguments::parse();
    let options = CalendarOptions {
        horizon: Horizon::months_ahead(Local::now().date_naive(), args.months_ahead),
        excluded_services: args.exclude.clone(),
        generated_at: Utc::now(),
    };
    let calendar = bin_client::get(&ClientConfig::from(&args), &options).await?;
    let mut path = current_dir()?;
    path.push(&args.output);
    write(&path, ics::generate(&calendar))
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), events = calendar.events.len(), "calendar written");
    Ok(())
}
