use std::{net::SocketAddr, time::Duration};

use bcc_core::{
    bin_client::{ClientConfig, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS, DEFAULT_UPRN},
    schedule::DEFAULT_MONTHS_AHEAD,
};
use clap::Parser;

/// Serve bin collection dates as an iCalendar feed.
#[derive(Debug, Clone, Parser)]
#[command(version)]
pub struct Config {
    /// the address to listen on
    #[arg(long, env = "BINS_LISTEN", default_value = "0.0.0.0:10000")]
    pub listen: SocketAddr,
    /// the collection details endpoint of the waste API
    #[arg(long, env = "BINS_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
    /// the property to serve if a request does not ask for another one
    #[arg(long, env = "BINS_UPRN", default_value = DEFAULT_UPRN)]
    pub uprn: String,
    /// how many months (of 30 days) of collections to generate
    #[arg(long, env = "BINS_MONTHS_AHEAD", default_value_t = DEFAULT_MONTHS_AHEAD)]
    pub months_ahead: u32,
    /// timeout of the waste API request in seconds
    #[arg(long, env = "BINS_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl Config {
    pub fn client_config(&self, uprn: Option<&str>) -> ClientConfig {
        ClientConfig {
            api_url: self.api_url.clone(),
            uprn: uprn.unwrap_or(&self.uprn).to_string(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
