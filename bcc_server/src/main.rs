//! This crate implements an iCalendar server serving household bin collection dates as events.
//!
//! The feed is served at `/bins.ics`, optionally with `?uprn=<property>&exclude=<services>`.

use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

mod config;
mod route;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let config = Config::parse();
    info!(
        listen = %config.listen,
        uprn = %config.uprn,
        months_ahead = config.months_ahead,
        "starting bin calendar server"
    );
    let addr = config.listen;
    let app = Router::new()
        .route("/bins.ics", get(route::bins::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(config));
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
