use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
};
use bcc_core::{
    bin_client::{self, CalendarOptions},
    ics,
    schedule::Horizon,
};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    /// serve another property than the configured one
    uprn: Option<String>,
    /// comma-separated service names to leave out
    exclude: Option<String>,
}

impl QueryParams {
    fn excluded_services(&self) -> Vec<String> {
        self.exclude
            .iter()
            .flat_map(|exclude| exclude.split(','))
            .map(str::trim)
            .filter(|service| !service.is_empty())
            .map(String::from)
            .collect()
    }
}

pub async fn handle(
    config: &Config,
    query_params: &QueryParams,
    today: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Result<Response, (StatusCode, String)> {
    let client_config = config.client_config(query_params.uprn.as_deref());
    let options = CalendarOptions {
        horizon: Horizon::months_ahead(today, config.months_ahead),
        excluded_services: query_params.excluded_services(),
        generated_at,
    };
    let ical_calendar = bin_client::get(&client_config, &options)
        .await
        .map_err(|err| {
            let error = format!("{err:#}");
            warn!(uprn = %client_config.uprn, %error, "fetching bin data failed");
            (
                StatusCode::BAD_GATEWAY,
                format!("Error fetching bin data: {error}"),
            )
        })?;
    info!(uprn = %client_config.uprn, events = ical_calendar.events.len(), "serving bin calendar");
    let response = (
        [
            (CONTENT_TYPE, "text/calendar"),
            (CONTENT_DISPOSITION, "inline; filename=bins.ics"),
            (CACHE_CONTROL, "no-cache"),
        ],
        ics::generate(&ical_calendar),
    )
        .into_response();
    Ok(response)
}

/// Handle bin calendar requests.
///
/// The `uprn` and `exclude` query parameters are optional.
pub async fn handler(
    State(config): State<Arc<Config>>,
    Query(query_params): Query<QueryParams>,
) -> Result<Response, (StatusCode, String)> {
    handle(
        &config,
        &query_params,
        Local::now().date_naive(),
        Utc::now(),
    )
    .await
}
