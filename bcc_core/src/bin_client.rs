//! This client fetches the collection details of a property and builds the bin calendar from them.

use std::{sync::OnceLock, time::Duration};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ical::{
    generator::{IcalCalendar, IcalCalendarBuilder, Property},
    ical_property,
};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    event::CollectionEvent,
    schedule::{self, Horizon},
};

pub static DEFAULT_API_URL: &str = "https://api.southglos.gov.uk/wastecomp/GetCollectionDetails";
pub static DEFAULT_UPRN: &str = "540378";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

static PROD_ID: &str = "-//Bin Collection Feed//southglos//EN";
static CALENDAR_NAME: &str = "Bin Collections";
static TIMEZONE: &str = "Europe/London";
static UNKNOWN_SERVICE: &str = "Unknown";

/// Formats of `hso_nextcollection` we have seen or expect, tried in order.
///
/// Numeric dates are day first, the API is run by a UK council.
static OFFSET_DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];
static DATE_TIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];
static DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d %B %Y",
    "%A %d %B %Y",
    "%A, %d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Where and how to fetch the collection details.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub uprn: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::from(DEFAULT_API_URL),
            uprn: String::from(DEFAULT_UPRN),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// What to put into the calendar.
#[derive(Debug, Clone)]
pub struct CalendarOptions {
    pub horizon: Horizon,
    /// Service names to leave out, compared case-insensitively.
    pub excluded_services: Vec<String>,
    /// Used as `DTSTAMP` of every event.
    pub generated_at: DateTime<Utc>,
}

impl CalendarOptions {
    fn is_excluded(&self, service: &str) -> bool {
        self.excluded_services
            .iter()
            .any(|excluded| excluded.trim().eq_ignore_ascii_case(service.trim()))
    }
}

/// One collection service of a property as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "hso_servicename", default)]
    pub service_name: Option<String>,
    #[serde(rename = "hso_nextcollection", default)]
    pub next_collection: Option<String>,
    #[serde(rename = "hso_scheduledescription", default)]
    pub schedule_description: Option<String>,
}

impl ServiceRecord {
    pub fn name(&self) -> &str {
        self.service_name.as_deref().unwrap_or(UNKNOWN_SERVICE)
    }

    pub fn schedule(&self) -> &str {
        self.schedule_description.as_deref().unwrap_or_default()
    }

    /// The next known collection date, which is the anchor for all following dates.
    pub fn next_collection_date(&self) -> Result<NaiveDate> {
        let raw = self
            .next_collection
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| anyhow!("no next collection date"))?;
        parse_date(raw).ok_or_else(|| anyhow!("unrecognised next collection date {raw:?}"))
    }

    /// All collection events of this service within the horizon.
    pub fn collection_events(&self, horizon: Horizon) -> Result<Vec<CollectionEvent>> {
        let anchor = self.next_collection_date()?;
        let interval = schedule::classify(self.schedule());
        Ok(schedule::expand(anchor, interval, horizon)
            .filter_map(|date| CollectionEvent::new(self.name(), self.schedule(), date))
            .collect())
    }
}

/// The envelope of the API response.
#[derive(Debug, Deserialize)]
struct CollectionDetails {
    #[serde(default)]
    value: Vec<ServiceRecord>,
}

/// Get the calendar for the property configured in `config`.
pub async fn get(config: &ClientConfig, options: &CalendarOptions) -> Result<IcalCalendar> {
    let body = get_response(config).await?;
    let services = parse(&body)?;
    debug!(count = services.len(), uprn = %config.uprn, "fetched collection services");
    Ok(get_calendar(&services, options))
}

/// Get the raw JSON body from the official API.
async fn get_response(config: &ClientConfig) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .context("failed to build HTTP client")?;
    let body = client
        .get(&config.api_url)
        .query(&[("uprn", config.uprn.as_str())])
        .send()
        .await
        .context("failed to reach the collection API")?
        .error_for_status()?
        .text()
        .await
        .context("failed to read the collection API response")?;
    Ok(body)
}

/// Parse the API response to the list of services.
fn parse(json: &str) -> Result<Vec<ServiceRecord>> {
    let details: CollectionDetails =
        serde_json::from_str(json).context("invalid collection API response")?;
    Ok(details.value)
}

/// Build the calendar from the services.
///
/// A service whose next collection date is missing or malformed is skipped, the other services
/// are not affected by it.
pub fn get_calendar(services: &[ServiceRecord], options: &CalendarOptions) -> IcalCalendar {
    let mut calendar = IcalCalendarBuilder::version("2.0")
        .gregorian()
        .prodid(PROD_ID)
        .build();
    calendar.properties.extend([
        ical_property!("X-WR-CALNAME", CALENDAR_NAME),
        ical_property!("X-WR-TIMEZONE", TIMEZONE),
    ]);
    for service in services {
        if options.is_excluded(service.name()) {
            debug!(service = service.name(), "service excluded");
            continue;
        }
        let events = match service.collection_events(options.horizon) {
            Ok(events) => events,
            Err(err) => {
                warn!(service = service.name(), error = %err, "skipping service");
                continue;
            }
        };
        calendar.events.extend(
            events
                .iter()
                .map(|event| event.to_ical_event(&options.generated_at)),
        );
    }
    calendar
}

/// Parse the loosely formatted date of the API, the time of day is ignored.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date_time) = DateTime::parse_from_rfc3339(raw) {
        return Some(date_time.date_naive());
    }
    if let Ok(date_time) = DateTime::parse_from_rfc2822(raw) {
        return Some(date_time.date_naive());
    }
    OFFSET_DATE_TIME_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
        .map(|date_time| date_time.date_naive())
        .or_else(|| {
            DATE_TIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|date_time| date_time.date())
        })
        .or_else(|| parse_date_only(raw))
        .or_else(|| parse_date_only(&strip_ordinals(raw)))
}

fn parse_date_only(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Turn "8th January" into "8 January".
fn strip_ordinals(raw: &str) -> String {
    static ORDINAL: OnceLock<Regex> = OnceLock::new();
    let ordinal =
        ORDINAL.get_or_init(|| Regex::new(r"(?i)\b(?P<day>\d{1,2})(?:st|nd|rd|th)\b").unwrap());
    ordinal.replace_all(raw, "$day").into_owned()
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Duration};

    use chrono::{DateTime, NaiveDate, Utc};
    use ical::generator::{IcalCalendar, IcalEvent};
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::{
        bin_client::{
            get, get_calendar, parse, parse_date, CalendarOptions, ClientConfig, ServiceRecord,
        },
        event::uid,
        ics,
        schedule::Horizon,
    };

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    fn get_test_options() -> CalendarOptions {
        CalendarOptions {
            horizon: Horizon::months_ahead(date("2024-01-01"), 1),
            excluded_services: vec![],
            generated_at: DateTime::parse_from_rfc3339("2024-01-01T06:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn get_test_services() -> Vec<ServiceRecord> {
        parse(include_str!("bin_client/tests/collection_details.json")).unwrap()
    }

    fn get_property_value<'a>(event: &'a IcalEvent, property_name: &str) -> &'a str {
        event
            .properties
            .iter()
            .find(|property| property.name == property_name)
            .unwrap()
            .value
            .as_ref()
            .unwrap()
    }

    fn find_events<'a>(calendar: &'a IcalCalendar, service: &str) -> Vec<&'a IcalEvent> {
        let summary = format!("♻ {service} collection");
        calendar
            .events
            .iter()
            .filter(|event| get_property_value(event, "SUMMARY") == summary)
            .collect()
    }

    fn start_dates(events: &[&IcalEvent]) -> Vec<String> {
        events
            .iter()
            .map(|event| get_property_value(event, "DTSTART").to_string())
            .collect()
    }

    /// Test whether the API response is parsed correctly, including missing and null fields.
    #[test]
    fn test_parse() {
        let services = get_test_services();
        assert_eq!(services.len(), 6);
        assert_eq!(services[0].name(), "Refuse");
        assert_eq!(services[0].schedule(), "Fortnightly on Monday");
        assert_eq!(services[4].name(), "Unknown");
        assert_eq!(services[4].schedule(), "Every 3 weeks");
        assert_eq!(services[5].name(), "Bulky");
        assert_eq!(services[5].schedule(), "");
        assert_eq!(services[5].next_collection, None);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse("<html>Service unavailable</html>").is_err());
        assert!(parse("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_date() {
        let expected = Some(date("2024-01-08"));
        assert_eq!(parse_date("2024-01-08T00:00:00"), expected);
        assert_eq!(parse_date("2024-01-08T00:00:00Z"), expected);
        assert_eq!(parse_date("2024-01-08T07:00:00+00:00"), expected);
        assert_eq!(parse_date("2024-01-08 00:00:00"), expected);
        assert_eq!(parse_date("2024-01-08"), expected);
        assert_eq!(parse_date("08/01/2024"), expected);
        assert_eq!(parse_date("08/01/2024 07:00"), expected);
        assert_eq!(parse_date("8 January 2024"), expected);
        assert_eq!(parse_date("Monday 8 January 2024"), expected);
        assert_eq!(parse_date("2024-01-08T00:00:00+0000"), expected);
        assert_eq!(parse_date("2024-01-08 07:00:00+0000"), expected);
        assert_eq!(parse_date("Mon, 08 Jan 2024 00:00:00 GMT"), expected);
        assert_eq!(parse_date("January 8, 2024"), expected);
        assert_eq!(parse_date("Jan 8, 2024"), expected);
        assert_eq!(parse_date("2024/01/08"), expected);
        assert_eq!(parse_date("2024/01/08 07:00:00"), expected);
        assert_eq!(parse_date("8th January 2024"), expected);
        assert_eq!(parse_date("Monday, 8th January 2024"), expected);
        assert_eq!(parse_date("January 8th, 2024"), expected);
        assert_eq!(parse_date("next week"), None);
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date("1st of the month"), None);
    }

    /// Numeric dates are read day first.
    #[test]
    fn test_parse_date_day_first() {
        assert_eq!(parse_date("08/01/2024"), Some(date("2024-01-08")));
        assert_eq!(parse_date("13/01/2024"), Some(date("2024-01-13")));
        assert_eq!(parse_date("01/13/2024"), None);
    }

    #[test]
    fn test_next_collection_date() {
        let mut service = ServiceRecord::default();
        assert!(service.next_collection_date().is_err());
        service.next_collection = Some(String::from("  "));
        assert!(service.next_collection_date().is_err());
        service.next_collection = Some(String::from("2024-01-08T00:00:00"));
        assert_eq!(service.next_collection_date().unwrap(), date("2024-01-08"));
    }

    #[test]
    fn test_get_calendar() {
        let calendar = get_calendar(&get_test_services(), &get_test_options());
        let refuse = find_events(&calendar, "Refuse");
        assert_eq!(start_dates(&refuse), vec!["20240108", "20240122"]);
        let recycling = find_events(&calendar, "Recycling");
        assert_eq!(
            start_dates(&recycling),
            vec!["20240102", "20240109", "20240116", "20240123", "20240130"]
        );
        let garden = find_events(&calendar, "Garden");
        assert_eq!(start_dates(&garden), vec!["20240110"]);
        let unknown = find_events(&calendar, "Unknown");
        assert_eq!(start_dates(&unknown), vec!["20240105", "20240126"]);
        // the food record has a malformed date and the last one has none
        assert!(find_events(&calendar, "Food").is_empty());
        assert_eq!(calendar.events.len(), 10);
        assert_eq!(
            get_property_value(refuse[0], "UID"),
            uid("Refuse", &date("2024-01-08"))
        );
    }

    #[test]
    fn test_get_calendar_exclusion() {
        let mut options = get_test_options();
        options.excluded_services = vec![String::from("recycling "), String::from("GARDEN")];
        let calendar = get_calendar(&get_test_services(), &options);
        assert!(find_events(&calendar, "Recycling").is_empty());
        assert!(find_events(&calendar, "Garden").is_empty());
        assert_eq!(calendar.events.len(), 4);
    }

    #[test]
    fn test_get_calendar_properties() {
        let ics = ics::generate(&get_calendar(&[], &get_test_options()));
        assert!(ics.contains("VERSION:2.0"));
        assert!(ics.contains("CALSCALE:GREGORIAN"));
        assert!(ics.contains("PRODID:-//Bin Collection Feed//southglos//EN"));
        assert!(ics.contains("X-WR-CALNAME:Bin Collections"));
        assert!(ics.contains("X-WR-TIMEZONE:Europe/London"));
        assert!(!ics.contains("BEGIN:VEVENT"));
    }

    #[test]
    fn test_get_calendar_alarms() {
        let ics = ics::generate(&get_calendar(&get_test_services(), &get_test_options()));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 10);
        assert_eq!(ics.matches("BEGIN:VALARM").count(), 10);
        assert!(ics.contains("TRIGGER:-PT17H"));
        assert!(ics.contains("DTSTART;VALUE=DATE:20240108"));
        assert!(ics.contains("DTEND;VALUE=DATE:20240109"));
        assert!(ics.split_inclusive('\n').all(|line| line.ends_with("\r\n")));
    }

    /// Test whether upstream text with multibyte characters is folded without splitting them,
    /// wherever they end up relative to the fold points.
    #[test]
    fn test_get_calendar_non_ascii_text() {
        let services: Vec<ServiceRecord> = (0..80)
            .map(|padding| ServiceRecord {
                service_name: Some(format!("Refuse {padding}")),
                next_collection: Some(String::from("2024-01-08")),
                schedule_description: Some(format!("{}– every Tuesday", "x".repeat(padding))),
            })
            .collect();
        let ics = ics::generate(&get_calendar(&services, &get_test_options()));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 80);
        for line in ics.split("\r\n") {
            assert!(line.len() <= 75, "{line:?}");
        }
        let unfolded = ics.replace("\r\n ", "");
        for padding in 0..80 {
            let description = format!(
                "DESCRIPTION:Service: Refuse {padding}\\nSchedule: {}– every Tuesday\r\n",
                "x".repeat(padding)
            );
            assert!(unfolded.contains(&description), "{description:?}");
        }
    }

    /// Test whether the API is queried for the configured property.
    ///
    /// This test is offline, the API is mocked.
    #[tokio::test]
    async fn test_get() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wastecomp/GetCollectionDetails"))
            .and(query_param("uprn", "12345"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("bin_client/tests/collection_details.json")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        let config = ClientConfig {
            api_url: format!("{}/wastecomp/GetCollectionDetails", mock_server.uri()),
            uprn: String::from("12345"),
            timeout: Duration::from_secs(5),
        };
        let calendar = get(&config, &get_test_options()).await.unwrap();
        assert_eq!(calendar.events.len(), 10);
    }

    #[tokio::test]
    async fn test_get_upstream_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;
        let config = ClientConfig {
            api_url: mock_server.uri(),
            ..ClientConfig::default()
        };
        assert!(get(&config, &get_test_options()).await.is_err());
    }

    #[tokio::test]
    async fn test_get_invalid_payload() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;
        let config = ClientConfig {
            api_url: mock_server.uri(),
            ..ClientConfig::default()
        };
        assert!(get(&config, &get_test_options()).await.is_err());
    }
}
