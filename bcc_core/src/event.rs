//! A collection event is one collection date of one service, ready to be put into a calendar.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use ical::{
    generator::{IcalEvent, Property},
    ical_param, ical_property,
    parser::ical::component::IcalAlarm,
};
use md5::{Digest, Md5};

use crate::ics::escape_text;

static UID_NAMESPACE: &str = "southglos-bins";
static UID_DOMAIN: &str = "bins";
static DATE_FORMAT: &str = "%Y%m%d";
static STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// The reminder fires at 19:00 the evening before, counted from midnight of the collection day.
const REMINDER_OFFSET_HOURS: i64 = -17;

/// Calendar colours (RFC 7986) for the services we know about.
static SERVICE_COLOURS: [(&str, &str); 4] = [
    ("Refuse", "red"),
    ("Food", "green"),
    ("Recycling", "blue"),
    ("Garden", "cyan"),
];

/// The alarm attached to every collection event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub description: String,
    /// Offset from the start of the event, negative means before.
    pub trigger: Duration,
}

/// An all-day event for a single collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEvent {
    pub uid: String,
    pub service: String,
    pub summary: String,
    pub description: String,
    pub start: NaiveDate,
    /// Exclusive, always the day after `start`.
    pub end: NaiveDate,
    pub reminder: Reminder,
}

impl CollectionEvent {
    /// Returns `None` only if `date` is the last representable date.
    pub fn new(service: &str, schedule: &str, date: NaiveDate) -> Option<Self> {
        Some(Self {
            uid: uid(service, &date),
            service: service.to_string(),
            summary: format!("♻ {service} collection"),
            description: format!("Service: {service}\nSchedule: {schedule}"),
            start: date,
            end: date.succ_opt()?,
            reminder: Reminder {
                description: format!("Put out {service} bin tonight!"),
                trigger: Duration::hours(REMINDER_OFFSET_HOURS),
            },
        })
    }

    /// The local instant the reminder fires at, taking the start of the event as midnight.
    pub fn reminder_at(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN) + self.reminder.trigger
    }

    /// Build the `VEVENT` including its `VALARM`.
    pub fn to_ical_event(&self, stamp: &DateTime<Utc>) -> IcalEvent {
        let mut event = IcalEvent::new();
        event.properties.extend([
            ical_property!("UID", self.uid.as_str()),
            ical_property!("DTSTAMP", stamp.format(STAMP_FORMAT).to_string()),
            ical_property!(
                "DTSTART",
                self.start.format(DATE_FORMAT).to_string(),
                ical_param!("VALUE", "DATE")
            ),
            ical_property!(
                "DTEND",
                self.end.format(DATE_FORMAT).to_string(),
                ical_param!("VALUE", "DATE")
            ),
            ical_property!("SUMMARY", escape_text(&self.summary)),
            ical_property!("DESCRIPTION", escape_text(&self.description)),
            ical_property!("TRANSP", "TRANSPARENT"),
        ]);
        if let Some(colour) = colour(&self.service) {
            event.properties.push(ical_property!("COLOR", colour));
        }
        let mut alarm = IcalAlarm::new();
        alarm.properties.extend([
            ical_property!("ACTION", "DISPLAY"),
            ical_property!("DESCRIPTION", escape_text(&self.reminder.description)),
            ical_property!("TRIGGER", format_trigger(self.reminder.trigger)),
        ]);
        event.alarms.push(alarm);
        event
    }
}

/// Get a unique id for a specific collection date of a specific service.
///
/// Changing this function is a breaking change! Calendar clients would see every event of the
/// feed as new.
pub fn uid(service: &str, date: &NaiveDate) -> String {
    let key = format!("{service}-{}@{UID_NAMESPACE}", date.format("%Y-%m-%d"));
    let digest = Md5::digest(key.as_bytes());
    format!("{}@{UID_DOMAIN}", hex::encode(digest))
}

fn colour(service: &str) -> Option<&'static str> {
    SERVICE_COLOURS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(service.trim()))
        .map(|(_, colour)| *colour)
}

/// Format an offset as an RFC 5545 duration like `-PT17H`.
fn format_trigger(offset: Duration) -> String {
    let sign = if offset < Duration::zero() { "-" } else { "" };
    let minutes = offset.num_minutes().abs();
    match (minutes / 60, minutes % 60) {
        (0, 0) => String::from("PT0S"),
        (hours, 0) => format!("{sign}PT{hours}H"),
        (0, minutes) => format!("{sign}PT{minutes}M"),
        (hours, minutes) => format!("{sign}PT{hours}H{minutes}M"),
    }
}
