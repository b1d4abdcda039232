//! This module turns a schedule description and one known collection date into a series of dates.

use std::sync::OnceLock;

use chrono::{Days, NaiveDate};
use regex::Regex;

/// The number of months to generate collection dates for if nothing else is configured.
pub const DEFAULT_MONTHS_AHEAD: u32 = 6;

/// A month is counted as 30 days when computing the horizon.
const DAYS_PER_MONTH: u64 = 30;

/// The number of days between two collections of the same service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RepeatInterval(u32);

impl RepeatInterval {
    /// Returns `None` for zero days.
    pub fn from_days(days: u32) -> Option<Self> {
        (days > 0).then_some(Self(days))
    }

    pub fn days(self) -> u32 {
        self.0
    }
}

/// A rule inspects the lowercased description and yields the interval in days if it applies.
type Rule = fn(&str) -> Option<u32>;

/// Evaluated top to bottom, the first rule which applies wins.
///
/// The order is load-bearing: "every 2 weeks" must yield 14 days and "every 3 weeks" must not be
/// caught by the bare "week" substring of the weekly rule.
static RULES: [Rule; 3] = [fortnightly, every_n_weeks, weekly];

fn fortnightly(description: &str) -> Option<u32> {
    ["fortnight", "every 2 week", "every other week"]
        .iter()
        .any(|needle| description.contains(needle))
        .then_some(14)
}

fn every_n_weeks(description: &str) -> Option<u32> {
    static EVERY_N_WEEKS: OnceLock<Regex> = OnceLock::new();
    let regex =
        EVERY_N_WEEKS.get_or_init(|| Regex::new(r"every\s+(?P<weeks>\d+)\s+week").unwrap());
    let weeks: u32 = regex.captures(description)?["weeks"].parse().ok()?;
    weeks.checked_mul(7).filter(|&days| days > 0)
}

fn weekly(description: &str) -> Option<u32> {
    ["every week", "weekly", "week"]
        .iter()
        .any(|needle| description.contains(needle))
        .then_some(7)
}

/// Infer the repeat interval from a free text schedule description like "Weekly collection".
///
/// This is a heuristic. Text which matches no rule yields `None`, which means only the known
/// collection date is used.
pub fn classify(description: &str) -> Option<RepeatInterval> {
    let description = description.to_lowercase();
    RULES
        .iter()
        .find_map(|rule| rule(&description))
        .and_then(RepeatInterval::from_days)
}

/// The window of dates for which occurrences are generated, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    pub today: NaiveDate,
    pub end: NaiveDate,
}

impl Horizon {
    /// Build the window `[today, today + months * 30 days]`.
    pub fn months_ahead(today: NaiveDate, months: u32) -> Self {
        let end = today
            .checked_add_days(Days::new(u64::from(months) * DAYS_PER_MONTH))
            .unwrap_or(NaiveDate::MAX);
        Self { today, end }
    }
}

/// Project the `anchor` date into all dates inside the `horizon`.
///
/// The series always steps from `anchor`, so dates before `today` are dropped without shifting
/// the phase of the series. Without an interval only the anchor itself can be yielded.
pub fn expand(anchor: NaiveDate, interval: Option<RepeatInterval>, horizon: Horizon) -> Occurrences {
    Occurrences {
        next: Some(anchor),
        interval,
        horizon,
    }
}

/// Iterator over the collection dates produced by [`expand`].
#[derive(Debug, Clone)]
pub struct Occurrences {
    next: Option<NaiveDate>,
    interval: Option<RepeatInterval>,
    horizon: Horizon,
}

impl Iterator for Occurrences {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        loop {
            let current = self.next.filter(|date| *date <= self.horizon.end)?;
            self.next = self
                .interval
                .and_then(|interval| current.checked_add_days(Days::new(interval.days().into())));
            if current >= self.horizon.today {
                return Some(current);
            }
        }
    }
}
