//! This crate builds an iCalendar feed of household bin collections with a reminder the evening
//! before each collection.
//!
//! The collection details are read from South Gloucestershire's waste API
//! <https://api.southglos.gov.uk/wastecomp/GetCollectionDetails>.

pub use ical;

pub mod bin_client;
pub mod event;
pub mod ics;
pub mod schedule;
