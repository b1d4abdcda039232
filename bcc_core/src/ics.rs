//! Serialize the calendar to iCalendar text (RFC 5545).
//!
//! Lines end with CRLF and are folded at 75 octets without splitting a UTF-8 character. Only the
//! components this crate builds are written: calendar properties, events and their alarms.

use ical::{
    generator::{IcalCalendar, IcalEvent, Property},
    parser::ical::component::IcalAlarm,
};

/// Maximum line length in octets, not counting the CRLF.
const MAX_LINE_OCTETS: usize = 75;

/// Serialize the whole calendar.
pub fn generate(calendar: &IcalCalendar) -> String {
    let mut output = String::new();
    output.push_str(&fold_line("BEGIN:VCALENDAR"));
    write_properties(&mut output, &calendar.properties);
    for event in &calendar.events {
        write_event(&mut output, event);
    }
    output.push_str(&fold_line("END:VCALENDAR"));
    output
}

fn write_event(output: &mut String, event: &IcalEvent) {
    output.push_str(&fold_line("BEGIN:VEVENT"));
    write_properties(output, &event.properties);
    for alarm in &event.alarms {
        write_alarm(output, alarm);
    }
    output.push_str(&fold_line("END:VEVENT"));
}

fn write_alarm(output: &mut String, alarm: &IcalAlarm) {
    output.push_str(&fold_line("BEGIN:VALARM"));
    write_properties(output, &alarm.properties);
    output.push_str(&fold_line("END:VALARM"));
}

fn write_properties(output: &mut String, properties: &[Property]) {
    for property in properties {
        output.push_str(&fold_line(&content_line(property)));
    }
}

/// Build the unfolded `NAME;PARAM=VALUE:value` line. The value is written as is.
fn content_line(property: &Property) -> String {
    let mut line = property.name.clone();
    for (name, values) in property.params.iter().flatten() {
        line.push(';');
        line.push_str(name);
        line.push('=');
        let values: Vec<String> = values.iter().map(|value| param_value(value)).collect();
        line.push_str(&values.join(","));
    }
    line.push(':');
    if let Some(value) = &property.value {
        line.push_str(value);
    }
    line
}

/// Quote a parameter value if it contains a delimiter, double quotes are not allowed inside.
fn param_value(value: &str) -> String {
    let value = value.replace('"', "");
    if value.contains([':', ';', ',']) {
        format!("\"{value}\"")
    } else {
        value
    }
}

/// Fold a content line by inserting CRLF and a single space, never inside a UTF-8 character.
fn fold_line(line: &str) -> String {
    let mut folded = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3 + 2);
    let mut rest = line;
    // continuation lines lose one octet to the leading space
    let mut limit = MAX_LINE_OCTETS;
    while rest.len() > limit {
        let mut end = limit;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        folded.push_str(&rest[..end]);
        folded.push_str("\r\n ");
        rest = &rest[end..];
        limit = MAX_LINE_OCTETS - 1;
    }
    folded.push_str(rest);
    folded.push_str("\r\n");
    folded
}

/// Escape a TEXT value as described in RFC 5545, section 3.3.11.
pub(crate) fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            c => escaped.push(c),
        }
    }
    escaped
}
