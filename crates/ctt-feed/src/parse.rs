//! ICS parsing using the icalendar crate's parser.

use chrono::Duration;
use ctt_core::{RawEvent, RawTime};
use icalendar::parser::{Component, Property, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use tracing::debug;

use crate::FeedError;

/// The events of one feed plus its advertised name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedFeed {
    /// `X-WR-CALNAME`, if present.
    pub calendar_name: Option<String>,
    pub events: Vec<RawEvent>,
    /// VEVENTs dropped because they lack a usable DTSTART.
    pub skipped: usize,
}

/// Parses ICS text into raw events.
///
/// A document that is not an iCalendar at all is an error; individual
/// malformed VEVENTs are skipped and counted.
pub fn parse_feed(content: &str) -> Result<ParsedFeed, FeedError> {
    if !content.contains("BEGIN:VCALENDAR") {
        return Err(FeedError::Parse("missing BEGIN:VCALENDAR".to_string()));
    }

    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|err| FeedError::Parse(err.to_string()))?;

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    let mut feed = ParsedFeed {
        calendar_name: calendar_name(&unfolded),
        ..ParsedFeed::default()
    };
    for vevent in vevents {
        match parse_vevent(vevent) {
            Some(event) => feed.events.push(event),
            None => {
                debug!(
                    uid = ?vevent.find_prop("UID").map(|p| p.val.to_string()),
                    "skipping VEVENT without usable DTSTART"
                );
                feed.skipped += 1;
            }
        }
    }
    Ok(feed)
}

/// Gathers VEVENTs, looking through wrapper components like VCALENDAR.
fn collect_vevents<'a, 'c>(components: &'c [Component<'a>], out: &mut Vec<&'c Component<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else {
            collect_vevents(&component.components, out);
        }
    }
}

fn parse_vevent(vevent: &Component<'_>) -> Option<RawEvent> {
    let start = vevent.find_prop("DTSTART").and_then(raw_time)?;
    let end = vevent.find_prop("DTEND").and_then(raw_time);
    let duration = vevent
        .find_prop("DURATION")
        .and_then(|p| parse_duration(p.val.as_ref()));

    Some(RawEvent {
        uid: text_prop(vevent, "UID"),
        title: text_prop(vevent, "SUMMARY").map(|title| unescape(&title)),
        start,
        end,
        duration,
        recurrence_id: vevent.find_prop("RECURRENCE-ID").and_then(raw_time),
    })
}

fn text_prop(vevent: &Component<'_>, name: &str) -> Option<String> {
    vevent
        .find_prop(name)
        .map(|p| p.val.to_string())
        .filter(|value| !value.trim().is_empty())
}

/// Converts a date or date-time property, preserving its timezone form.
fn raw_time(prop: &Property<'_>) -> Option<RawTime> {
    let value = DatePerhapsTime::try_from(prop).ok()?;
    Some(match value {
        DatePerhapsTime::Date(date) => RawTime::Date(date),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => RawTime::Utc(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => RawTime::Floating(naive),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            RawTime::Zoned {
                datetime: date_time,
                tzid,
            }
        }
    })
}

/// Parses a positive `DURATION` value such as `PT1H30M` or `P1D`.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.starts_with('-') {
        return None;
    }
    let duration = iso8601::duration(value.trim_start_matches('+')).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// Reads `X-WR-CALNAME` from the calendar header.
fn calendar_name(unfolded: &str) -> Option<String> {
    unfolded
        .lines()
        .take_while(|line| !line.starts_with("BEGIN:VEVENT"))
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.split(';').next()?;
            name.eq_ignore_ascii_case("X-WR-CALNAME")
                .then(|| unescape(value.trim_end_matches('\r').trim()))
        })
        .filter(|name| !name.is_empty())
}

/// Undoes RFC 5545 TEXT escaping.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
