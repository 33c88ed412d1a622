//! Finding events by title.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use thiserror::Error;

use crate::aggregate::{GroupBy, GroupResolver};
use crate::bucket::ReportWindow;
use crate::event::Event;
use crate::source::Source;
use crate::types::SourceId;

/// Error type for search queries that cannot be compiled.
#[derive(Debug, Error)]
#[error("invalid search pattern: {0}")]
pub struct PatternError(#[from] regex::Error);

/// A case-insensitive title query.
///
/// The query matches anywhere in the title. `*` stands for any run of
/// characters; every other character is literal.
#[derive(Debug, Clone)]
pub struct TitlePattern(Regex);

impl TitlePattern {
    pub fn new(query: &str) -> Result<Self, PatternError> {
        let pattern = regex::escape(query.trim()).replace(r"\*", ".*");
        let regex = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
        Ok(Self(regex))
    }

    pub fn is_match(&self, title: &str) -> bool {
        self.0.is_match(title)
    }
}

/// Restricts a search to some sources or categories. Empty lists allow all.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub source_ids: Vec<SourceId>,
    /// Compared ignoring ASCII case.
    pub categories: Vec<String>,
    /// Only events touching this window.
    pub window: Option<ReportWindow>,
}

/// One matching event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub source: String,
    pub category: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_hours: f64,
}

/// Matching events, newest first, with their totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    pub count: usize,
    /// Full event durations, not clipped to the window.
    pub total_hours: f64,
    pub mean_hours: f64,
}

/// Finds the events whose titles match `pattern` and pass `filter`.
#[allow(clippy::cast_precision_loss)]
pub fn search(
    events: &[Event],
    sources: &[Source],
    pattern: &TitlePattern,
    filter: &SearchFilter,
) -> SearchResult {
    let names = GroupResolver::new(sources, GroupBy::Source);
    let categories = GroupResolver::new(sources, GroupBy::Category);

    let mut hits: Vec<SearchHit> = events
        .iter()
        .filter(|e| pattern.is_match(&e.title))
        .filter(|e| filter.source_ids.is_empty() || filter.source_ids.contains(&e.source_id))
        .filter(|e| filter.window.is_none_or(|w| w.intersects(e.start, e.end)))
        .filter_map(|e| {
            let category = categories.label(e);
            let wanted = filter.categories.is_empty()
                || filter
                    .categories
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&category));
            wanted.then(|| SearchHit {
                title: e.title.clone(),
                source: names.label(e),
                category,
                start: e.start,
                end: e.end,
                duration_hours: e.duration_hours(),
            })
        })
        .collect();
    hits.sort_by(|a, b| {
        Reverse(a.start)
            .cmp(&Reverse(b.start))
            .then_with(|| a.title.cmp(&b.title))
    });

    let count = hits.len();
    let total_hours: f64 = hits.iter().map(|h| h.duration_hours).sum();
    SearchResult {
        hits,
        count,
        total_hours,
        mean_hours: if count == 0 {
            0.0
        } else {
            total_hours / count as f64
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Tz;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn sources() -> Vec<Source> {
        vec![
            Source::new("https://a.example/work.ics", "Work", None, "#d82626"),
            Source::new(
                "https://a.example/gym.ics",
                "Gym",
                Some("Health".to_string()),
                "#26d826",
            ),
        ]
    }

    fn events(sources: &[Source]) -> Vec<Event> {
        let make = |source: &Source, title: &str, d: u32, from: u32, to: u32| {
            Event::new(None, source.id.clone(), title, at(d, from), at(d, to)).unwrap()
        };
        vec![
            make(&sources[0], "Team standup", 4, 9, 10),
            make(&sources[0], "Design review", 5, 13, 15),
            make(&sources[1], "Morning run", 6, 7, 8),
            make(&sources[0], "Standup (remote)", 11, 9, 10),
            make(&sources[1], "Stand-up paddling", 16, 10, 13),
        ]
    }

    fn titles(result: &SearchResult) -> Vec<&str> {
        result.hits.iter().map(|h| h.title.as_str()).collect()
    }

    #[test]
    fn matches_substrings_ignoring_case() {
        let sources = sources();
        let result = search(
            &events(&sources),
            &sources,
            &TitlePattern::new("STANDUP").unwrap(),
            &SearchFilter::default(),
        );
        assert_eq!(titles(&result), ["Standup (remote)", "Team standup"]);
        assert_eq!(result.count, 2);
        assert!((result.total_hours - 2.0).abs() < 1e-9);
        assert!((result.mean_hours - 1.0).abs() < 1e-9);
        assert_eq!(result.hits[0].source, "Work");
    }

    #[test]
    fn star_matches_any_run_and_other_characters_are_literal() {
        let sources = sources();
        let events = events(&sources);

        let wildcard = search(
            &events,
            &sources,
            &TitlePattern::new("stand*up").unwrap(),
            &SearchFilter::default(),
        );
        assert_eq!(
            titles(&wildcard),
            ["Stand-up paddling", "Standup (remote)", "Team standup"]
        );

        let literal = search(
            &events,
            &sources,
            &TitlePattern::new("(remote").unwrap(),
            &SearchFilter::default(),
        );
        assert_eq!(titles(&literal), ["Standup (remote)"]);
    }

    #[test]
    fn filters_by_category_and_source() {
        let sources = sources();
        let events = events(&sources);
        let everything = TitlePattern::new("").unwrap();

        let health = SearchFilter {
            categories: vec!["health".to_string()],
            ..SearchFilter::default()
        };
        let result = search(&events, &sources, &everything, &health);
        assert_eq!(titles(&result), ["Stand-up paddling", "Morning run"]);
        assert!(result.hits.iter().all(|h| h.category == "Health"));

        let work = SearchFilter {
            source_ids: vec![sources[0].id.clone()],
            ..SearchFilter::default()
        };
        assert_eq!(search(&events, &sources, &everything, &work).count, 3);
    }

    #[test]
    fn window_keeps_overlapping_events_at_full_length() {
        let sources = sources();
        let filter = SearchFilter {
            window: Some(ReportWindow::new(at(5, 14), at(11, 0)).unwrap()),
            ..SearchFilter::default()
        };
        let result = search(
            &events(&sources),
            &sources,
            &TitlePattern::new("*").unwrap(),
            &filter,
        );
        assert_eq!(titles(&result), ["Morning run", "Design review"]);
        assert!((result.total_hours - 3.0).abs() < 1e-9);
    }

    #[test]
    fn no_matches_has_zero_totals() {
        let sources = sources();
        let window = ReportWindow::from_dates(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            Tz::UTC,
        )
        .unwrap();
        let filter = SearchFilter {
            window: Some(window),
            ..SearchFilter::default()
        };
        let result = search(
            &events(&sources),
            &sources,
            &TitlePattern::new("dentist").unwrap(),
            &filter,
        );
        assert!(result.hits.is_empty());
        assert_eq!(result.count, 0);
        assert!(result.mean_hours.abs() < f64::EPSILON);
    }
}
