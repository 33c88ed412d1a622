//! Core domain logic for the calendar time tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Normalization: turning parsed feed entries into canonical events
//! - Reconciliation: merging fresh fetches into a cached event set
//! - Apportionment: splitting event durations across day/week/month buckets
//! - Aggregation: reducing apportioned hours into report rows
//! - Search: finding events by title

pub mod aggregate;
pub mod apportion;
pub mod bucket;
pub mod event;
pub mod normalize;
pub mod reconcile;
pub mod search;
pub mod source;
pub mod types;

pub use aggregate::{
    ActivityCell, GroupBy, ReportRow, SummaryRow, UnknownGroupBy, activity, aggregate, summarize,
};
pub use apportion::{Apportionment, ApportionmentRecord, apportion};
pub use bucket::{Bucket, Granularity, ReportWindow, UnknownGranularity, WindowError, buckets};
pub use event::{Event, EventIdentity};
pub use normalize::{NormalizeError, RawEvent, RawTime, UNTITLED, normalize};
pub use reconcile::{DEFAULT_RECENCY_DAYS, ReconcilePolicy, merge_events};
pub use search::{PatternError, SearchFilter, SearchHit, SearchResult, TitlePattern, search};
pub use source::{Source, UNNAMED, distinct_color, normalize_display_name};
pub use types::{SourceId, Uid, ValidationError};
