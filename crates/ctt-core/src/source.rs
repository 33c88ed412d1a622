//! Calendar feed sources.

use serde::{Deserialize, Serialize};

use crate::types::SourceId;

/// Prefix carried by display names of calendars filled through ICS import.
const IMPORTED_PREFIX: &str = "[Imported] ";

/// Display name used when neither configuration nor feed provide one.
pub const UNNAMED: &str = "Unnamed";

/// One configured calendar feed.
///
/// Read-only to the cache and apportionment code; `color` is passed through
/// for consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    /// Network or local-file locator of the feed.
    pub address: String,
    pub display_name: String,
    /// Grouping label; defaults to the display name.
    pub category: String,
    /// Hex color such as `#d8a61b`.
    pub color: String,
}

impl Source {
    /// Builds a source, deriving its ID from the address.
    pub fn new(
        address: impl Into<String>,
        display_name: impl Into<String>,
        category: Option<String>,
        color: impl Into<String>,
    ) -> Self {
        let address = address.into();
        let display_name = normalize_display_name(&display_name.into());
        let category = category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| display_name.clone());
        Self {
            id: SourceId::from_address(&address),
            address,
            display_name,
            category,
            color: color.into(),
        }
    }
}

/// Strips the import marker and surrounding whitespace from a calendar name.
pub fn normalize_display_name(name: &str) -> String {
    name.strip_prefix(IMPORTED_PREFIX)
        .unwrap_or(name)
        .trim()
        .to_string()
}

/// Picks the `index`-th of `total` evenly spaced hues as a hex color.
///
/// Saturation and lightness are fixed so every color stays vivid.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn distinct_color(index: usize, total: usize) -> String {
    let hue = if total == 0 {
        0.0
    } else {
        index as f64 / total as f64
    };
    let (r, g, b) = hls_to_rgb(hue, 0.5, 0.7);
    format!(
        "#{:02x}{:02x}{:02x}",
        (r * 255.0) as u8,
        (g * 255.0) as u8,
        (b * 255.0) as u8
    )
}

fn hls_to_rgb(h: f64, l: f64, s: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }
    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;
    (
        hue_channel(m1, m2, h + 1.0 / 3.0),
        hue_channel(m1, m2, h),
        hue_channel(m1, m2, h - 1.0 / 3.0),
    )
}

fn hue_channel(m1: f64, m2: f64, hue: f64) -> f64 {
    let hue = hue.rem_euclid(1.0);
    if hue < 1.0 / 6.0 {
        m1 + (m2 - m1) * hue * 6.0
    } else if hue < 0.5 {
        m2
    } else if hue < 2.0 / 3.0 {
        m1 + (m2 - m1) * (2.0 / 3.0 - hue) * 6.0
    } else {
        m1
    }
}
