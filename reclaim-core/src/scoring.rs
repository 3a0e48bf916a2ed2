//! Relevance scoring for (lost, found) report pairs.
//!
//! Additive and independent rules; the rule order only determines the order
//! of `reasons`. The sum is not clamped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::Report;

pub const CATEGORY_POINTS: u32 = 30;
pub const TEXT_POINTS: u32 = 30;
pub const COLOR_POINTS: u32 = 15;
pub const BRAND_POINTS: u32 = 10;
pub const LOCATION_POINTS: u32 = 10;
pub const RECENCY_POINTS: u32 = 5;

/// Text similarity must exceed this to earn points.
pub const TEXT_SIMILARITY_FLOOR: f64 = 0.3;

/// Reports this many days apart or closer earn the recency bonus.
pub const RECENT_WINDOW_DAYS: f64 = 7.0;

pub const REASON_CATEGORY: &str = "Same category";
pub const REASON_TEXT: &str = "Similar name/description";
pub const REASON_COLOR: &str = "Color match";
pub const REASON_BRAND: &str = "Brand match";
pub const REASON_LOCATION: &str = "Same location";
pub const REASON_RECENT: &str = "Reported within 7 days";

/// Score and human-readable reasons for a pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
    pub score: u32,
    pub reasons: Vec<String>,
}

impl MatchScore {
    fn award(&mut self, points: u32, reason: &str) {
        self.score += points;
        self.reasons.push(reason.to_string());
    }
}

/// Lower-cased whitespace tokens, as a set.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard similarity of the token sets of `a` and `b`.
///
/// Two empty inputs have similarity 0.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let left = tokenize(a);
    let right = tokenize(b);

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    intersection as f64 / union as f64
}

/// Parse a submitted timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (taken as UTC) and plain dates.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Absolute distance in days between two submitted timestamps.
///
/// `None` when either side is missing or unparseable.
pub fn days_apart(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let a = parse_timestamp(a?)?;
    let b = parse_timestamp(b?)?;
    Some((a - b).num_milliseconds().abs() as f64 / 86_400_000.0)
}

fn match_text(report: &Report) -> String {
    [
        Some(report.name.as_str()),
        report.description.as_deref(),
        report.brand.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
}

fn both_equal(left: &Option<String>, right: &Option<String>) -> bool {
    match (left.as_deref(), right.as_deref()) {
        (Some(l), Some(r)) => !l.is_empty() && l == r,
        _ => false,
    }
}

/// Score a (lost, found) pair. Pure; no I/O.
pub fn score_pair(lost: &Report, found: &Report) -> MatchScore {
    let mut result = MatchScore::default();

    if lost.category == found.category {
        result.award(CATEGORY_POINTS, REASON_CATEGORY);
    }

    let similarity = text_similarity(&match_text(lost), &match_text(found));
    if similarity > TEXT_SIMILARITY_FLOOR {
        result.award((similarity * TEXT_POINTS as f64).floor() as u32, REASON_TEXT);
    }

    if both_equal(&lost.color, &found.color) {
        result.award(COLOR_POINTS, REASON_COLOR);
    }

    if both_equal(&lost.brand, &found.brand) {
        result.award(BRAND_POINTS, REASON_BRAND);
    }

    if lost.location == found.location {
        result.award(LOCATION_POINTS, REASON_LOCATION);
    }

    if days_apart(lost.occurred_at.as_deref(), found.occurred_at.as_deref())
        .is_some_and(|days| days <= RECENT_WINDOW_DAYS)
    {
        result.award(RECENCY_POINTS, REASON_RECENT);
    }

    result
}
