//! Signal extraction from found-item reports.
//!
//! Public signals (color, brand) prefer the reporter's structured fields.
//! Verification signals (damage, accessory, accessory color) come only from
//! the description, so a reporter cannot hand-pick easy challenge answers.
//!
//! Every vocabulary is an ordered list and the first hit wins. Reordering an
//! entry changes which label is chosen when a description mentions several.

use crate::types::{Report, SignalSet};

/// Color names, in tie-break order.
pub const COLOR_VOCABULARY: &[&str] = &[
    "black", "white", "red", "blue", "green", "yellow", "silver", "gold",
];

/// Canonical brand and the keywords that imply it.
pub const BRAND_KEYWORDS: &[(&str, &[&str])] = &[
    ("apple", &["apple", "iphone"]),
    ("samsung", &["samsung", "galaxy"]),
    ("oneplus", &["oneplus"]),
    ("xiaomi", &["xiaomi", "redmi", "mi"]),
    ("realme", &["realme"]),
];

pub const DAMAGE_KEYWORDS: &[(&str, &[&str])] = &[
    ("scratched", &["scratch", "scratched", "scratches"]),
    ("cracked", &["crack", "cracked", "broken screen"]),
    ("dented", &["dent", "dented"]),
];

pub const ACCESSORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("back cover", &["cover", "case", "back cover"]),
    ("screen protector", &["tempered glass", "screen guard"]),
];

/// First label whose keyword list has a substring hit in `text`.
fn find_label(text: &str, table: &[(&'static str, &[&str])]) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(label, _)| *label)
}

fn find_color(text: &str) -> Option<&'static str> {
    COLOR_VOCABULARY.iter().copied().find(|c| text.contains(c))
}

fn explicit(field: &Option<String>) -> Option<String> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Derive the signal set of a report.
///
/// Pure and deterministic; a missing or empty description yields `None` for
/// every keyword-derived signal.
pub fn extract_signals(report: &Report) -> SignalSet {
    let description = report
        .description
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    SignalSet {
        color: explicit(&report.color).or_else(|| find_color(&description).map(String::from)),
        brand: explicit(&report.brand)
            .or_else(|| find_label(&description, BRAND_KEYWORDS).map(String::from)),
        damage: find_label(&description, DAMAGE_KEYWORDS).map(String::from),
        accessory: find_label(&description, ACCESSORY_KEYWORDS).map(String::from),
        accessory_color: find_color(&description).map(String::from),
    }
}
