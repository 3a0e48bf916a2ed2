//! Core data model for lost/found reports, matches and claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Minimum score for a pair to be persisted as a candidate match.
pub const MATCH_THRESHOLD: u32 = 60;

/// Minimum score for a candidate to count as a strong match worth notifying.
pub const STRONG_MATCH_THRESHOLD: u32 = 75;

/// Which side of the reconciliation a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Lost,
    Found,
}

impl ReportKind {
    /// The kind this report is matched against.
    pub fn opposite(&self) -> Self {
        match self {
            ReportKind::Lost => ReportKind::Found,
            ReportKind::Found => ReportKind::Lost,
        }
    }

    /// Status a freshly submitted report starts in.
    pub fn initial_status(&self) -> ReportStatus {
        match self {
            ReportKind::Lost => ReportStatus::Open,
            ReportKind::Found => ReportStatus::Unclaimed,
        }
    }
}

/// Lifecycle status of a report.
///
/// Lost reports go `open -> resolved`; found reports go `unclaimed -> claimed`,
/// where `claimed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Open,
    Resolved,
    Unclaimed,
    Claimed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Unclaimed => "unclaimed",
            ReportStatus::Claimed => "claimed",
        }
    }
}

/// A lost or found item report.
///
/// Immutable after submission except for `status` and the claim bookkeeping
/// fields written when a found item is claimed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Store-assigned identifier
    #[serde(default)]
    pub id: String,
    /// User who filed the report
    pub reporter_id: String,
    /// Item category (exact-match compared)
    pub category: String,
    /// Short item name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Where the item was lost or found
    pub location: String,
    /// When the item was lost or found, as submitted (RFC 3339 or a plain date)
    #[serde(default, alias = "time", skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<String>,
    /// Carries identity or financial risk (IDs, cards, documents)
    #[serde(default, alias = "sensitiveItem")]
    pub sensitive: bool,
    #[serde(default)]
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    /// Server-assigned write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Report {
    /// Create a report with the required fields.
    pub fn new(
        reporter_id: impl Into<String>,
        category: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            reporter_id: reporter_id.into(),
            category: category.into(),
            name: name.into(),
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: impl Into<String>) -> Self {
        self.occurred_at = Some(occurred_at.into());
        self
    }

    /// Mark the item as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn is_claimed(&self) -> bool {
        self.status == ReportStatus::Claimed
    }

    /// Names of required fields that are missing or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.reporter_id.trim().is_empty() {
            missing.push("reporterId");
        }
        if self.category.trim().is_empty() {
            missing.push("category");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.location.trim().is_empty() {
            missing.push("location");
        }
        missing
    }
}

/// Key of an identity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKey {
    Color,
    Brand,
    Damage,
    Accessory,
    AccessoryColor,
}

impl SignalKey {
    pub const ALL: [SignalKey; 5] = [
        SignalKey::Color,
        SignalKey::Brand,
        SignalKey::Damage,
        SignalKey::Accessory,
        SignalKey::AccessoryColor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKey::Color => "color",
            SignalKey::Brand => "brand",
            SignalKey::Damage => "damage",
            SignalKey::Accessory => "accessory",
            SignalKey::AccessoryColor => "accessoryColor",
        }
    }

    /// Public signals are safe to reveal; the rest are only used as challenge answers.
    pub fn is_public(&self) -> bool {
        matches!(self, SignalKey::Color | SignalKey::Brand)
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized signal key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown signal key: {0}")]
pub struct UnknownSignalKey(pub String);

impl FromStr for SignalKey {
    type Err = UnknownSignalKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownSignalKey(s.to_string()))
    }
}

/// Normalized identity attributes of an item.
///
/// Derived on demand from a report; never stored as authoritative truth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSet {
    pub color: Option<String>,
    pub brand: Option<String>,
    pub damage: Option<String>,
    pub accessory: Option<String>,
    pub accessory_color: Option<String>,
}

impl SignalSet {
    /// Value of a signal, if known.
    pub fn get(&self, key: SignalKey) -> Option<&str> {
        match key {
            SignalKey::Color => self.color.as_deref(),
            SignalKey::Brand => self.brand.as_deref(),
            SignalKey::Damage => self.damage.as_deref(),
            SignalKey::Accessory => self.accessory.as_deref(),
            SignalKey::AccessoryColor => self.accessory_color.as_deref(),
        }
    }

    /// Keys with a non-null value, in declaration order.
    pub fn present_keys(&self) -> Vec<SignalKey> {
        SignalKey::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_some())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present_keys().is_empty()
    }
}

/// Review status of a candidate match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Pending,
}

/// A persisted pairing of one lost and one found report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    #[serde(default)]
    pub id: String,
    pub lost_item_id: String,
    pub found_item_id: String,
    pub lost_user_id: String,
    pub found_user_id: String,
    /// Relevance score (not clamped)
    pub score: u32,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub status: MatchStatus,
    #[serde(default)]
    pub notified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A verification question generated for one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationQuestion {
    pub id: SignalKey,
    pub question: String,
}

/// Outcome of an ownership verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    UnderReview,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::UnderReview => "under_review",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record of one verification submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimAttempt {
    #[serde(default)]
    pub id: String,
    pub found_item_id: String,
    pub user_id: String,
    pub answers: BTreeMap<SignalKey, String>,
    /// Submitted answers whose key is not a signal key; kept but never graded
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unrecognized_answers: BTreeMap<String, String>,
    pub confidence: f64,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Record of an approved claim. At most one exists per found item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    #[serde(default)]
    pub id: String,
    pub found_item_id: String,
    pub claimant_id: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Contact identity of a reporting user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
