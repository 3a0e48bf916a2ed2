//! Reclaim Engine - Lost & Found Service
//!
//! Orchestrates the pure matching and verification logic of `reclaim-core`
//! against a document store and the outbound collaborators.
//!
//! ```text
//! report submitted
//!       │
//!       ▼
//! ┌─────────────┐     ┌──────────────────┐
//! │ MatchEngine │────▶│ NotificationGate │──▶ owner email
//! └─────────────┘     └──────────────────┘
//!
//! claimant verifies
//!       │
//!       ▼
//! ┌────────────────────┐     ┌────────────────┐
//! │ VerificationEngine │────▶│ ClaimFinalizer │──▶ item claimed
//! └────────────────────┘     └────────────────┘
//!       │
//!       └── QuestionGenerator (reclaim-agent)
//! ```
//!
//! # Key Components
//!
//! - [`ReclaimService`]: Caller-facing operations
//! - [`store::DocumentStore`]: Storage abstraction with in-memory and MongoDB stores
//! - [`MatchEngine`]: Scores a report against the opposing pool
//! - [`NotificationGate`]: Notifies the probable owner of a strong match
//! - [`VerificationEngine`]: Grades ownership answers and drives claim sessions
//! - [`ClaimFinalizer`]: Compare-and-set claim transition

pub mod chat;
pub mod claims;
pub mod cli;
pub mod config;
pub mod error;
pub mod matching;
pub mod notify;
pub mod service;
pub mod store;
pub mod verification;

// Re-export main types
pub use chat::{ChatProvisioner, HandoverChannel, HttpChatProvisioner, RecordingChat};
pub use claims::ClaimFinalizer;
pub use config::{NotifyStrategy, ReclaimConfig};
pub use error::{ReclaimError, Result};
pub use matching::{CreatedMatch, MatchEngine};
pub use notify::{NotificationGate, NotificationOutcome, Notifier, RecordingNotifier, WebhookNotifier};
pub use service::{ReclaimService, Submission, UserReports};
pub use store::{Collections, DocumentStore, MemoryStore};
pub use verification::{ClaimSession, SessionPhase, VerificationEngine, VerificationResult};
