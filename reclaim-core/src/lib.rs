//! Reclaim Core - Lost & Found Matching and Ownership Decisions
//!
//! Pure, I/O-free domain logic shared by the rest of the workspace:
//!
//! - **Signals**: comparable identity attributes derived from a found-item report
//! - **Scoring**: relevance score and reasons for a (lost, found) report pair
//! - **Verification**: answer normalization, fuzzy comparison and decision policies
//!
//! # Key Components
//!
//! - [`extract_signals`]: Derives a [`SignalSet`] from a report's description and fields
//! - [`score_pair`]: Scores a lost/found pair for candidate matching
//! - [`evaluate`]: Turns claimant answers into a [`Verdict`] under a [`DecisionPolicy`]
//!
//! # Example
//!
//! ```ignore
//! use reclaim_core::{extract_signals, evaluate, Containment, DecisionPolicy, Report};
//!
//! let found = Report::new("finder-1", "wallet", "Wallet", "Library")
//!     .with_color("black")
//!     .with_description("scratched black leather wallet");
//!
//! let signals = extract_signals(&found);
//! let verdict = evaluate(&signals, &answers, found.sensitive, &DecisionPolicy::default(), Containment::default());
//! ```

pub mod scoring;
pub mod signals;
pub mod types;
pub mod verify;

// Re-export main types
pub use scoring::{score_pair, text_similarity, MatchScore};
pub use signals::extract_signals;
pub use types::*;
pub use verify::{
    evaluate, normalize, tally_answers, tally_questions, Containment, DecisionPolicy, Tally,
    Verdict,
};
