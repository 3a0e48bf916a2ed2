//! Reclaim Agent - Verification Question Generation
//!
//! Turns a signal set into a short list of ownership-verification questions
//! using a text-generation service:
//!
//! - Trait-based LLM backends (OpenAI-compatible HTTP, mock)
//! - Ordered model fallback on rate-limit / quota errors
//! - Strict parsing and validation of the returned question list
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          QuestionGenerator              │
//! │  (prompt, fallback, parse, validate)    │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ LlmBackend  │  ──▶  │ LlmBackend  │
//! │ (primary)   │ quota │ (fallback)  │
//! └─────────────┘       └─────────────┘
//! ```

pub mod backend;
pub mod questions;

// Re-export main types for convenience
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use questions::{QuestionError, QuestionGenerator, QuestionLimits};
