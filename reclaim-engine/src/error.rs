//! Error taxonomy for the Reclaim service.

use reclaim_agent::QuestionError;

use crate::store::StoreError;

/// Errors surfaced by service operations.
#[derive(Debug, thiserror::Error)]
pub enum ReclaimError {
    /// Missing or malformed request fields
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Referenced record does not exist
    #[error("{collection} record not found: {id}")]
    NotFound { collection: &'static str, id: String },

    /// Operation not allowed in the record's current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Every text-generation model is out of quota
    #[error("Text generation quota exhausted: {0}")]
    UpstreamQuota(String),

    /// An outbound collaborator failed
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Document store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReclaimError {
    pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        ReclaimError::NotFound {
            collection,
            id: id.into(),
        }
    }

    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ReclaimError::Validation(_) => 400,
            ReclaimError::NotFound { .. } => 404,
            ReclaimError::Conflict(_) => 409,
            ReclaimError::UpstreamQuota(_) => 429,
            ReclaimError::Upstream(_) => 502,
            ReclaimError::Store(_) | ReclaimError::Config(_) => 500,
        }
    }

    /// Text safe to show the end user.
    ///
    /// Validation, not-found and conflict messages carry no signal values and
    /// are passed through; everything else is replaced by generic wording.
    pub fn public_message(&self) -> String {
        match self {
            ReclaimError::Validation(_) | ReclaimError::Conflict(_) => self.to_string(),
            ReclaimError::NotFound { .. } => "Item not found".to_string(),
            ReclaimError::UpstreamQuota(_) => {
                "AI quota exceeded. Please try again later.".to_string()
            }
            ReclaimError::Upstream(_) => "A dependent service failed. Please retry.".to_string(),
            ReclaimError::Store(_) | ReclaimError::Config(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl From<QuestionError> for ReclaimError {
    fn from(error: QuestionError) -> Self {
        match error {
            QuestionError::QuotaExhausted { .. } => ReclaimError::UpstreamQuota(error.to_string()),
            other => ReclaimError::Upstream(other.to_string()),
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ReclaimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ReclaimError::Validation("x".into()).status_code(), 400);
        assert_eq!(ReclaimError::not_found("foundItems", "f1").status_code(), 404);
        assert_eq!(ReclaimError::Conflict("claimed".into()).status_code(), 409);
        assert_eq!(ReclaimError::UpstreamQuota("x".into()).status_code(), 429);
        assert_eq!(ReclaimError::Upstream("x".into()).status_code(), 502);
        assert_eq!(ReclaimError::Store(StoreError::Unavailable).status_code(), 500);
    }

    #[test]
    fn test_question_errors_map_by_kind() {
        let quota: ReclaimError = QuestionError::QuotaExhausted { tried: vec!["m".into()] }.into();
        assert!(matches!(quota, ReclaimError::UpstreamQuota(_)));
        assert!(quota.public_message().contains("try again later"));

        let invalid: ReclaimError = QuestionError::InvalidResponse("bad".into()).into();
        assert!(matches!(invalid, ReclaimError::Upstream(_)));
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err = ReclaimError::Store(StoreError::Backend("connection refused at 10.0.0.4".into()));
        assert_eq!(err.public_message(), "Internal server error");
    }
}
