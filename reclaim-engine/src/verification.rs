//! VerificationEngine - ownership checks for found items.
//!
//! A claim session moves `awaiting_questions -> awaiting_answers -> decided`.
//! Every submission is gated on the item existing and not being claimed,
//! graded against signals recomputed from the stored report, audited as a
//! [`ClaimAttempt`], and handed to the [`ClaimFinalizer`] when approved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use reclaim_agent::QuestionGenerator;
use reclaim_core::{
    evaluate, extract_signals, tally_questions, ClaimAttempt, Containment, Decision,
    DecisionPolicy, Report, SignalKey, VerificationQuestion, Verdict,
};

use crate::claims::ClaimFinalizer;
use crate::config::VerificationConfig;
use crate::error::{ReclaimError, Result};
use crate::store::{names, patch, Collections, OrderBy, Query};

/// Phase of a claim session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    AwaitingQuestions,
    AwaitingAnswers,
    Decided,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::AwaitingQuestions => "awaiting_questions",
            SessionPhase::AwaitingAnswers => "awaiting_answers",
            SessionPhase::Decided => "decided",
        }
    }

    /// Move to `next`, refusing anything but the single forward step.
    pub fn advance(self, next: SessionPhase) -> Result<SessionPhase> {
        match (self, next) {
            (SessionPhase::AwaitingQuestions, SessionPhase::AwaitingAnswers)
            | (SessionPhase::AwaitingAnswers, SessionPhase::Decided) => Ok(next),
            _ => Err(ReclaimError::Conflict(format!(
                "Claim session cannot move from {} to {}",
                self.as_str(),
                next.as_str()
            ))),
        }
    }
}

/// Questions issued for one verification of a found item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSession {
    #[serde(default)]
    pub id: String,
    pub found_item_id: String,
    #[serde(default)]
    pub questions: Vec<VerificationQuestion>,
    #[serde(default)]
    pub phase: SessionPhase,
    /// Claimant who answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Decision returned to a claimant. Never says which answer missed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub decision: Decision,
    pub confidence: f64,
}

/// Answers split into gradeable signal answers and everything else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAnswers {
    pub graded: BTreeMap<SignalKey, String>,
    pub unrecognized: BTreeMap<String, String>,
}

/// Split a raw answer map by whether each key names a signal.
pub fn split_answers(raw: &BTreeMap<String, String>) -> ParsedAnswers {
    let mut parsed = ParsedAnswers::default();
    for (key, answer) in raw {
        match SignalKey::from_str(key.trim()) {
            Ok(signal) => {
                parsed.graded.insert(signal, answer.clone());
            }
            Err(e) => {
                debug!(error = %e, "Answer for unknown question is not graded");
                parsed.unrecognized.insert(key.clone(), answer.clone());
            }
        }
    }
    parsed
}

/// Gradeable answers of a raw answer map.
pub fn parse_answers(raw: &BTreeMap<String, String>) -> BTreeMap<SignalKey, String> {
    split_answers(raw).graded
}

/// Grades claimant answers and drives claim sessions.
pub struct VerificationEngine {
    collections: Collections,
    generator: Arc<QuestionGenerator>,
    finalizer: ClaimFinalizer,
    config: VerificationConfig,
}

impl VerificationEngine {
    pub fn new(
        collections: Collections,
        generator: Arc<QuestionGenerator>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            finalizer: ClaimFinalizer::new(collections.clone()),
            collections,
            generator,
            config,
        }
    }

    pub fn finalizer(&self) -> &ClaimFinalizer {
        &self.finalizer
    }

    /// Load a found item that can still be claimed.
    async fn load_claimable(&self, found_item_id: &str) -> Result<Report> {
        if found_item_id.trim().is_empty() {
            return Err(ReclaimError::Validation("foundItemId is required".to_string()));
        }

        let found = self
            .collections
            .found_items
            .get(found_item_id)
            .await?
            .ok_or_else(|| ReclaimError::not_found(names::FOUND_ITEMS, found_item_id))?;

        if found.is_claimed() {
            return Err(ReclaimError::Conflict("Item already claimed".to_string()));
        }

        Ok(found)
    }

    /// Generate questions for a found item and open a claim session.
    pub async fn request_questions(&self, found_item_id: &str) -> Result<ClaimSession> {
        let found = self.load_claimable(found_item_id).await?;
        let signals = extract_signals(&found);

        let questions = self.generator.generate(&signals).await?;

        let session = ClaimSession {
            id: String::new(),
            found_item_id: found.id.clone(),
            questions,
            phase: SessionPhase::AwaitingQuestions.advance(SessionPhase::AwaitingAnswers)?,
            user_id: None,
            decision: None,
            created_at: None,
        };
        let session = self.collections.claim_sessions.insert(&session).await?;

        info!(
            found_item_id = %found.id,
            session_id = %session.id,
            questions = session.questions.len(),
            "Opened claim session"
        );
        Ok(session)
    }

    /// Grade a claimant's answers and claim the item on approval.
    pub async fn submit_answers(
        &self,
        found_item_id: &str,
        user_id: &str,
        answers: &BTreeMap<String, String>,
    ) -> Result<VerificationResult> {
        if user_id.trim().is_empty() {
            return Err(ReclaimError::Validation("userId is required".to_string()));
        }
        let found = self.load_claimable(found_item_id).await?;

        let signals = extract_signals(&found);
        let answers = split_answers(answers);
        let verdict = evaluate(
            &signals,
            &answers.graded,
            found.sensitive,
            &self.config.policy,
            self.config.containment,
        );

        info!(
            found_item_id = %found.id,
            user_id,
            confidence = verdict.confidence,
            decision = %verdict.decision,
            "Graded ownership answers"
        );

        self.record_attempt(&found.id, user_id, answers, verdict.confidence, verdict.decision)
            .await?;
        self.close_session(&found.id, user_id, verdict.decision).await;

        if verdict.decision == Decision::Approved {
            self.finalizer
                .finalize(&found, user_id, verdict.confidence)
                .await?;
        }

        Ok(VerificationResult {
            decision: verdict.decision,
            confidence: verdict.confidence,
        })
    }

    /// Grade a free-form question list.
    ///
    /// All scored questions must match, with at least the policy minimum
    /// scored, and either value may contain the other. A claimed item is
    /// refused before grading. Nothing is written.
    pub async fn grade_free_form(
        &self,
        found_item_id: &str,
        questions: &[VerificationQuestion],
        answers: &BTreeMap<String, String>,
    ) -> Result<Verdict> {
        let found = self.load_claimable(found_item_id).await?;

        let signals = extract_signals(&found);
        let tally = tally_questions(&signals, questions, &parse_answers(answers), Containment::Either);
        Ok(Verdict::from_tally(
            tally,
            &DecisionPolicy::exact_count(),
            found.sensitive,
        ))
    }

    /// Close a claimant's pending review by operator decision.
    pub async fn resolve_review(
        &self,
        found_item_id: &str,
        claimant_id: &str,
        approve: bool,
    ) -> Result<VerificationResult> {
        let found = self.load_claimable(found_item_id).await?;

        let pending = self
            .collections
            .claim_attempts
            .query(
                &Query::all()
                    .eq("foundItemId", found.id.as_str())
                    .eq("userId", claimant_id)
                    .order_by(OrderBy::newest_first()),
            )
            .await?
            .into_iter()
            .next()
            .filter(|attempt| attempt.decision == Decision::UnderReview)
            .ok_or_else(|| ReclaimError::not_found(names::CLAIM_ATTEMPTS, claimant_id))?;

        let decision = if approve {
            Decision::Approved
        } else {
            Decision::Rejected
        };

        let answers = ParsedAnswers {
            graded: pending.answers,
            unrecognized: pending.unrecognized_answers,
        };
        self.record_attempt(&found.id, claimant_id, answers, pending.confidence, decision)
            .await?;

        if decision == Decision::Approved {
            self.finalizer
                .finalize(&found, claimant_id, pending.confidence)
                .await?;
        }

        info!(found_item_id = %found.id, claimant_id, decision = %decision, "Review resolved");
        Ok(VerificationResult {
            decision,
            confidence: pending.confidence,
        })
    }

    async fn record_attempt(
        &self,
        found_item_id: &str,
        user_id: &str,
        answers: ParsedAnswers,
        confidence: f64,
        decision: Decision,
    ) -> Result<ClaimAttempt> {
        let attempt = ClaimAttempt {
            id: String::new(),
            found_item_id: found_item_id.to_string(),
            user_id: user_id.to_string(),
            answers: answers.graded,
            unrecognized_answers: answers.unrecognized,
            confidence,
            decision,
            created_at: None,
        };
        Ok(self.collections.claim_attempts.insert(&attempt).await?)
    }

    /// Mark the newest open session for the item decided. Best effort.
    async fn close_session(&self, found_item_id: &str, user_id: &str, decision: Decision) {
        let open = self
            .collections
            .claim_sessions
            .query(
                &Query::all()
                    .eq("foundItemId", found_item_id)
                    .eq("phase", SessionPhase::AwaitingAnswers.as_str())
                    .order_by(OrderBy::newest_first()),
            )
            .await;

        let session = match open {
            Ok(sessions) => match sessions.into_iter().next() {
                Some(session) => session,
                None => return,
            },
            Err(e) => {
                warn!(found_item_id, error = %e, "Failed to load claim session");
                return;
            }
        };

        let phase = match session.phase.advance(SessionPhase::Decided) {
            Ok(phase) => phase,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Claim session not closable");
                return;
            }
        };

        let update = self
            .collections
            .claim_sessions
            .update(
                &session.id,
                patch([
                    ("phase", json!(phase.as_str())),
                    ("userId", json!(user_id)),
                    ("decision", json!(decision.as_str())),
                ]),
            )
            .await;

        if let Err(e) = update {
            warn!(session_id = %session.id, error = %e, "Failed to close claim session");
        }
    }
}
