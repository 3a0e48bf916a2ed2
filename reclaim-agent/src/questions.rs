//! QuestionGenerator - verification questions from a signal set.
//!
//! Backends are tried in order. A rate-limit/quota failure or a timeout moves
//! on to the next model; any other failure stops immediately.

use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use reclaim_core::{SignalKey, SignalSet, VerificationQuestion};

use crate::backend::traits::{CompletionRequest, LlmBackend, LlmError};

/// Error types for question generation.
#[derive(Debug, thiserror::Error)]
pub enum QuestionError {
    /// Every configured model is rate limited or out of quota
    #[error("All text-generation models are rate-limited: {tried:?}")]
    QuotaExhausted { tried: Vec<String> },

    /// A model failed with a non-quota error
    #[error("Text generation failed on {model}: {source}")]
    Upstream {
        model: String,
        #[source]
        source: LlmError,
    },

    /// The model answered but the question list is unusable
    #[error("Invalid question list: {0}")]
    InvalidResponse(String),

    /// No backend configured
    #[error("No text-generation backend configured")]
    NoBackends,

    /// Nothing to ask about
    #[error("Signal set is empty")]
    NoSignals,
}

/// Bounds on the size of a generated question list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionLimits {
    pub min: usize,
    pub max: usize,
}

impl Default for QuestionLimits {
    fn default() -> Self {
        Self { min: 2, max: 5 }
    }
}

/// Question as returned by the model, before validation.
#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: String,
    question: String,
}

/// Generates verification questions with ordered model fallback.
pub struct QuestionGenerator {
    /// Backends in fallback order
    backends: Vec<Arc<dyn LlmBackend>>,
    limits: QuestionLimits,
    /// Per-call deadline
    timeout: Duration,
}

impl QuestionGenerator {
    /// Create a generator over backends in fallback order.
    pub fn new(backends: Vec<Arc<dyn LlmBackend>>) -> Self {
        Self {
            backends,
            limits: QuestionLimits::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_limits(mut self, limits: QuestionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generate between `limits.min` and `limits.max` questions whose ids are
    /// keys with a known value in `signals`.
    pub async fn generate(
        &self,
        signals: &SignalSet,
    ) -> Result<Vec<VerificationQuestion>, QuestionError> {
        if signals.is_empty() {
            return Err(QuestionError::NoSignals);
        }

        let request = CompletionRequest::user(build_prompt(signals, self.limits))
            .with_system("You write ownership verification questions for a campus lost-and-found desk.")
            .with_max_tokens(1024)
            .with_temperature(0.4);

        let raw = self.complete_with_fallback(request).await?;
        let questions = parse_questions(&raw, signals, self.limits)?;

        info!(count = questions.len(), "Generated verification questions");
        Ok(questions)
    }

    async fn complete_with_fallback(&self, request: CompletionRequest) -> Result<String, QuestionError> {
        if self.backends.is_empty() {
            return Err(QuestionError::NoBackends);
        }

        let mut tried = Vec::new();
        let mut last_timeout = None;

        for backend in &self.backends {
            let model = backend.id().to_string();
            debug!(model = %model, "Requesting questions");

            let outcome = match tokio::time::timeout(self.timeout, backend.complete(request.clone())).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.timeout.as_millis() as u64)),
            };

            match outcome {
                Ok(response) if response.content.trim().is_empty() => {
                    return Err(QuestionError::Upstream {
                        model,
                        source: LlmError::ParseError("Empty response".to_string()),
                    });
                }
                Ok(response) => {
                    debug!(model = %model, tokens = response.usage.total(), "Model answered");
                    return Ok(response.content);
                }
                Err(e) if e.is_quota_exhausted() => {
                    warn!(model = %model, error = %e, "Model rate limited, switching model");
                    tried.push(model);
                }
                Err(e @ LlmError::Timeout(_)) => {
                    warn!(model = %model, error = %e, "Model timed out, switching model");
                    tried.push(model.clone());
                    last_timeout = Some((model, e));
                }
                Err(e) => return Err(QuestionError::Upstream { model, source: e }),
            }
        }

        match last_timeout {
            Some((model, source)) => Err(QuestionError::Upstream { model, source }),
            None => Err(QuestionError::QuotaExhausted { tried }),
        }
    }
}

fn build_prompt(signals: &SignalSet, limits: QuestionLimits) -> String {
    let allowed: Vec<&str> = signals.present_keys().iter().map(SignalKey::as_str).collect();
    let signals_json = serde_json::to_string_pretty(signals).unwrap_or_default();

    format!(
        "You are generating ownership verification questions for a lost-and-found system.\n\
         \n\
         Rules:\n\
         - Ask only questions that help verify true ownership\n\
         - Ask minimum {min} and maximum {max} questions\n\
         - Questions must be specific and short\n\
         - Do NOT reveal answers\n\
         - Do NOT mention the signals directly\n\
         - Use ONLY the provided signals\n\
         - Each question id must be one of: {allowed}\n\
         \n\
         Signals:\n\
         {signals_json}\n\
         \n\
         Return STRICT JSON ONLY in this format:\n\
         [\n  {{ \"id\": \"color\", \"question\": \"...\" }}\n]\n",
        min = limits.min,
        max = limits.max,
        allowed = allowed.join(", "),
        signals_json = signals_json,
    )
}

/// Strip markdown code-fence wrapping from model output.
fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse and validate a model's question list.
///
/// Questions for unknown or null signals and repeated ids are dropped, the
/// list is cut to `limits.max`, and fewer than `limits.min` survivors is an error.
pub fn parse_questions(
    raw: &str,
    signals: &SignalSet,
    limits: QuestionLimits,
) -> Result<Vec<VerificationQuestion>, QuestionError> {
    let parsed: Vec<RawQuestion> = serde_json::from_str(&strip_code_fences(raw))
        .map_err(|e| QuestionError::InvalidResponse(format!("not a JSON question array: {}", e)))?;

    let mut seen = HashSet::new();
    let questions: Vec<VerificationQuestion> = parsed
        .into_iter()
        .filter_map(|q| {
            let id = SignalKey::from_str(q.id.trim()).ok()?;
            let question = q.question.trim().to_string();
            (signals.get(id).is_some() && !question.is_empty() && seen.insert(id))
                .then_some(VerificationQuestion { id, question })
        })
        .take(limits.max)
        .collect();

    if questions.len() < limits.min {
        return Err(QuestionError::InvalidResponse(format!(
            "expected at least {} usable questions, got {}",
            limits.min,
            questions.len()
        )));
    }

    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, Scripted};

    fn wallet_signals() -> SignalSet {
        SignalSet {
            color: Some("black".into()),
            damage: Some("scratched".into()),
            accessory_color: Some("black".into()),
            ..Default::default()
        }
    }

    const GOOD: &str = r#"```json
[
  {"id": "color", "question": "What color is the wallet?"},
  {"id": "damage", "question": "Does it have any visible wear?"},
  {"id": "accessoryColor", "question": "What color is the strap?"}
]
```"#;

    #[test]
    fn test_parse_strips_fences() {
        let questions = parse_questions(GOOD, &wallet_signals(), QuestionLimits::default()).unwrap();
        let ids: Vec<SignalKey> = questions.iter().map(|q| q.id).collect();
        assert_eq!(
            ids,
            vec![SignalKey::Color, SignalKey::Damage, SignalKey::AccessoryColor]
        );
    }

    #[test]
    fn test_parse_drops_foreign_and_duplicate_ids() {
        let raw = r#"[
            {"id": "brand", "question": "Which brand?"},
            {"id": "serial", "question": "Serial number?"},
            {"id": "color", "question": "Color?"},
            {"id": "color", "question": "Color again?"},
            {"id": "damage", "question": "Any damage?"}
        ]"#;
        let questions = parse_questions(raw, &wallet_signals(), QuestionLimits::default()).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question, "Color?");
    }

    #[test]
    fn test_parse_enforces_bounds() {
        let limits = QuestionLimits { min: 2, max: 2 };
        let questions = parse_questions(GOOD, &wallet_signals(), limits).unwrap();
        assert_eq!(questions.len(), 2);

        let one = r#"[{"id": "color", "question": "Color?"}]"#;
        assert!(matches!(
            parse_questions(one, &wallet_signals(), QuestionLimits::default()),
            Err(QuestionError::InvalidResponse(_))
        ));

        assert!(matches!(
            parse_questions("Sure! Here are some questions", &wallet_signals(), QuestionLimits::default()),
            Err(QuestionError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_falls_back_on_quota() {
        let primary = Arc::new(MockBackend::new("gemini-2.5-flash").then(Scripted::RateLimited));
        let secondary = Arc::new(MockBackend::new("gemini-2.0-flash").with_response(GOOD));
        let generator = QuestionGenerator::new(vec![primary.clone(), secondary.clone()]);

        let questions = generator.generate(&wallet_signals()).await.unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_on_timeout() {
        let primary = Arc::new(
            MockBackend::new("gemini-2.5-flash")
                .with_response(GOOD)
                .then(Scripted::Stall(Duration::from_secs(5))),
        );
        let secondary = Arc::new(MockBackend::new("gemini-2.0-flash").with_response(GOOD));
        let generator = QuestionGenerator::new(vec![primary.clone(), secondary.clone()])
            .with_timeout(Duration::from_millis(20));

        let questions = generator.generate(&wallet_signals()).await.unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_every_model_timing_out_is_upstream_failure() {
        let generator = QuestionGenerator::new(vec![Arc::new(
            MockBackend::new("slow").then(Scripted::Stall(Duration::from_secs(5))),
        )])
        .with_timeout(Duration::from_millis(20));

        let err = generator.generate(&wallet_signals()).await.unwrap_err();
        assert!(matches!(
            err,
            QuestionError::Upstream { ref model, source: LlmError::Timeout(20) } if model == "slow"
        ));
    }

    #[tokio::test]
    async fn test_all_models_rate_limited() {
        let generator = QuestionGenerator::new(vec![
            Arc::new(MockBackend::rate_limited("gemini-2.5-flash")),
            Arc::new(MockBackend::rate_limited("gemini-2.0-flash")),
        ]);

        let err = generator.generate(&wallet_signals()).await.unwrap_err();
        match err {
            QuestionError::QuotaExhausted { tried } => {
                assert_eq!(tried, vec!["gemini-2.5-flash", "gemini-2.0-flash"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_errors_do_not_fall_back() {
        let primary = Arc::new(
            MockBackend::new("primary").then(Scripted::Failure("HTTP 500: boom".into())),
        );
        let secondary = Arc::new(MockBackend::new("secondary").with_response(GOOD));
        let generator = QuestionGenerator::new(vec![primary, secondary.clone()]);

        let err = generator.generate(&wallet_signals()).await.unwrap_err();
        assert!(matches!(err, QuestionError::Upstream { ref model, .. } if model == "primary"));
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_response_is_upstream_failure() {
        let generator = QuestionGenerator::new(vec![Arc::new(MockBackend::new("m").with_response("  "))]);
        let err = generator.generate(&wallet_signals()).await.unwrap_err();
        assert!(matches!(err, QuestionError::Upstream { .. }));
    }

    #[tokio::test]
    async fn test_empty_signals_skip_generation() {
        let backend = Arc::new(MockBackend::new("m").with_response(GOOD));
        let generator = QuestionGenerator::new(vec![backend.clone()]);
        let err = generator.generate(&SignalSet::default()).await.unwrap_err();
        assert!(matches!(err, QuestionError::NoSignals));
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_prompt_lists_only_known_keys() {
        let prompt = build_prompt(&wallet_signals(), QuestionLimits::default());
        assert!(prompt.contains("one of: color, damage, accessoryColor"));
        assert!(prompt.contains("minimum 2 and maximum 5"));
    }
}
