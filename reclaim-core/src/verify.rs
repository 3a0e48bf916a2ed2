//! Ownership decisions from short free-text answers.
//!
//! Answers and expected signal values are normalized (lower-cased, everything
//! outside `[a-z0-9]` dropped) and compared by substring containment. The
//! resulting tally is turned into a [`Decision`] by a [`DecisionPolicy`].
//!
//! Two policies exist because two grading situations exist:
//!
//! - [`DecisionPolicy::Threshold`] grades a fixed signal map by confidence ratio,
//!   with a stricter bar for sensitive items.
//! - [`DecisionPolicy::ExactCount`] grades an arbitrary question list: every
//!   scored question must match and enough of them must be scored.
//!
//! Each entry point picks one policy explicitly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Decision, SignalKey, SignalSet, VerificationQuestion};

/// Lower-case and strip every character outside `[a-z0-9]`.
///
/// Idempotent.
pub fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Direction of the substring check between normalized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    /// The answer must contain the expected value.
    #[default]
    AnswerContainsExpected,
    /// Either value may contain the other.
    Either,
}

impl Containment {
    /// Compare normalized values. An empty answer never matches.
    pub fn matches(&self, expected: &str, answer: &str) -> bool {
        if answer.is_empty() {
            return false;
        }
        match self {
            Containment::AnswerContainsExpected => answer.contains(expected),
            Containment::Either => answer.contains(expected) || expected.contains(answer),
        }
    }
}

/// Count of scored and matched questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub matched: u32,
    pub total: u32,
}

impl Tally {
    fn record(&mut self, matched: bool) {
        self.total += 1;
        if matched {
            self.matched += 1;
        }
    }

    /// `matched / total`, or 0 when nothing could be scored.
    pub fn confidence(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}

/// How a tally becomes a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// Confidence-ratio thresholds, stricter for sensitive items.
    Threshold {
        /// Sensitive items at or above this are approved
        sensitive_high: f64,
        /// Sensitive items at or above this (and below `sensitive_high`) go to review
        sensitive_mid: f64,
        /// Non-sensitive items at or above this are approved
        open_threshold: f64,
    },
    /// All scored questions must match, and at least `min_questions` must be scored.
    ExactCount { min_questions: u32 },
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        DecisionPolicy::Threshold {
            sensitive_high: 0.85,
            sensitive_mid: 0.60,
            open_threshold: 0.60,
        }
    }
}

impl DecisionPolicy {
    /// Default free-form grading policy.
    pub fn exact_count() -> Self {
        DecisionPolicy::ExactCount { min_questions: 2 }
    }

    /// Decide a tally. `sensitive` only affects the threshold policy.
    pub fn decide(&self, tally: &Tally, sensitive: bool) -> Decision {
        match *self {
            DecisionPolicy::Threshold {
                sensitive_high,
                sensitive_mid,
                open_threshold,
            } => {
                let confidence = tally.confidence();
                if sensitive {
                    if confidence >= sensitive_high {
                        Decision::Approved
                    } else if confidence >= sensitive_mid {
                        Decision::UnderReview
                    } else {
                        Decision::Rejected
                    }
                } else if confidence >= open_threshold {
                    Decision::Approved
                } else {
                    Decision::Rejected
                }
            }
            DecisionPolicy::ExactCount { min_questions } => {
                if tally.total >= min_questions && tally.matched == tally.total {
                    Decision::Approved
                } else if tally.matched >= 1 {
                    Decision::UnderReview
                } else {
                    Decision::Rejected
                }
            }
        }
    }
}

/// Tally a submitted answer map against a signal set.
///
/// A key counts when the signal is known and an answer was submitted for it,
/// even if the answer is blank. Unknown or unscoreable signals are never scored.
pub fn tally_answers(
    signals: &SignalSet,
    answers: &BTreeMap<SignalKey, String>,
    containment: Containment,
) -> Tally {
    let mut tally = Tally::default();
    for (key, answer) in answers {
        if let Some(expected) = scoreable(signals, *key) {
            tally.record(containment.matches(&expected, &normalize(answer)));
        }
    }
    tally
}

/// Normalized expected value of `key`, if it has anything left to compare.
///
/// A signal that normalizes to nothing (non-ASCII text, punctuation only) is
/// unscoreable and treated like a missing one.
fn scoreable(signals: &SignalSet, key: SignalKey) -> Option<String> {
    signals
        .get(key)
        .map(normalize)
        .filter(|expected| !expected.is_empty())
}

/// Tally an asked question list.
///
/// A question counts only when both an expected value and a non-blank answer exist.
pub fn tally_questions(
    signals: &SignalSet,
    questions: &[VerificationQuestion],
    answers: &BTreeMap<SignalKey, String>,
    containment: Containment,
) -> Tally {
    let mut tally = Tally::default();
    for question in questions {
        let expected = scoreable(signals, question.id);
        let answer = answers.get(&question.id).filter(|a| !a.trim().is_empty());
        if let (Some(expected), Some(answer)) = (expected, answer) {
            tally.record(containment.matches(&expected, &normalize(answer)));
        }
    }
    tally
}

/// Result of grading a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub tally: Tally,
    pub confidence: f64,
    pub decision: Decision,
}

impl Verdict {
    pub fn from_tally(tally: Tally, policy: &DecisionPolicy, sensitive: bool) -> Self {
        Self {
            tally,
            confidence: tally.confidence(),
            decision: policy.decide(&tally, sensitive),
        }
    }
}

/// Grade an answer map against a signal set.
pub fn evaluate(
    signals: &SignalSet,
    answers: &BTreeMap<SignalKey, String>,
    sensitive: bool,
    policy: &DecisionPolicy,
    containment: Containment,
) -> Verdict {
    let tally = tally_answers(signals, answers, containment);
    Verdict::from_tally(tally, policy, sensitive)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone_signals() -> SignalSet {
        SignalSet {
            color: Some("black".into()),
            brand: Some("apple".into()),
            ..Default::default()
        }
    }

    fn answers(pairs: &[(SignalKey, &str)]) -> BTreeMap<SignalKey, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Black!!"), "black");
        assert_eq!(normalize("  Back Cover (blue) "), "backcoverblue");
        assert_eq!(normalize("Über-Case 2"), "bercase2");
        for sample in ["Black!!", "A-b C", "", "ÉÈ 12"] {
            assert_eq!(normalize(&normalize(sample)), normalize(sample));
        }
    }

    #[test]
    fn test_full_match_approves_open_item() {
        let verdict = evaluate(
            &phone_signals(),
            &answers(&[(SignalKey::Color, "Black!!"), (SignalKey::Brand, "APPLE")]),
            false,
            &DecisionPolicy::default(),
            Containment::default(),
        );
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(verdict.decision, Decision::Approved);
    }

    #[test]
    fn test_half_match_rejected_both_ways() {
        let submitted = answers(&[(SignalKey::Color, "red"), (SignalKey::Brand, "apple")]);
        let policy = DecisionPolicy::default();

        let open = evaluate(&phone_signals(), &submitted, false, &policy, Containment::default());
        assert_eq!(open.confidence, 0.5);
        assert_eq!(open.decision, Decision::Rejected);

        let sensitive = evaluate(&phone_signals(), &submitted, true, &policy, Containment::default());
        assert_eq!(sensitive.decision, Decision::Rejected);
    }

    #[test]
    fn test_sensitive_review_band() {
        let policy = DecisionPolicy::default();
        let tally = Tally { matched: 2, total: 3 };
        assert_eq!(policy.decide(&tally, true), Decision::UnderReview);
        assert_eq!(policy.decide(&tally, false), Decision::Approved);

        let tally = Tally { matched: 3, total: 3 };
        assert_eq!(policy.decide(&tally, true), Decision::Approved);

        let tally = Tally { matched: 3, total: 5 };
        assert_eq!(policy.decide(&tally, true), Decision::UnderReview);
    }

    #[test]
    fn test_unknown_signals_are_not_scored() {
        let tally = tally_answers(
            &phone_signals(),
            &answers(&[(SignalKey::Damage, "cracked"), (SignalKey::Color, "black")]),
            Containment::default(),
        );
        assert_eq!(tally, Tally { matched: 1, total: 1 });
    }

    #[test]
    fn test_no_scorable_answers_gives_zero_confidence() {
        let verdict = evaluate(
            &phone_signals(),
            &BTreeMap::new(),
            false,
            &DecisionPolicy::default(),
            Containment::default(),
        );
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.decision, Decision::Rejected);
    }

    #[test]
    fn test_unscoreable_expected_values_are_skipped() {
        let signals = SignalSet {
            color: Some("黑色".into()),
            brand: Some("华为".into()),
            damage: Some("scratched".into()),
            ..Default::default()
        };

        let guessed = answers(&[(SignalKey::Color, "zzz"), (SignalKey::Brand, "q")]);
        let verdict = evaluate(&signals, &guessed, false, &DecisionPolicy::default(), Containment::default());
        assert_eq!(verdict.tally, Tally::default());
        assert_eq!(verdict.decision, Decision::Rejected);

        let questions: Vec<VerificationQuestion> = [SignalKey::Color, SignalKey::Damage]
            .into_iter()
            .map(|id| VerificationQuestion {
                id,
                question: "?".into(),
            })
            .collect();
        let tally = tally_questions(
            &signals,
            &questions,
            &answers(&[(SignalKey::Color, "zzz"), (SignalKey::Damage, "scratched")]),
            Containment::Either,
        );
        assert_eq!(tally, Tally { matched: 1, total: 1 });
    }

    #[test]
    fn test_containment_direction() {
        assert!(Containment::AnswerContainsExpected.matches("black", "jetblack"));
        assert!(!Containment::AnswerContainsExpected.matches("backcover", "cover"));
        assert!(Containment::Either.matches("backcover", "cover"));
        assert!(!Containment::Either.matches("backcover", ""));
        assert!(!Containment::AnswerContainsExpected.matches("", ""));
    }

    #[test]
    fn test_blank_answer_counts_against_threshold_policy() {
        let tally = tally_answers(
            &phone_signals(),
            &answers(&[(SignalKey::Color, "black"), (SignalKey::Brand, "  ")]),
            Containment::default(),
        );
        assert_eq!(tally, Tally { matched: 1, total: 2 });
    }

    #[test]
    fn test_exact_count_policy() {
        let signals = SignalSet {
            color: Some("black".into()),
            damage: Some("scratched".into()),
            accessory: Some("back cover".into()),
            ..Default::default()
        };
        let questions: Vec<VerificationQuestion> = [SignalKey::Color, SignalKey::Damage, SignalKey::Brand]
            .into_iter()
            .map(|id| VerificationQuestion {
                id,
                question: format!("What is the {}?", id),
            })
            .collect();
        let policy = DecisionPolicy::exact_count();

        let all = tally_questions(
            &signals,
            &questions,
            &answers(&[(SignalKey::Color, "black"), (SignalKey::Damage, "scratch marks scratched")]),
            Containment::Either,
        );
        assert_eq!(all, Tally { matched: 2, total: 2 });
        assert_eq!(policy.decide(&all, false), Decision::Approved);

        let partial = tally_questions(
            &signals,
            &questions,
            &answers(&[(SignalKey::Color, "black"), (SignalKey::Damage, "dented")]),
            Containment::Either,
        );
        assert_eq!(policy.decide(&partial, false), Decision::UnderReview);

        let single = tally_questions(
            &signals,
            &questions,
            &answers(&[(SignalKey::Color, "black"), (SignalKey::Damage, " ")]),
            Containment::Either,
        );
        assert_eq!(single, Tally { matched: 1, total: 1 });
        assert_eq!(policy.decide(&single, false), Decision::UnderReview);

        let none = tally_questions(
            &signals,
            &questions,
            &answers(&[(SignalKey::Color, "white")]),
            Containment::Either,
        );
        assert_eq!(policy.decide(&none, true), Decision::Rejected);
    }

    #[test]
    fn test_policy_yaml_shape() {
        let policy: DecisionPolicy = serde_yaml::from_str("kind: exact_count\nmin_questions: 3\n").unwrap();
        assert_eq!(policy, DecisionPolicy::ExactCount { min_questions: 3 });
    }
}
