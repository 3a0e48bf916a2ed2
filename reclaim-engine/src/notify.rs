//! Owner notification for strong matches.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{NotifyConfig, NotifyStrategy};
use crate::matching::CreatedMatch;
use crate::store::{patch, Collections};

/// Error types for notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification timed out after {0}ms")]
    Timeout(u64),
}

/// Outbound notification sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell `to_email` that item `item_id` may be theirs.
    async fn send(&self, to_email: &str, item_id: &str, score: u32) -> Result<(), NotifyError>;
}

/// A composed notification email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Builds the owner email for a strong match.
pub fn compose_email(verify_url_base: &str, to_email: &str, item_id: &str) -> OutboundEmail {
    OutboundEmail {
        to: to_email.to_string(),
        subject: "Possible match found for your lost item".to_string(),
        text: format!(
            "We found a possible match for your item.\nVisit this link to verify:\n{}/{}",
            verify_url_base.trim_end_matches('/'),
            item_id
        ),
    }
}

/// Posts composed emails to a mail relay webhook.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    verify_url_base: String,
}

impl WebhookNotifier {
    pub fn new(
        webhook_url: impl Into<String>,
        verify_url_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            verify_url_base: verify_url_base.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, to_email: &str, item_id: &str, score: u32) -> Result<(), NotifyError> {
        let email = compose_email(&self.verify_url_base, to_email, item_id);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({
                "to": email.to,
                "subject": email.subject,
                "text": email.text,
                "itemId": item_id,
                "score": score,
            }))
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!("HTTP {}: {}", status, body)));
        }

        Ok(())
    }
}

/// Notifier that keeps composed emails in memory.
pub struct RecordingNotifier {
    verify_url_base: String,
    sent: Mutex<Vec<OutboundEmail>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new(verify_url_base: impl Into<String>) -> Self {
        Self {
            verify_url_base: verify_url_base.into(),
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new(NotifyConfig::default().verify_url_base)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to_email: &str, item_id: &str, _score: u32) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("mail relay unavailable".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(compose_email(&self.verify_url_base, to_email, item_id));
        }
        Ok(())
    }
}

/// What the gate did with a batch of created matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// No match reached the strong threshold
    NoStrongMatch,
    Sent {
        match_id: String,
        recipient: String,
        score: u32,
    },
    /// Delivery failed; persisted matches are kept
    Failed { match_id: String, error: String },
}

/// Sends at most one notification per batch of created matches.
pub struct NotificationGate {
    notifier: Arc<dyn Notifier>,
    collections: Collections,
    strong_threshold: u32,
    strategy: NotifyStrategy,
    timeout: Duration,
}

impl NotificationGate {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        collections: Collections,
        strong_threshold: u32,
        strategy: NotifyStrategy,
        timeout: Duration,
    ) -> Self {
        Self {
            notifier,
            collections,
            strong_threshold,
            strategy,
            timeout,
        }
    }

    /// The strong match to notify about, if any.
    pub fn select<'m>(&self, matches: &'m [CreatedMatch]) -> Option<&'m CreatedMatch> {
        let mut strong = matches
            .iter()
            .filter(|m| m.candidate.score >= self.strong_threshold);

        match self.strategy {
            NotifyStrategy::FirstEncountered => strong.next(),
            NotifyStrategy::HighestScore => strong.fold(None, |best: Option<&CreatedMatch>, m| match best {
                Some(b) if b.candidate.score >= m.candidate.score => Some(b),
                _ => Some(m),
            }),
        }
    }

    /// Notify the probable owner of the selected strong match.
    ///
    /// Delivery failure is returned as an outcome, never as an error.
    pub async fn dispatch(&self, matches: &[CreatedMatch]) -> NotificationOutcome {
        let Some(selected) = self.select(matches) else {
            return NotificationOutcome::NoStrongMatch;
        };
        let candidate = &selected.candidate;

        let sent = tokio::time::timeout(
            self.timeout,
            self.notifier.send(
                &selected.lost_user_email,
                &candidate.found_item_id,
                candidate.score,
            ),
        )
        .await
        .unwrap_or_else(|_| Err(NotifyError::Timeout(self.timeout.as_millis() as u64)));

        if let Err(e) = sent {
            warn!(match_id = %candidate.id, error = %e, "Owner notification failed");
            return NotificationOutcome::Failed {
                match_id: candidate.id.clone(),
                error: e.to_string(),
            };
        }

        info!(match_id = %candidate.id, score = candidate.score, "Owner notified");

        match self
            .collections
            .matches
            .update(&candidate.id, patch([("notified", json!(true))]))
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(match_id = %candidate.id, "Notified match no longer exists"),
            Err(e) => warn!(match_id = %candidate.id, error = %e, "Failed to mark match notified"),
        }

        NotificationOutcome::Sent {
            match_id: candidate.id.clone(),
            recipient: selected.lost_user_email.clone(),
            score: candidate.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, MemoryStore};
    use reclaim_core::MatchCandidate;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn created(id: &str, score: u32, owner: &str) -> CreatedMatch {
        CreatedMatch {
            candidate: MatchCandidate {
                id: id.into(),
                found_item_id: format!("found-{id}"),
                score,
                ..Default::default()
            },
            lost_user_email: owner.into(),
            found_user_email: "finder@campus.edu".into(),
        }
    }

    fn gate(notifier: Arc<RecordingNotifier>, strategy: NotifyStrategy) -> NotificationGate {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        NotificationGate::new(
            notifier,
            Collections::new(store, Duration::from_secs(1)),
            75,
            strategy,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_compose_email_links_item() {
        let email = compose_email("https://reclaim.example/verify-ownership/", "a@b.c", "f1");
        assert!(email.text.ends_with("https://reclaim.example/verify-ownership/f1"));
        assert_eq!(email.subject, "Possible match found for your lost item");
    }

    #[tokio::test]
    async fn test_no_strong_match_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = gate(notifier.clone(), NotifyStrategy::FirstEncountered);

        let outcome = gate.dispatch(&[created("m1", 74, "a@campus.edu")]).await;
        assert_eq!(outcome, NotificationOutcome::NoStrongMatch);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_first_strong_match_wins_by_default() {
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = gate(notifier.clone(), NotifyStrategy::FirstEncountered);
        let batch = [
            created("m1", 60, "weak@campus.edu"),
            created("m2", 80, "first@campus.edu"),
            created("m3", 95, "best@campus.edu"),
        ];

        let outcome = gate.dispatch(&batch).await;
        assert!(matches!(outcome, NotificationOutcome::Sent { ref match_id, .. } if match_id == "m2"));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "first@campus.edu");
        assert!(sent[0].text.ends_with("/found-m2"));
    }

    #[test]
    fn test_highest_score_strategy() {
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = gate(notifier, NotifyStrategy::HighestScore);
        let batch = [
            created("m1", 80, "first@campus.edu"),
            created("m2", 95, "best@campus.edu"),
            created("m3", 95, "tie@campus.edu"),
        ];

        assert_eq!(gate.select(&batch).map(|m| m.candidate.id.as_str()), Some("m2"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_an_outcome() {
        let notifier = Arc::new(RecordingNotifier::default());
        notifier.set_failing(true);
        let gate = gate(notifier, NotifyStrategy::FirstEncountered);

        let outcome = gate.dispatch(&[created("m1", 90, "a@campus.edu")]).await;
        assert!(matches!(outcome, NotificationOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_webhook_notifier_posts_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail"))
            .and(body_partial_json(json!({ "to": "owner@campus.edu", "itemId": "f1", "score": 88 })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            format!("{}/mail", server.uri()),
            "https://reclaim.example/verify-ownership",
            Duration::from_secs(5),
        )
        .unwrap();

        notifier.send("owner@campus.edu", "f1", 88).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier =
            WebhookNotifier::new(server.uri(), "https://reclaim.example/verify-ownership", Duration::from_secs(5))
                .unwrap();

        let err = notifier.send("owner@campus.edu", "f1", 88).await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
    }
}
