//! ReclaimService - caller-facing operations.
//!
//! Wires the store, the text-generation backends, the notifier and the chat
//! provisioner into the matching and verification components. Every
//! dependency is constructed by the caller and injected here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use reclaim_agent::backend::OpenAiBackend;
use reclaim_agent::{LlmBackend, QuestionGenerator, QuestionLimits};
use reclaim_core::{ClaimAttempt, Report, ReportKind, UserProfile, VerificationQuestion, Verdict};

use crate::chat::{ChatProvisioner, HandoverChannel, HttpChatProvisioner, RecordingChat};
use crate::config::{AgentConfig, ReclaimConfig};
use crate::error::{ReclaimError, Result};
use crate::matching::{CreatedMatch, MatchEngine};
use crate::notify::{NotificationGate, NotificationOutcome, Notifier, RecordingNotifier, WebhookNotifier};
use crate::store::{names, Collections, DocumentStore, OrderBy, Query};
use crate::verification::{ClaimSession, VerificationEngine, VerificationResult};

/// Result of submitting a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub report_id: String,
    pub matches: Vec<CreatedMatch>,
    pub notification: NotificationOutcome,
}

/// A user's reports, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserReports {
    pub lost: Vec<Report>,
    pub found: Vec<Report>,
}

/// The lost & found service.
pub struct ReclaimService {
    collections: Collections,
    matcher: MatchEngine,
    gate: NotificationGate,
    verifier: VerificationEngine,
    chat: Arc<dyn ChatProvisioner>,
    config: ReclaimConfig,
}

impl ReclaimService {
    /// Assemble the service from constructed collaborators.
    ///
    /// `backends` are text-generation models in fallback order.
    pub fn new(
        config: ReclaimConfig,
        store: Arc<dyn DocumentStore>,
        backends: Vec<Arc<dyn LlmBackend>>,
        notifier: Arc<dyn Notifier>,
        chat: Arc<dyn ChatProvisioner>,
    ) -> Self {
        let collections = Collections::new(store, config.timeouts.store());
        let generator = question_generator(&config, backends);

        Self {
            matcher: MatchEngine::new(collections.clone(), config.matching.clone()),
            gate: NotificationGate::new(
                notifier,
                collections.clone(),
                config.matching.strong_match_threshold,
                config.matching.notify_strategy,
                config.timeouts.notify(),
            ),
            verifier: VerificationEngine::new(
                collections.clone(),
                Arc::new(generator),
                config.verification.clone(),
            ),
            collections,
            chat,
            config,
        }
    }

    /// Build the HTTP collaborators described by `config` over `store`.
    ///
    /// Without a webhook or chat endpoint, notifications and channels are only
    /// recorded in memory.
    pub fn from_config(config: ReclaimConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let backends = build_backends(&config.agent)?;

        let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
            Some(url) => Arc::new(
                WebhookNotifier::new(url, &config.notify.verify_url_base, config.timeouts.notify())
                    .map_err(|e| ReclaimError::Config(e.to_string()))?,
            ),
            None => {
                warn!("No notification webhook configured, notifications are only recorded");
                Arc::new(RecordingNotifier::new(&config.notify.verify_url_base))
            }
        };

        let chat: Arc<dyn ChatProvisioner> = match &config.chat.base_url {
            Some(url) => Arc::new(
                HttpChatProvisioner::new(url, config.chat.api_key.clone(), config.timeouts.chat())
                    .map_err(|e| ReclaimError::Config(e.to_string()))?,
            ),
            None => Arc::new(RecordingChat::new()),
        };

        Ok(Self::new(config, store, backends, notifier, chat))
    }

    pub fn config(&self) -> &ReclaimConfig {
        &self.config
    }

    /// Store a user's contact identity.
    pub async fn register_user(&self, email: &str, display_name: Option<String>) -> Result<UserProfile> {
        if email.trim().is_empty() {
            return Err(ReclaimError::Validation("email is required".to_string()));
        }
        let profile = UserProfile {
            id: String::new(),
            email: email.trim().to_string(),
            display_name,
        };
        Ok(self.collections.users.insert(&profile).await?)
    }

    pub async fn submit_lost_report(&self, report: Report) -> Result<Submission> {
        self.submit(ReportKind::Lost, report).await
    }

    pub async fn submit_found_report(&self, report: Report) -> Result<Submission> {
        self.submit(ReportKind::Found, report).await
    }

    async fn submit(&self, kind: ReportKind, mut report: Report) -> Result<Submission> {
        let missing = report.missing_fields();
        if !missing.is_empty() {
            return Err(ReclaimError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        report.status = kind.initial_status();
        report.claimed_by = None;
        report.claimed_at = None;

        let report = self.collections.reports(kind).insert(&report).await?;
        info!(report_id = %report.id, kind = ?kind, category = %report.category, "Report submitted");

        let matches = match kind {
            ReportKind::Lost => self.matcher.match_lost_item(&report).await?,
            ReportKind::Found => self.matcher.match_found_item(&report).await?,
        };
        let notification = self.gate.dispatch(&matches).await;

        Ok(Submission {
            report_id: report.id,
            matches,
            notification,
        })
    }

    /// Generate verification questions for a found item.
    pub async fn request_verification_questions(&self, found_item_id: &str) -> Result<ClaimSession> {
        self.verifier.request_questions(found_item_id).await
    }

    pub async fn submit_verification_answers(
        &self,
        found_item_id: &str,
        user_id: &str,
        answers: &BTreeMap<String, String>,
    ) -> Result<VerificationResult> {
        self.verifier.submit_answers(found_item_id, user_id, answers).await
    }

    pub async fn grade_free_form(
        &self,
        found_item_id: &str,
        questions: &[VerificationQuestion],
        answers: &BTreeMap<String, String>,
    ) -> Result<Verdict> {
        self.verifier.grade_free_form(found_item_id, questions, answers).await
    }

    pub async fn resolve_review(
        &self,
        found_item_id: &str,
        claimant_id: &str,
        approve: bool,
    ) -> Result<VerificationResult> {
        self.verifier.resolve_review(found_item_id, claimant_id, approve).await
    }

    pub async fn find_divergences(&self, found_item_id: &str) -> Result<Vec<ClaimAttempt>> {
        self.verifier.finalizer().find_divergences(found_item_id).await
    }

    /// Lost and found reports filed by `user_id`, newest first.
    pub async fn reports_by_user(&self, user_id: &str) -> Result<UserReports> {
        let query = Query::all()
            .eq("reporterId", user_id)
            .order_by(OrderBy::newest_first());

        let (lost, found) = futures::try_join!(
            self.collections.lost_items.query(&query),
            self.collections.found_items.query(&query)
        )?;

        Ok(UserReports { lost, found })
    }

    /// Open the finder/claimant chat for a claimed item.
    pub async fn open_handover_channel(
        &self,
        found_item_id: &str,
        requester_id: &str,
    ) -> Result<HandoverChannel> {
        let found = self
            .collections
            .found_items
            .get(found_item_id)
            .await?
            .ok_or_else(|| ReclaimError::not_found(names::FOUND_ITEMS, found_item_id))?;

        let claimant = match (&found.claimed_by, found.is_claimed()) {
            (Some(claimant), true) => claimant.clone(),
            _ => return Err(ReclaimError::Conflict("Item has not been claimed".to_string())),
        };

        let counterpart = if requester_id == found.reporter_id {
            claimant
        } else if requester_id == claimant {
            found.reporter_id.clone()
        } else {
            return Err(ReclaimError::Validation(
                "Only the finder or the claimant can open this chat".to_string(),
            ));
        };

        if counterpart == requester_id {
            return Err(ReclaimError::Validation("Cannot create chat with yourself".to_string()));
        }

        let prefix = &self.config.chat.user_prefix;
        let requester = format!("{}{}", prefix, requester_id);
        let channel = HandoverChannel {
            channel_id: found.id.clone(),
            members: [requester.clone(), format!("{}{}", prefix, counterpart)],
            created_by: requester,
        };

        let timeout = self.config.timeouts.chat();
        tokio::time::timeout(timeout, self.chat.create_channel(&channel))
            .await
            .map_err(|_| upstream_timeout("Chat provisioning", timeout))?
            .map_err(|e| ReclaimError::Upstream(e.to_string()))?;

        info!(found_item_id = %found.id, "Handover channel ready");
        Ok(channel)
    }
}

/// OpenAI-compatible backends for the configured models, in fallback order.
pub fn build_backends(agent: &AgentConfig) -> Result<Vec<Arc<dyn LlmBackend>>> {
    agent
        .models()
        .into_iter()
        .map(|model| {
            OpenAiBackend::new(&agent.base_url, model, agent.api_key.clone(), agent.request_timeout())
                .map(|b| Arc::new(b) as Arc<dyn LlmBackend>)
                .map_err(|e| ReclaimError::Config(e.to_string()))
        })
        .collect()
}

/// Question generator bounded and timed by `config`.
pub fn question_generator(config: &ReclaimConfig, backends: Vec<Arc<dyn LlmBackend>>) -> QuestionGenerator {
    QuestionGenerator::new(backends)
        .with_limits(QuestionLimits {
            min: config.verification.min_questions,
            max: config.verification.max_questions,
        })
        .with_timeout(config.agent.request_timeout())
}

fn upstream_timeout(what: &str, timeout: Duration) -> ReclaimError {
    ReclaimError::Upstream(format!("{} timed out after {}ms", what, timeout.as_millis()))
}
