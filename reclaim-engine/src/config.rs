//! Configuration for the Reclaim service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use reclaim_core::{Containment, DecisionPolicy, MATCH_THRESHOLD, STRONG_MATCH_THRESHOLD};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimConfig {
    /// Candidate matching
    pub matching: MatchingConfig,
    /// Ownership verification
    pub verification: VerificationConfig,
    /// Text-generation models
    pub agent: AgentConfig,
    /// Deadlines for external calls
    pub timeouts: TimeoutConfig,
    /// Owner notification
    pub notify: NotifyConfig,
    /// Handover chat provisioning
    pub chat: ChatConfig,
}

impl ReclaimConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Which strong match is notified when several exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyStrategy {
    /// First strong match in scan order
    #[default]
    FirstEncountered,
    /// Strong match with the highest score, first one on ties
    HighestScore,
}

/// Matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum score to persist a candidate
    pub match_threshold: u32,
    /// Minimum score to notify the owner
    pub strong_match_threshold: u32,
    pub notify_strategy: NotifyStrategy,
    /// Concurrent user lookups per scan
    pub lookup_concurrency: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            match_threshold: MATCH_THRESHOLD,
            strong_match_threshold: STRONG_MATCH_THRESHOLD,
            notify_strategy: NotifyStrategy::default(),
            lookup_concurrency: 8,
        }
    }
}

/// Verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Decision policy for the claim entry point
    pub policy: DecisionPolicy,
    pub containment: Containment,
    pub min_questions: usize,
    pub max_questions: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            policy: DecisionPolicy::default(),
            containment: Containment::default(),
            min_questions: 2,
            max_questions: 5,
        }
    }
}

/// Text-generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// OpenAI-compatible endpoint
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub primary_model: String,
    /// Tried when the primary model is out of quota
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: reclaim_agent::backend::openai::GEMINI_OPENAI_BASE_URL.to_string(),
            api_key: None,
            primary_model: "gemini-2.5-flash".to_string(),
            fallback_model: Some("gemini-2.0-flash".to_string()),
            request_timeout_ms: 30_000,
        }
    }
}

impl AgentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Models in fallback order.
    pub fn models(&self) -> Vec<&str> {
        std::iter::once(self.primary_model.as_str())
            .chain(self.fallback_model.as_deref())
            .collect()
    }
}

/// Deadlines for store, notification and chat calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub store_ms: u64,
    pub notify_ms: u64,
    pub chat_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            store_ms: 5_000,
            notify_ms: 10_000,
            chat_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn notify(&self) -> Duration {
        Duration::from_millis(self.notify_ms)
    }

    pub fn chat(&self) -> Duration {
        Duration::from_millis(self.chat_ms)
    }
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Mail relay webhook; notifications are only recorded when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Base of the ownership verification link; the item id is appended
    pub verify_url_base: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            verify_url_base: "http://localhost:3000/verify-ownership".to_string(),
        }
    }
}

/// Chat provisioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Prefix applied to user ids in the chat system
    pub user_prefix: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            user_prefix: "app_".to_string(),
        }
    }
}
