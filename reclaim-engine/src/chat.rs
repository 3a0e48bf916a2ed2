//! Handover chat provisioning.
//!
//! Once an item is claimed, the finder and the claimant get a two-party
//! channel keyed by the item id. Creation is idempotent: the chat service's
//! "channel already exists" error is treated as success.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

/// Chat-service error code for an existing channel.
pub const CHANNEL_EXISTS_CODE: i64 = 16;

/// Error types for chat provisioning.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Chat request failed: {0}")]
    RequestFailed(String),

    #[error("Chat service error {code}: {message}")]
    Service { code: i64, message: String },
}

/// A provisioned two-party channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverChannel {
    pub channel_id: String,
    pub members: [String; 2],
    pub created_by: String,
}

/// Chat system that can host handover channels.
#[async_trait]
pub trait ChatProvisioner: Send + Sync {
    /// Create (or reuse) `channel.channel_id` with both members.
    async fn create_channel(&self, channel: &HandoverChannel) -> Result<(), ChatError>;
}

/// HTTP client for the chat service's server-side API.
pub struct HttpChatProvisioner {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl HttpChatProvisioner {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::RequestFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), ChatError> {
        let mut request = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::RequestFailed(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ServiceError>(&text) {
            Ok(err) if err.code != 0 => Err(ChatError::Service {
                code: err.code,
                message: err.message,
            }),
            _ => Err(ChatError::RequestFailed(format!("HTTP {}: {}", status, text))),
        }
    }
}

#[async_trait]
impl ChatProvisioner for HttpChatProvisioner {
    async fn create_channel(&self, channel: &HandoverChannel) -> Result<(), ChatError> {
        let users: Vec<_> = channel
            .members
            .iter()
            .map(|id| json!({ "id": id, "role": "user" }))
            .collect();
        self.post("/users", json!({ "users": users })).await?;

        let created = self
            .post(
                &format!("/channels/messaging/{}", channel.channel_id),
                json!({
                    "data": {
                        "members": channel.members,
                        "created_by_id": channel.created_by,
                    }
                }),
            )
            .await;

        match created {
            Err(ChatError::Service { code, .. }) if code == CHANNEL_EXISTS_CODE => Ok(()),
            other => other,
        }
    }
}

/// Provisioner that records channels in memory.
#[derive(Default)]
pub struct RecordingChat {
    channels: Mutex<Vec<HandoverChannel>>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(&self) -> Vec<HandoverChannel> {
        self.channels.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvisioner for RecordingChat {
    async fn create_channel(&self, channel: &HandoverChannel) -> Result<(), ChatError> {
        if let Ok(mut channels) = self.channels.lock() {
            if !channels.iter().any(|c| c.channel_id == channel.channel_id) {
                channels.push(channel.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel() -> HandoverChannel {
        HandoverChannel {
            channel_id: "found-1".into(),
            members: ["app_owner".into(), "app_finder".into()],
            created_by: "app_owner".into(),
        }
    }

    async fn server_with_channel_response(response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/messaging/found-1"))
            .and(body_partial_json(json!({ "data": { "created_by_id": "app_owner" } })))
            .respond_with(response)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_create_channel() {
        let server = server_with_channel_response(ResponseTemplate::new(201)).await;
        let chat = HttpChatProvisioner::new(server.uri(), Some("k".into()), Duration::from_secs(5)).unwrap();
        chat.create_channel(&channel()).await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_channel_is_swallowed() {
        let server = server_with_channel_response(
            ResponseTemplate::new(400).set_body_json(json!({ "code": 16, "message": "channel exists" })),
        )
        .await;
        let chat = HttpChatProvisioner::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        chat.create_channel(&channel()).await.unwrap();
    }

    #[tokio::test]
    async fn test_other_service_errors_propagate() {
        let server = server_with_channel_response(
            ResponseTemplate::new(403).set_body_json(json!({ "code": 17, "message": "not allowed" })),
        )
        .await;
        let chat = HttpChatProvisioner::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = chat.create_channel(&channel()).await.unwrap_err();
        assert!(matches!(err, ChatError::Service { code: 17, .. }));
    }
}
