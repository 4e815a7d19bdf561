//! Webhook transport
//!
//! Bridges the transport traits to a chat gateway over HTTP POST. The
//! gateway owns the platform session; this side only ships JSON payloads
//! and retries transient failures with exponential backoff.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{AdminDirectory, AnnouncementPublisher};
use crate::error::{Error, Result};
use crate::models::{ActorId, AdminRecipient, ChannelTarget, MessageHandle};

/// Webhook transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Gateway base URL
    pub base_url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
        }
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::config("webhook base URL cannot be empty"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::config(
                "webhook base URL must start with http:// or https://",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("webhook timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// HTTP transport to the chat gateway
pub struct WebhookTransport {
    config: WebhookConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    chat_id: i64,
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct AdminsResponse {
    admins: Vec<i64>,
}

impl WebhookTransport {
    /// Create a new webhook transport
    pub fn new(config: WebhookConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Create a transport with just a base URL
    pub fn from_url(base_url: impl Into<String>) -> Result<Self> {
        Self::new(WebhookConfig::new(base_url))
    }

    /// Get the gateway base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// POST with retry; client errors (4xx) are terminal, everything else
    /// backs off exponentially (1s, 2s, 4s...)
    async fn post_with_retry(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(path);
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(2_u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
                tracing::debug!(
                    url,
                    attempt = attempt + 1,
                    "retrying webhook request"
                );
            }

            let mut request = self.client.post(&url);
            if let Some(token) = &self.config.auth_token {
                request = request.bearer_auth(token);
            }

            match request.json(payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "unable to read response body".to_string());
                    last_error = Some(Error::delivery(format!("{url}: HTTP {status}: {body}")));
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(Error::Http(e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::delivery(format!("{url}: unknown error"))))
    }
}

#[async_trait]
impl AnnouncementPublisher for WebhookTransport {
    async fn publish(
        &self,
        channel: ChannelTarget,
        text: &str,
        instance_id: &str,
    ) -> Result<MessageHandle> {
        let payload = serde_json::json!({
            "chat_id": channel.chat_id,
            "topic_id": channel.topic_id,
            "text": text,
            "instance_id": instance_id,
        });
        let response = self.post_with_retry("messages", &payload).await?;
        let body: PublishResponse = response.json().await?;

        tracing::info!(
            instance_id,
            chat_id = body.chat_id,
            message_id = body.message_id,
            "announcement published"
        );
        Ok(MessageHandle {
            chat_id: body.chat_id,
            message_id: body.message_id,
        })
    }

    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()> {
        let payload = serde_json::json!({
            "chat_id": handle.chat_id,
            "message_id": handle.message_id,
            "text": text,
        });
        self.post_with_retry("messages/edit", &payload).await?;
        Ok(())
    }
}

#[async_trait]
impl AdminDirectory for WebhookTransport {
    async fn list_admins(&self, tenant_id: &str) -> Result<Vec<AdminRecipient>> {
        let payload = serde_json::json!({ "tenant_id": tenant_id });
        let response = self.post_with_retry("admins/list", &payload).await?;
        let body: AdminsResponse = response.json().await?;
        Ok(body
            .admins
            .into_iter()
            .map(|id| AdminRecipient {
                recipient: ActorId(id),
            })
            .collect())
    }

    async fn notify(&self, recipient: ActorId, text: &str) -> Result<()> {
        let payload = serde_json::json!({
            "recipient": recipient.0,
            "text": text,
        });
        self.post_with_retry("notifications", &payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_config_validation() {
        assert!(WebhookConfig::new("https://gw.example.com").validate().is_ok());
        assert!(WebhookConfig::new("").validate().is_err());
        assert!(WebhookConfig::new("gw.example.com").validate().is_err());
        assert!(WebhookConfig::new("https://gw.example.com")
            .with_timeout(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = WebhookConfig::new("https://gw.example.com")
            .with_auth_token("secret")
            .with_timeout(30)
            .with_max_retries(5);
        assert_eq!(config.auth_token, Some("secret".to_string()));
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 5);

        let transport = WebhookTransport::new(config).unwrap();
        assert_eq!(transport.base_url(), "https://gw.example.com");
    }

    #[tokio::test]
    async fn test_publish_returns_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": -100,
                "instance_id": "i-1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "chat_id": -100,
                "message_id": 42,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = WebhookTransport::from_url(server.uri()).unwrap();
        let channel = ChannelTarget {
            chat_id: -100,
            topic_id: Some(7),
        };
        let handle = transport.publish(channel, "hello", "i-1").await.unwrap();
        assert_eq!(handle.message_id, 42);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notifications"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let config = WebhookConfig::new(server.uri()).with_max_retries(3);
        let transport = WebhookTransport::new(config).unwrap();
        let err = transport.notify(ActorId(1), "hi").await.unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
    }

    #[tokio::test]
    async fn test_list_admins() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admins/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "admins": [11, 22],
            })))
            .mount(&server)
            .await;

        let transport = WebhookTransport::from_url(server.uri()).unwrap();
        let admins = transport.list_admins("t-1").await.unwrap();
        assert_eq!(admins.len(), 2);
        assert_eq!(admins[0].recipient, ActorId(11));
    }
}
