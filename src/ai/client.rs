use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{AiError, AiResult};

/// A chat-completion backend. The prompt and the meaning of `context` are up
/// to the service.
#[mockall::automock]
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_message(&self, message: &str, context: &serde_json::Value) -> AiResult<String>;
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    response: String,
}

/// JSON-over-HTTP chat service: `POST {server_url}/chat`.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    server_url: String,
    api_key: Option<SecretString>,
    client: Client,
}

impl HttpChatClient {
    pub fn new(server_url: &str, api_key: Option<String>, timeout: Duration) -> AiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Http(e.to_string()))?;
        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(SecretString::from),
            client,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Checks that the service answers at all. Any non-5xx status counts.
    pub async fn probe(&self) -> AiResult<()> {
        let response = self
            .client
            .get(format!("{}/health", self.server_url))
            .send()
            .await
            .map_err(|e| AiError::Http(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(AiError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        info!(target: "ai", server = %self.server_url, "🤖 Chat service reachable");
        Ok(())
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn send_message(&self, message: &str, context: &serde_json::Value) -> AiResult<String> {
        let mut request = self
            .client
            .post(format!("{}/chat", self.server_url))
            .json(&json!({
                "message": message,
                "context": context,
                "timestamp": Utc::now().to_rfc3339(),
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AiError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| AiError::Http(e.to_string()))?;
        debug!(target: "ai", chars = reply.response.len(), "Chat reply received");
        let text = reply.response.trim();
        if text.is_empty() {
            Err(AiError::EmptyReply)
        } else {
            Ok(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_url_is_normalized() {
        let client =
            HttpChatClient::new("http://localhost:8000/", Some("key".into()), Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.server_url(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client =
            HttpChatClient::new("http://127.0.0.1:9", None, Duration::from_millis(500)).unwrap();
        assert!(matches!(client.probe().await, Err(AiError::Http(_))));
        assert!(matches!(
            client.send_message("hi", &json!({})).await,
            Err(AiError::Http(_))
        ));
    }
}
