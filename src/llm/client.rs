//! LLM gateway client with retry and backoff
//!
//! Speaks the chat-completions wire format. Transport errors, 5xx and 429
//! are retried with exponential backoff; other 4xx responses fail fast.

use crate::config::LlmConfig;
use crate::error::{LearnError, LlmError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Message role in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Helper to create a system message
pub fn system_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::System,
        content: content.into(),
    }
}

/// Helper to create a user message
pub fn user_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::User,
        content: content.into(),
    }
}

/// Trait for text-generation backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate text from a conversation
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Whether the client has credentials configured
    fn is_configured(&self) -> bool;
}

/// Chat-completions request payload
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Gateway LLM client
pub struct GatewayLlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl GatewayLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(LearnError::Http)?;

        if config.api_key.is_empty() {
            warn!("LLM API key not configured, generation will be disabled");
        }

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.gateway_url.trim_end_matches('/')
        )
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.config.retry.base_delay_secs
            * self.config.retry.exponential_base.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.config.retry.max_delay_secs))
    }

    async fn try_once(&self, messages: &[Message]) -> std::result::Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let url = self.endpoint();
        debug!("Making LLM request to: {}", url);

        let response = timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| LlmError::Timeout)?
        .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ConnectionFailed(format!(
                "server error {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("LLM API error {}: {}", status, body);
            return Err(LlmError::GenerationFailed(format!(
                "request failed with status {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))
    }
}

#[async_trait]
impl LlmClient for GatewayLlmClient {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        if !self.is_configured() {
            return Err(LlmError::NotConfigured.into());
        }

        let max_retries = self.config.retry.max_retries;
        let mut attempt = 0u32;

        loop {
            match self.try_once(messages).await {
                Ok(content) => {
                    info!("LLM generation succeeded on attempt {}", attempt + 1);
                    return Ok(content);
                }
                Err(e) => {
                    let retryable = matches!(
                        e,
                        LlmError::Timeout
                            | LlmError::ConnectionFailed(_)
                            | LlmError::RateLimited
                    );

                    if !retryable || attempt >= max_retries {
                        return Err(e.into());
                    }

                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "LLM request failed ({}), retrying in {:.1}s (attempt {}/{})",
                        e,
                        delay.as_secs_f64(),
                        attempt + 1,
                        max_retries
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: String) -> LlmConfig {
        LlmConfig {
            gateway_url: url,
            api_key: "test-key".to_string(),
            model: "gpt-4".to_string(),
            timeout_secs: 5,
            retry: RetryConfig {
                max_retries: 2,
                base_delay_secs: 0.01,
                max_delay_secs: 0.05,
                exponential_base: 2.0,
            },
            ..LlmConfig::default()
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn test_message_helpers() {
        let msg = system_message("You are an educator");
        assert_eq!(msg.role, Role::System);

        let msg = user_message("Explain graphs");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Explain graphs");
    }

    #[test]
    fn test_unconfigured_client() {
        let client = GatewayLlmClient::new(LlmConfig::default()).unwrap();
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn test_successful_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("QUESTION: ok?")))
            .mount(&server)
            .await;

        let client = GatewayLlmClient::new(test_config(server.uri())).unwrap();
        let text = client.generate(&[user_message("hi")]).await.unwrap();
        assert_eq!(text, "QUESTION: ok?");
    }

    #[tokio::test]
    async fn test_retries_on_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("recovered")))
            .mount(&server)
            .await;

        let client = GatewayLlmClient::new(test_config(server.uri())).unwrap();
        let text = client.generate(&[user_message("hi")]).await.unwrap();
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn test_client_error_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayLlmClient::new(test_config(server.uri())).unwrap();
        let result = client.generate(&[user_message("hi")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = GatewayLlmClient::new(test_config(server.uri())).unwrap();
        let result = client.generate(&[user_message("hi")]).await;
        assert!(matches!(
            result,
            Err(LearnError::Llm(LlmError::RateLimited))
        ));
    }
}
