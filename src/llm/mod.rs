use async_trait::async_trait;
use log::{debug, trace};
use serde_json::Value;
use std::time::Duration;

use crate::core::config::LlmConfig;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("LLM returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("LLM response had no content")]
    EmptyResponse,
}

/// Single prompt in, text out. No streaming, no conversation state.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    fn model(&self) -> &str;
}

pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAIClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

/// Some reasoning models prefix the answer with their channel markup; keep only the answer.
fn strip_channel_prefix(raw: &str) -> &str {
    let end_token = "final<|message|>";
    match raw.find(end_token) {
        Some(pos) => &raw[pos + end_token.len()..],
        None => raw,
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "max_tokens": self.max_tokens
            }));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("LLM error response {status}: {body}");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: Value = response.json().await?;
        trace!("LLM raw response: {result}");
        let raw_content = result["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");
        let content = strip_channel_prefix(raw_content).trim();
        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(content.to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(server: &mockito::ServerGuard) -> LlmConfig {
        LlmConfig {
            enabled: true,
            base_url: server.url(),
            api_key: "sk-test".to_string(),
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_tokens: 50,
        }
    }

    #[test]
    fn test_strip_channel_prefix() {
        assert_eq!(strip_channel_prefix("analysis...final<|message|>Call now"), "Call now");
        assert_eq!(strip_channel_prefix("Call now"), "Call now");
    }

    #[tokio::test]
    async fn test_generate_returns_trimmed_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"  Book a demo.  "}}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new(&config_for(&server)).unwrap();
        assert_eq!(client.generate("hi").await.unwrap(), "Book a demo.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_maps_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = OpenAIClient::new(&config_for(&server)).unwrap();
        assert!(matches!(
            client.generate("hi").await,
            Err(LlmError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"   "}}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new(&config_for(&server)).unwrap();
        assert!(matches!(
            client.generate("hi").await,
            Err(LlmError::EmptyResponse)
        ));
    }
}
