//! The external chat model: an OpenAI-compatible HTTP client behind a small
//! trait, plus a wrapper that never lets a model failure reach the caller.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Cannot reach LLM endpoint at {0}")]
    Connection(String),

    #[error("LLM request failed: {0}")]
    HttpClient(String),

    #[error("LLM returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse LLM response: {0}")]
    ResponseParsing(String),

    #[error("LLM returned an empty reply")]
    EmptyReply,
}

/// Text generation with a system prompt. Object safe so the orchestrator
/// can hold any implementation behind an `Arc<dyn LlmGenerate>`.
pub trait LlmGenerate: Send + Sync {
    fn generate<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>>;

    /// Model name for the decision frame.
    fn model(&self) -> &str;
}

/// Client for `POST {base_url}/chat/completions` with a bearer key.
pub struct HttpLlmClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
            timeout: config.timeout,
        })
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.4,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    LlmError::HttpClient(format!("Request timed out after {}ms", self.timeout.as_millis()))
                } else {
                    LlmError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(LlmError::EmptyReply)
    }
}

impl LlmGenerate for HttpLlmClient {
    fn generate<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(self.complete(system, prompt))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Result of a guarded model call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmOutcome {
    pub text: String,
    pub used_fallback: bool,
    /// Why the fallback was used.
    pub reason: Option<String>,
}

/// Call the model under `timeout`. Any error, timeout or empty reply
/// yields `fallback` instead; this function itself never fails.
pub async fn generate_with_fallback(
    llm: &dyn LlmGenerate,
    system: &str,
    prompt: &str,
    timeout: Duration,
    fallback: &str,
) -> LlmOutcome {
    let reason = match tokio::time::timeout(timeout, llm.generate(system, prompt)).await {
        Ok(Ok(text)) if !text.trim().is_empty() => {
            return LlmOutcome {
                text,
                used_fallback: false,
                reason: None,
            };
        }
        Ok(Ok(_)) => LlmError::EmptyReply.to_string(),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("timed out after {}ms", timeout.as_millis()),
    };

    tracing::warn!(model = %llm.model(), reason = %reason, "LLM unavailable, using fallback reply");
    LlmOutcome {
        text: fallback.to_string(),
        used_fallback: true,
        reason: Some(reason),
    }
}

/// Always answers with the same text.
pub struct FixedLlm(pub String);

impl LlmGenerate for FixedLlm {
    fn generate<'a>(&'a self, _system: &'a str, _prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }

    fn model(&self) -> &str {
        "fixed"
    }
}

/// Always fails as if the endpoint were down.
pub struct FailingLlm;

impl LlmGenerate for FailingLlm {
    fn generate<'a>(&'a self, _system: &'a str, _prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async { Err(LlmError::Connection("test://unreachable".into())) })
    }

    fn model(&self) -> &str {
        "failing"
    }
}

/// Answers only after a delay.
pub struct SlowLlm {
    pub delay: Duration,
    pub reply: String,
}

impl LlmGenerate for SlowLlm {
    fn generate<'a>(&'a self, _system: &'a str, _prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        })
    }

    fn model(&self) -> &str {
        "slow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "fallback";

    #[tokio::test]
    async fn reply_passes_through() {
        let out = generate_with_fallback(&FixedLlm("こんにちは".into()), "s", "p", Duration::from_secs(1), FALLBACK).await;
        assert_eq!(out.text, "こんにちは");
        assert!(!out.used_fallback);
        assert!(out.reason.is_none());
    }

    #[tokio::test]
    async fn failure_uses_fallback() {
        let out = generate_with_fallback(&FailingLlm, "s", "p", Duration::from_secs(1), FALLBACK).await;
        assert_eq!(out.text, FALLBACK);
        assert!(out.used_fallback);
        assert!(out.reason.unwrap().contains("Cannot reach"));
    }

    #[tokio::test]
    async fn timeout_uses_fallback() {
        let slow = SlowLlm {
            delay: Duration::from_millis(500),
            reply: "late".into(),
        };
        let out = generate_with_fallback(&slow, "s", "p", Duration::from_millis(20), FALLBACK).await;
        assert_eq!(out.text, FALLBACK);
        assert!(out.reason.unwrap().starts_with("timed out"));
    }

    #[tokio::test]
    async fn blank_reply_uses_fallback() {
        let out = generate_with_fallback(&FixedLlm("  ".into()), "s", "p", Duration::from_secs(1), FALLBACK).await;
        assert!(out.used_fallback);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let config = LlmConfig {
            api_key: "sk-test".into(),
            base_url: "http://127.0.0.1:9/v1/".into(),
            model: "m".into(),
            timeout: Duration::from_millis(500),
        };
        let client = HttpLlmClient::new(&config).unwrap();
        assert_eq!(client.model(), "m");
        assert!(client.generate("s", "p").await.is_err());
    }
}
