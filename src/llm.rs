//! The reviewer stage's LLM transport. The
//! [`LlmReviewer`] trait is the seam tests substitute a fake across; the
//! default implementation is an OpenAI-compatible chat-completions client.
//!
//! Retry-with-backoff and the `temperature = 0.0` / 60s-timeout constants are
//! grounded in `original_source/services/llm_service.py::simple_call` and
//! `analyze_clusters_with_retry`.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// One round-trip to the reviewer model: send a prompt, get back raw text.
/// Validation of that text into [`crate::decision::Decision`]s is the
/// caller's job (`engine.rs`), so a fake reviewer can return canned XML
/// without knowing anything about HTTP.
#[async_trait]
pub trait LlmReviewer: Send + Sync {
    async fn review(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
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

/// Default [`LlmReviewer`] backed by an OpenAI-compatible chat completions
/// endpoint (`POST {base_url}/chat/completions`).
pub struct ReqwestLlmReviewer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_name: String,
}

impl ReqwestLlmReviewer {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| Error::Config {
            message: "llm.api_key is required to build a reviewer client".to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Transport {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            model_name: config.model_name.clone(),
        })
    }
}

#[async_trait]
impl LlmReviewer for ReqwestLlmReviewer {
    async fn review(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model_name,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            max_tokens: 4000,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::TransportTimeout(Duration::from_secs(60))
                } else {
                    Error::Transport {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::TransportRateLimited {
                message: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(Error::Transport {
                message: format!("HTTP {status}"),
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| Error::Transport {
            message: e.to_string(),
        })?;
        let content = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Transport {
                message: "chat completion returned no choices".to_string(),
            })?
            .message
            .content;
        Ok(content.trim().to_string())
    }
}

/// `wait = base * 2^attempt + jitter(0, 1)`, per `simple_call`'s backoff.
fn backoff_duration(base_secs: f64, attempt: u32) -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let wait = base_secs * 2f64.powi(attempt as i32) + jitter;
    Duration::from_secs_f64(wait.max(0.0))
}

/// Call `reviewer.review(prompt)`, retrying on rate-limit errors with
/// exponential backoff and on validation failures with the same prompt
/// unmodified, up to `max_retries` attempts. `validate` turns raw text into
/// `T` or a retryable [`Error::DecisionInvalid`]/[`Error::UnknownTargetId`].
pub async fn review_with_retry<F, T>(
    reviewer: &dyn LlmReviewer,
    prompt: &str,
    max_retries: u32,
    backoff_base_secs: f64,
    mut validate: F,
) -> Result<T>
where
    F: FnMut(&str) -> Result<T>,
{
    let mut last_error = String::new();
    for attempt in 0..max_retries {
        match reviewer.review(prompt).await {
            Ok(raw) => match validate(&raw) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_error = e.to_string();
                }
            },
            Err(Error::TransportRateLimited { message }) => {
                last_error = message;
                if attempt + 1 < max_retries {
                    tokio::time::sleep(backoff_duration(backoff_base_secs, attempt)).await;
                }
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::ReviewerExhausted {
        attempts: max_retries,
        last_error,
    })
}
