//! Anthropic Claude predictor backend.
//!
//! Implements `PredictorClient` over the Anthropic Messages API, with
//! rate-limit aware retries and exponential backoff.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{is_retryable_status, parse_opinion, ContestContext, PredictorClient, BASE_BACKOFF_MS, MAX_RETRIES};
use crate::types::{PredictorOpinion, RoundcastError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const MAX_TOKENS: u32 = 1024;

const PREDICTOR_ID: &str = "claude";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    system: String,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Claude ensemble member.
pub struct ClaudePredictor {
    http: Client,
    api_key: Secret<String>,
    model: String,
}

impl ClaudePredictor {
    pub fn new(api_key: Secret<String>, model: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build Anthropic HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    fn unavailable(&self, message: impl Into<String>) -> RoundcastError {
        RoundcastError::PredictorUnavailable {
            predictor: PREDICTOR_ID.to_string(),
            message: message.into(),
        }
    }

    /// Send a messages request with retry + backoff, returning the
    /// concatenated text blocks.
    async fn call_api(&self, system: &str, user_message: &str) -> Result<String, RoundcastError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message.to_string(),
            }],
            system: system.to_string(),
        };

        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying Anthropic API call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(API_URL)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: MessagesResponse = response
                            .json()
                            .await
                            .map_err(|e| self.unavailable(format!("response body unreadable: {e}")))?;
                        let text = body
                            .content
                            .iter()
                            .filter_map(|b| b.text.as_deref())
                            .collect::<Vec<_>>()
                            .join("");
                        return Ok(text);
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if is_retryable_status(status) {
                        warn!(status = %status, attempt, "Retryable Anthropic API error");
                        last_error = format!("HTTP {status}: {error_text}");
                        continue;
                    }
                    return Err(self.unavailable(format!("HTTP {status}: {error_text}")));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Anthropic request failed");
                    last_error = format!("request error: {e}");
                    continue;
                }
            }
        }

        Err(self.unavailable(format!("gave up after {MAX_RETRIES} retries: {last_error}")))
    }
}

#[async_trait]
impl PredictorClient for ClaudePredictor {
    async fn assess(&self, ctx: &ContestContext) -> Result<PredictorOpinion, RoundcastError> {
        debug!(
            predictor = PREDICTOR_ID,
            position = ctx.position,
            model = %self.model,
            "Requesting contest assessment"
        );
        let text = self.call_api(&ctx.system_prompt(), &ctx.user_prompt()).await?;
        parse_opinion(PREDICTOR_ID, &text)
    }

    fn predictor_id(&self) -> &str {
        PREDICTOR_ID
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
