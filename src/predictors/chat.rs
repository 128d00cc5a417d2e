//! OpenAI-compatible chat predictor backends.
//!
//! GPT, DeepSeek, and Kimi all speak the same chat/completions dialect,
//! so one client covers all three; only base URL, model, and identity
//! differ per constructor.

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

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
const KIMI_BASE_URL: &str = "https://api.moonshot.ai/v1";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";
const DEFAULT_KIMI_MODEL: &str = "moonshot-v1-8k";

/// Low temperature keeps the ensemble members close to their central
/// estimate; disagreement should come from the models, not sampling.
const TEMPERATURE: f64 = 0.3;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Chat-dialect ensemble member (GPT, DeepSeek, or Kimi).
pub struct ChatPredictor {
    http: Client,
    api_key: Secret<String>,
    base_url: String,
    model: String,
    predictor_id: String,
}

impl ChatPredictor {
    fn build(
        predictor_id: &str,
        base_url: &str,
        api_key: Secret<String>,
        model: String,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .with_context(|| format!("Failed to build HTTP client for {predictor_id}"))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.to_string(),
            model,
            predictor_id: predictor_id.to_string(),
        })
    }

    pub fn openai(api_key: Secret<String>, model: Option<String>) -> Result<Self> {
        Self::build(
            "gpt",
            OPENAI_BASE_URL,
            api_key,
            model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        )
    }

    pub fn deepseek(api_key: Secret<String>, model: Option<String>) -> Result<Self> {
        Self::build(
            "deepseek",
            DEEPSEEK_BASE_URL,
            api_key,
            model.unwrap_or_else(|| DEFAULT_DEEPSEEK_MODEL.to_string()),
        )
    }

    pub fn kimi(api_key: Secret<String>, model: Option<String>) -> Result<Self> {
        Self::build(
            "kimi",
            KIMI_BASE_URL,
            api_key,
            model.unwrap_or_else(|| DEFAULT_KIMI_MODEL.to_string()),
        )
    }

    fn unavailable(&self, message: impl Into<String>) -> RoundcastError {
        RoundcastError::PredictorUnavailable {
            predictor: self.predictor_id.clone(),
            message: message.into(),
        }
    }

    async fn call_api(&self, system: &str, user_message: &str) -> Result<String, RoundcastError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system.to_string() },
                ChatMessage { role: "user".to_string(), content: user_message.to_string() },
            ],
            temperature: TEMPERATURE,
            response_format: ResponseFormat { format_type: "json_object".to_string() },
        };

        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(
                    predictor = %self.predictor_id,
                    attempt,
                    delay_ms = delay,
                    "Retrying chat API call"
                );
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&url)
                .bearer_auth(self.api_key.expose_secret())
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .map_err(|e| self.unavailable(format!("response body unreadable: {e}")))?;
                        let text = body
                            .choices
                            .first()
                            .and_then(|c| c.message.as_ref())
                            .and_then(|m| m.content.clone())
                            .unwrap_or_default();
                        return Ok(text);
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if is_retryable_status(status) {
                        warn!(
                            predictor = %self.predictor_id,
                            status = %status,
                            attempt,
                            "Retryable chat API error"
                        );
                        last_error = format!("HTTP {status}: {error_text}");
                        continue;
                    }
                    return Err(self.unavailable(format!("HTTP {status}: {error_text}")));
                }
                Err(e) => {
                    warn!(predictor = %self.predictor_id, attempt, error = %e, "Chat request failed");
                    last_error = format!("request error: {e}");
                    continue;
                }
            }
        }

        Err(self.unavailable(format!("gave up after {MAX_RETRIES} retries: {last_error}")))
    }
}

#[async_trait]
impl PredictorClient for ChatPredictor {
    async fn assess(&self, ctx: &ContestContext) -> Result<PredictorOpinion, RoundcastError> {
        debug!(
            predictor = %self.predictor_id,
            position = ctx.position,
            model = %self.model,
            "Requesting contest assessment"
        );
        let text = self.call_api(&ctx.system_prompt(), &ctx.user_prompt()).await?;
        parse_opinion(&self.predictor_id, &text)
    }

    fn predictor_id(&self) -> &str {
        &self.predictor_id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
