//! Google Gemini predictor backend.
//!
//! Implements `PredictorClient` over the generateContent API. Gemini
//! takes the key as a query parameter and the system prompt as a
//! dedicated systemInstruction block.

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

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const PREDICTOR_ID: &str = "gemini";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: ContentPart,
    contents: Vec<ContentPart>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct ContentPart {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Gemini ensemble member.
pub struct GeminiPredictor {
    http: Client,
    api_key: Secret<String>,
    model: String,
}

impl GeminiPredictor {
    pub fn new(api_key: Secret<String>, model: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build Gemini HTTP client")?;

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

    async fn call_api(&self, system: &str, user_message: &str) -> Result<String, RoundcastError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            BASE_URL,
            self.model,
            self.api_key.expose_secret(),
        );
        let request = GenerateRequest {
            system_instruction: ContentPart {
                parts: vec![TextPart { text: system.to_string() }],
            },
            contents: vec![ContentPart {
                parts: vec![TextPart { text: user_message.to_string() }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying Gemini API call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self.http.post(&url).json(&request).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: GenerateResponse = response
                            .json()
                            .await
                            .map_err(|e| self.unavailable(format!("response body unreadable: {e}")))?;
                        let text = body
                            .candidates
                            .first()
                            .and_then(|c| c.content.as_ref())
                            .map(|c| {
                                c.parts
                                    .iter()
                                    .filter_map(|p| p.text.as_deref())
                                    .collect::<Vec<_>>()
                                    .join("")
                            })
                            .unwrap_or_default();
                        return Ok(text);
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if is_retryable_status(status) {
                        warn!(status = %status, attempt, "Retryable Gemini API error");
                        last_error = format!("HTTP {status}: {error_text}");
                        continue;
                    }
                    return Err(self.unavailable(format!("HTTP {status}: {error_text}")));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Gemini request failed");
                    last_error = format!("request error: {e}");
                    continue;
                }
            }
        }

        Err(self.unavailable(format!("gave up after {MAX_RETRIES} retries: {last_error}")))
    }
}

#[async_trait]
impl PredictorClient for GeminiPredictor {
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
