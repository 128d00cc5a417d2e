//! Predictor backends for contest assessment.
//!
//! Defines the `PredictorClient` trait and provides implementations for
//! the five ensemble members: Claude (Anthropic), Gemini (Google), and
//! the OpenAI-compatible chat family (GPT, DeepSeek, Kimi).
//!
//! All backends share one prompt contract and one payload parser so the
//! consensus compares like with like; only transport differs per client.

pub mod anthropic;
pub mod chat;
pub mod gemini;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::{
    ContestEntry, Outcome, OutcomeProbs, PredictorOpinion, RoundInfo, RoundKind, RoundcastError,
};

// ---------------------------------------------------------------------------
// Shared retry policy
// ---------------------------------------------------------------------------

/// Maximum retries on rate limit / server errors.
pub(crate) const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
pub(crate) const BASE_BACKOFF_MS: u64 = 1000;

/// Retryable statuses: 429 (rate limit) and the 5xx family.
pub(crate) fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.as_u16() >= 500
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over probability-assessment backends.
///
/// Implementors send one contest to their model and return a parsed,
/// validated opinion. Timeouts are enforced by the caller, which races
/// all ensemble members against one shared deadline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictorClient: Send + Sync {
    /// Assess a single contest.
    async fn assess(&self, ctx: &ContestContext) -> Result<PredictorOpinion, RoundcastError>;

    /// Stable identifier used in opinions, quorum membership, and logs.
    fn predictor_id(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Contest context and prompt contract
// ---------------------------------------------------------------------------

/// Everything a predictor is told about one contest.
#[derive(Debug, Clone)]
pub struct ContestContext {
    pub kind: RoundKind,
    pub round_number: u32,
    pub position: u32,
    pub slate_size: usize,
    pub home: String,
    pub away: String,
    pub league: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

impl ContestContext {
    pub fn for_contest(round: &RoundInfo, entry: &ContestEntry) -> Self {
        Self {
            kind: round.kind,
            round_number: round.round_number,
            position: entry.position,
            slate_size: round.slate_size,
            home: entry.home.clone(),
            away: entry.away.clone(),
            league: entry.league.clone(),
            start_time: entry.start_time,
        }
    }

    /// The shared system prompt. Pins the JSON contract all backends
    /// must answer with, including what each outcome key means for this
    /// round kind.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are a calibrated sports forecaster for fixed-slate pool betting.\n\
             Assess the contest you are given and respond with a single JSON object \
             and nothing else, in exactly this shape:\n\
             {{\"probabilities\": {{\"home\": 0.00, \"draw\": 0.00, \"away\": 0.00}}, \
             \"confidence\": 0, \"reasoning\": \"one short paragraph\"}}\n\n\
             For this round type:\n\
             - \"home\" means {}\n\
             - \"draw\" means {}\n\
             - \"away\" means {}\n\n\
             RULES:\n\
             1. The three probabilities must sum to 1.00.\n\
             2. No probability may be negative.\n\
             3. confidence is 0-100: how certain you are in this assessment.\n\
             4. Be genuinely calibrated; do not default to the favourite.\n\
             5. Output raw JSON only, no markdown fences, no commentary.",
            Outcome::Home.label(self.kind),
            Outcome::Draw.label(self.kind),
            Outcome::Away.label(self.kind),
        )
    }

    /// The user prompt for one contest.
    pub fn user_prompt(&self) -> String {
        let mut prompt = String::with_capacity(512);
        prompt.push_str(&format!(
            "ROUND {} ({}), contest {} of {}.\n",
            self.round_number, self.kind, self.position, self.slate_size,
        ));
        prompt.push_str(&format!("HOME: {}\nAWAY: {}\n", self.home, self.away));
        if let Some(league) = &self.league {
            prompt.push_str(&format!("LEAGUE: {league}\n"));
        }
        if let Some(start) = &self.start_time {
            prompt.push_str(&format!(
                "KICKOFF: {}\n",
                start.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        prompt.push_str("\nAssess the outcome probabilities for this contest.\n");
        prompt
    }
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct OpinionPayload {
    probabilities: HashMap<String, f64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

fn malformed(predictor: &str, message: impl Into<String>) -> RoundcastError {
    RoundcastError::PredictorMalformed {
        predictor: predictor.to_string(),
        message: message.into(),
    }
}

/// Parse a model response into a validated opinion.
///
/// Models wrap JSON in prose or markdown fences often enough that the
/// parser takes the outermost brace pair rather than trusting the whole
/// body. Sums within ±0.1 of 1.0 are renormalised to exactly 1.0; wider
/// drift means the model did not follow the contract.
pub fn parse_opinion(predictor: &str, raw: &str) -> Result<PredictorOpinion, RoundcastError> {
    let start = raw
        .find('{')
        .ok_or_else(|| malformed(predictor, "response contains no JSON object"))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| malformed(predictor, "response contains no JSON object"))?;
    if end < start {
        return Err(malformed(predictor, "response contains no JSON object"));
    }

    let payload: OpinionPayload = serde_json::from_str(&raw[start..=end])
        .map_err(|e| malformed(predictor, format!("invalid JSON payload: {e}")))?;

    let mut probs = OutcomeProbs::new();
    for outcome in [Outcome::Home, Outcome::Draw, Outcome::Away] {
        let p = *payload
            .probabilities
            .get(outcome.key())
            .ok_or_else(|| malformed(predictor, format!("missing \"{}\" probability", outcome.key())))?;
        if p < 0.0 {
            return Err(malformed(predictor, format!("negative probability for \"{}\"", outcome.key())));
        }
        probs.insert(outcome, p);
    }

    let total: f64 = probs.values().sum();
    if (total - 1.0).abs() > 0.1 {
        return Err(malformed(
            predictor,
            format!("probabilities sum to {total:.3}, outside tolerance"),
        ));
    }
    if total > 0.0 {
        for p in probs.values_mut() {
            *p /= total;
        }
    } else {
        return Err(malformed(predictor, "probabilities sum to zero"));
    }

    let mut confidence = payload.confidence.unwrap_or(50.0);
    if confidence < 0.0 {
        return Err(malformed(predictor, format!("negative confidence {confidence}")));
    }
    if confidence > 1.0 {
        confidence /= 100.0;
    }
    if confidence > 1.0 {
        return Err(malformed(predictor, "confidence above 100"));
    }

    PredictorOpinion::new(predictor, probs, confidence, payload.reasoning)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
