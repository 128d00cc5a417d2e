//! Wisetoto aggregator integration.
//!
//! Community mirror of the official schedule. Updates within minutes of
//! Betman but occasionally lags a round behind or publishes a partial
//! list while contests are still being confirmed. First fallback tier.
//!
//! Base URL: https://www.wisetoto.com
//! Auth: none

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{classify_transport, kst_start_time, SourceAdapter};
use crate::types::{ContestEntry, RoundInfo, RoundKind, RoundStatus, RoundcastError, Slate};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://www.wisetoto.com";
const SOURCE_ID: &str = "wisetoto";

pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// Site category slugs per round kind.
fn category_slug(kind: RoundKind) -> &'static str {
    match kind {
        RoundKind::SoccerWdl => "proto victory",
        RoundKind::BasketballW5l => "basket w5l",
    }
}

// ---------------------------------------------------------------------------
// API response types (Wisetoto JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CurrentRoundResponse {
    /// Round number as the site shows it. Zero or absent while the page
    /// is mid-update.
    #[serde(default)]
    round_no: u32,
    /// "open" or "closed"; absent means open.
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    games: Vec<AggregatorGame>,
}

#[derive(Debug, Deserialize)]
struct AggregatorGame {
    no: u32,
    home: String,
    away: String,
    /// "YYYY-MM-DD"
    #[serde(default)]
    game_date: Option<String>,
    /// "HH:MM" in KST.
    #[serde(default)]
    game_time: Option<String>,
    #[serde(default)]
    league: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Wisetoto aggregator client.
pub struct WisetotoClient {
    http: Client,
    base_url: String,
}

impl WisetotoClient {
    pub fn new(base_url: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("ROUNDCAST/0.1.0 (round-prediction-pipeline)")
            .build()
            .context("Failed to build HTTP client for Wisetoto")?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
        })
    }

    /// Turn an aggregator response into a slate. The site sometimes omits
    /// the round number mid-update; estimate it from the cadence then.
    fn build_slate(
        body: CurrentRoundResponse,
        kind: RoundKind,
        as_of: NaiveDate,
        fetched_at: DateTime<Utc>,
    ) -> Result<Slate, RoundcastError> {
        let match_date = body
            .games
            .iter()
            .filter_map(|g| g.game_date.as_deref())
            .filter_map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .min()
            .unwrap_or(as_of);

        let round_number = if body.round_no > 0 {
            body.round_no
        } else {
            kind.estimated_round_number(match_date)
        };

        let status = match body.state.as_deref() {
            Some("closed") => RoundStatus::Closed,
            _ => RoundStatus::Open,
        };

        let contests = body
            .games
            .into_iter()
            .map(|game| {
                let game_date = game
                    .game_date
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                    .unwrap_or(match_date);
                let start_time = game
                    .game_time
                    .as_deref()
                    .and_then(|t| kst_start_time(game_date, t));
                ContestEntry {
                    position: game.no,
                    home: game.home,
                    away: game.away,
                    start_time,
                    league: game.league,
                }
            })
            .collect();

        let round = RoundInfo {
            round_number,
            kind,
            match_date,
            slate_size: kind.slate_size(),
            status,
            source_id: SOURCE_ID.to_string(),
            deadline: None,
            fetched_at,
        };

        Ok(Slate { round, contests })
    }
}

#[async_trait]
impl SourceAdapter for WisetotoClient {
    async fn fetch_slate(
        &self,
        kind: RoundKind,
        as_of: NaiveDate,
    ) -> Result<Slate, RoundcastError> {
        let url = format!(
            "{}/api/schedule/current?category={}",
            self.base_url,
            urlencoding::encode(category_slug(kind)),
        );
        debug!(url = %url, kind = %kind, "Fetching Wisetoto schedule");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_transport(SOURCE_ID, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RoundcastError::SourceUnavailable {
                source_id: SOURCE_ID.to_string(),
                message: format!("HTTP {status}"),
            });
        }

        let body: CurrentRoundResponse = resp
            .json()
            .await
            .map_err(|e| classify_transport(SOURCE_ID, e))?;

        Self::build_slate(body, kind, as_of, Utc::now())
    }

    fn source_id(&self) -> &str {
        SOURCE_ID
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
