//! Betman official vendor integration.
//!
//! The authoritative source for round slates: carries the official round
//! number, contest ordering, sale state, and sale deadline. Slow and
//! occasionally overloaded around round publication, hence the generous
//! timeout.
//!
//! Base URL: https://www.betman.co.kr
//! Auth: none (public schedule data)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{classify_transport, kst_start_time, parse_error, SourceAdapter};
use crate::types::{ContestEntry, RoundInfo, RoundKind, RoundStatus, RoundcastError, Slate};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://www.betman.co.kr";
const SOURCE_ID: &str = "betman";

/// Betman can take tens of seconds to answer around round publication.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Vendor product codes per round kind.
fn product_code(kind: RoundKind) -> &'static str {
    match kind {
        RoundKind::SoccerWdl => "G101",
        RoundKind::BasketballW5l => "G028",
    }
}

// ---------------------------------------------------------------------------
// API response types (Betman JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleResponse {
    /// Official round number.
    #[serde(default)]
    turn_no: u32,
    /// Sale state: "SALE", "READY", or a closed/settled code.
    #[serde(default)]
    state: String,
    /// Sale deadline as "YYYYMMDDHHmmss" in KST.
    #[serde(default)]
    sale_end_dt: Option<String>,
    #[serde(default)]
    match_list: Vec<ScheduleGame>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleGame {
    /// Position within the slate, 1-based.
    game_no: u32,
    home_nm: String,
    away_nm: String,
    /// Contest date as "YYYYMMDD".
    #[serde(default)]
    match_dt: Option<String>,
    /// Start time as "HHMM" in KST.
    #[serde(default)]
    match_tm: Option<String>,
    #[serde(default)]
    league_nm: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Betman vendor client.
pub struct BetmanClient {
    http: Client,
    base_url: String,
}

impl BetmanClient {
    pub fn new(base_url: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("ROUNDCAST/0.1.0 (round-prediction-pipeline)")
            .build()
            .context("Failed to build HTTP client for Betman")?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
        })
    }

    // -- Parsing helpers --------------------------------------------------

    /// Parse a "YYYYMMDDHHmmss" KST stamp into UTC.
    fn parse_kst_stamp(raw: &str) -> Option<DateTime<Utc>> {
        let naive = NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M%S").ok()?;
        let kst = FixedOffset::east_opt(9 * 3600)?;
        let in_kst = kst.from_local_datetime(&naive).single()?;
        Some(in_kst.with_timezone(&Utc))
    }

    fn parse_status(state: &str) -> RoundStatus {
        match state {
            "SALE" => RoundStatus::Open,
            "READY" => RoundStatus::Scheduled,
            _ => RoundStatus::Closed,
        }
    }

    /// Turn a schedule response into a slate. Pure so tests can feed
    /// fixtures without a server.
    fn build_slate(
        body: ScheduleResponse,
        kind: RoundKind,
        as_of: NaiveDate,
        fetched_at: DateTime<Utc>,
    ) -> Result<Slate, RoundcastError> {
        if body.turn_no == 0 {
            return Err(parse_error(SOURCE_ID, "schedule response missing round number"));
        }

        let match_date = body
            .match_list
            .iter()
            .filter_map(|g| g.match_dt.as_deref())
            .filter_map(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
            .min()
            .unwrap_or(as_of);

        let contests = body
            .match_list
            .into_iter()
            .map(|game| {
                let game_date = game
                    .match_dt
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
                    .unwrap_or(match_date);
                let start_time = game
                    .match_tm
                    .as_deref()
                    .and_then(|t| kst_start_time(game_date, t));
                ContestEntry {
                    position: game.game_no,
                    home: game.home_nm,
                    away: game.away_nm,
                    start_time,
                    league: game.league_nm,
                }
            })
            .collect();

        let round = RoundInfo {
            round_number: body.turn_no,
            kind,
            match_date,
            slate_size: kind.slate_size(),
            status: Self::parse_status(&body.state),
            source_id: SOURCE_ID.to_string(),
            deadline: body.sale_end_dt.as_deref().and_then(Self::parse_kst_stamp),
            fetched_at,
        };

        Ok(Slate { round, contests })
    }
}

#[async_trait]
impl SourceAdapter for BetmanClient {
    async fn fetch_slate(
        &self,
        kind: RoundKind,
        as_of: NaiveDate,
    ) -> Result<Slate, RoundcastError> {
        let url = format!(
            "{}/api/proto/schedule?gmId={}",
            self.base_url,
            product_code(kind),
        );
        debug!(url = %url, kind = %kind, "Fetching Betman schedule");

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

        let body: ScheduleResponse = resp
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
