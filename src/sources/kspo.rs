//! KSPO open-data API integration.
//!
//! The public sports-promotion API lists contests eligible for ticket
//! sale. Authoritative for schedule facts but knows nothing about slate
//! ordering, so positions are synthesised from kickoff order. Last
//! fallback tier; fast and rate-limited, hence the short timeout.
//!
//! Endpoint: {base}/todz_api_tb_match_mgmt_i
//! Auth: serviceKey query parameter (issued pre-encoded by the portal)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{classify_transport, kst_start_time, SourceAdapter};
use crate::types::{ContestEntry, RoundInfo, RoundKind, RoundStatus, RoundcastError, Slate};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const SOURCE_ID: &str = "kspo";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// How many days ahead to sweep for listed contests.
pub const DEFAULT_DAYS_AHEAD: u32 = 3;

/// Rows per page; the API caps at a few hundred.
const PAGE_SIZE: u32 = 100;

/// Pagination safety stop per day.
const MAX_PAGES: u32 = 3;

/// Product-name keywords identifying each round kind. The API has no
/// product filter parameter, so filtering happens client-side.
fn product_keywords(kind: RoundKind) -> &'static [&'static str] {
    match kind {
        RoundKind::SoccerWdl => &["승무패", "축구토토"],
        RoundKind::BasketballW5l => &["농구토토"],
    }
}

// ---------------------------------------------------------------------------
// API response types (KSPO JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct KspoResponse {
    response: KspoEnvelope,
}

#[derive(Debug, Deserialize)]
struct KspoEnvelope {
    header: KspoHeader,
    #[serde(default)]
    body: Option<KspoBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KspoHeader {
    #[serde(default)]
    result_code: String,
    #[serde(default)]
    result_msg: String,
}

#[derive(Debug, Deserialize)]
struct KspoBody {
    /// `{"item": {...}}` for one row, `{"item": [...]}` for many, and an
    /// empty string when the day has no listings.
    #[serde(default)]
    items: Value,
}

/// One listed contest. Numeric fields arrive as numbers or strings
/// depending on the portal's mood, so they stay as raw values here.
#[derive(Debug, Deserialize)]
struct MatchItem {
    #[serde(default)]
    row_num: Value,
    #[serde(default)]
    turn_no: Value,
    #[serde(default)]
    match_ymd: Value,
    #[serde(default)]
    match_tm: Value,
    #[serde(default)]
    hteam_han_nm: String,
    #[serde(default)]
    ateam_han_nm: String,
    #[serde(default)]
    obj_prod_nm: String,
}

fn value_u32(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().map(|x| x as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unwrap the `items.item` level, tolerating the one-row-object form.
fn extract_items(items: &Value) -> Vec<MatchItem> {
    let item = match items {
        Value::Object(map) => match map.get("item") {
            Some(v) => v,
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    match item {
        Value::Array(list) => list
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
        Value::Object(_) => serde_json::from_value(item.clone())
            .map(|one| vec![one])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// KSPO open-data client.
pub struct KspoClient {
    http: Client,
    base_url: String,
    service_key: Secret<String>,
    days_ahead: u32,
}

struct Candidate {
    row_num: u32,
    turn_no: Option<u32>,
    ymd: String,
    tm: String,
    home: String,
    away: String,
}

impl KspoClient {
    pub fn new(
        base_url: String,
        service_key: Secret<String>,
        timeout_secs: u64,
        days_ahead: u32,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("ROUNDCAST/0.1.0 (round-prediction-pipeline)")
            .build()
            .context("Failed to build HTTP client for KSPO")?;

        Ok(Self { http, base_url, service_key, days_ahead })
    }

    /// Fetch one page of listings for one day.
    async fn fetch_page(&self, ymd: &str, page: u32) -> Result<Vec<MatchItem>, RoundcastError> {
        // The portal issues service keys already percent-encoded; putting
        // the key through a params encoder would double-encode it.
        let url = format!(
            "{}/todz_api_tb_match_mgmt_i?serviceKey={}&pageNo={}&numOfRows={}&resultType=JSON&match_ymd={}",
            self.base_url,
            self.service_key.expose_secret(),
            page,
            PAGE_SIZE,
            ymd,
        );
        debug!(date = ymd, page, "Fetching KSPO match list");

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

        let body: KspoResponse = resp
            .json()
            .await
            .map_err(|e| classify_transport(SOURCE_ID, e))?;

        if body.response.header.result_code != "00" {
            return Err(RoundcastError::SourceUnavailable {
                source_id: SOURCE_ID.to_string(),
                message: format!(
                    "result {}: {}",
                    body.response.header.result_code, body.response.header.result_msg
                ),
            });
        }

        Ok(body
            .response
            .body
            .map(|b| extract_items(&b.items))
            .unwrap_or_default())
    }

    /// Assemble a slate from raw listings: filter to the round kind's
    /// product, dedupe, pick the round, and synthesise positions in
    /// kickoff order.
    fn build_slate(
        items: Vec<MatchItem>,
        kind: RoundKind,
        as_of: NaiveDate,
        fetched_at: DateTime<Utc>,
    ) -> Result<Slate, RoundcastError> {
        let keywords = product_keywords(kind);
        let mut seen_rows = std::collections::HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();

        for item in items {
            if !keywords.iter().any(|k| item.obj_prod_nm.contains(k)) {
                continue;
            }
            let Some(row_num) = value_u32(&item.row_num) else { continue };
            if !seen_rows.insert(row_num) {
                continue;
            }
            let Some(ymd) = value_string(&item.match_ymd) else { continue };
            if item.hteam_han_nm.is_empty() || item.ateam_han_nm.is_empty() {
                continue;
            }
            candidates.push(Candidate {
                row_num,
                turn_no: value_u32(&item.turn_no),
                ymd,
                tm: value_string(&item.match_tm).unwrap_or_else(|| "0000".to_string()),
                home: item.hteam_han_nm,
                away: item.ateam_han_nm,
            });
        }

        // A date window can straddle two rounds. Keep the round with the
        // most listings; ties go to the earlier round.
        let mut per_round: std::collections::HashMap<u32, usize> = std::collections::HashMap::new();
        for c in &candidates {
            if let Some(t) = c.turn_no {
                *per_round.entry(t).or_default() += 1;
            }
        }
        let chosen_round = per_round
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&t, _)| t);
        if let Some(t) = chosen_round {
            candidates.retain(|c| c.turn_no == Some(t) || c.turn_no.is_none());
        }

        candidates.sort_by(|a, b| {
            a.ymd
                .cmp(&b.ymd)
                .then(a.tm.cmp(&b.tm))
                .then(a.row_num.cmp(&b.row_num))
        });

        let match_date = candidates
            .iter()
            .filter_map(|c| NaiveDate::parse_from_str(&c.ymd, "%Y%m%d").ok())
            .min()
            .unwrap_or(as_of);

        let contests = candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let game_date =
                    NaiveDate::parse_from_str(&c.ymd, "%Y%m%d").unwrap_or(match_date);
                ContestEntry {
                    position: (i + 1) as u32,
                    home: c.home,
                    away: c.away,
                    start_time: kst_start_time(game_date, &c.tm),
                    league: None,
                }
            })
            .collect();

        let round = RoundInfo {
            round_number: chosen_round.unwrap_or_else(|| kind.estimated_round_number(match_date)),
            kind,
            match_date,
            slate_size: kind.slate_size(),
            status: RoundStatus::Scheduled,
            source_id: SOURCE_ID.to_string(),
            deadline: None,
            fetched_at,
        };

        Ok(Slate { round, contests })
    }
}

#[async_trait]
impl SourceAdapter for KspoClient {
    async fn fetch_slate(
        &self,
        kind: RoundKind,
        as_of: NaiveDate,
    ) -> Result<Slate, RoundcastError> {
        let mut all_items = Vec::new();

        for day in 0..self.days_ahead {
            let ymd = (as_of + Duration::days(day as i64))
                .format("%Y%m%d")
                .to_string();
            for page in 1..=MAX_PAGES {
                let items = self.fetch_page(&ymd, page).await?;
                let page_len = items.len();
                all_items.extend(items);
                if page_len < PAGE_SIZE as usize {
                    break;
                }
                if page == MAX_PAGES {
                    warn!(date = %ymd, "KSPO pagination stop reached, truncating day");
                }
            }
        }

        Self::build_slate(all_items, kind, as_of, Utc::now())
    }

    fn source_id(&self) -> &str {
        SOURCE_ID
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
