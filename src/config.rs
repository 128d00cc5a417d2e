//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`. Numeric knobs default in
//! code; the file only has to name what it overrides.

use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ensemble::upset::UpsetWeights;
use crate::types::RoundKind;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSection,
    pub rounds: RoundsConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub predictors: PredictorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoundsConfig {
    /// Round kinds to process, by their stable string form.
    pub enabled: Vec<String>,
}

impl RoundsConfig {
    /// Parse the enabled kind names.
    pub fn kinds(&self) -> Result<Vec<RoundKind>> {
        self.enabled
            .iter()
            .map(|name| {
                RoundKind::from_str(name)
                    .with_context(|| format!("Unknown round kind in config: {name}"))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionConfig {
    /// Freshness window for cached slates, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: i64,
    /// Skip the fresh-cache check and always hit the sources.
    #[serde(default)]
    pub force_refresh: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            force_refresh: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    pub betman: SourceSection,
    pub wisetoto: SourceSection,
    pub kspo: KspoSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceSection {
    pub enabled: bool,
    /// Override the adapter's built-in endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Per-source freshness window, overriding `[acquisition]`.
    #[serde(default)]
    pub cache_ttl_secs: Option<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KspoSection {
    pub enabled: bool,
    pub base_url: String,
    /// Env var holding the pre-encoded service key.
    pub service_key_env: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub days_ahead: Option<u32>,
    #[serde(default)]
    pub cache_ttl_secs: Option<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnsembleConfig {
    /// Wall-clock budget shared by all predictors on one contest.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
    /// Fixed quorum override; absent means simple majority of the pool.
    #[serde(default)]
    pub quorum: Option<usize>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_contests: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline(),
            quorum: None,
            max_concurrent_contests: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    /// Contests per round that receive a hedged pick.
    #[serde(default = "default_hedge_count")]
    pub hedge_count: usize,
    #[serde(default = "default_risk_high")]
    pub risk_high: f64,
    #[serde(default = "default_risk_medium")]
    pub risk_medium: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hedge_count: default_hedge_count(),
            risk_high: default_risk_high(),
            risk_medium: default_risk_medium(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictorsConfig {
    pub gpt: PredictorSection,
    pub claude: PredictorSection,
    pub gemini: PredictorSection,
    pub deepseek: PredictorSection,
    pub kimi: PredictorSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictorSection {
    pub enabled: bool,
    pub api_key_env: String,
    /// Override the client's default model.
    #[serde(default)]
    pub model: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

fn default_state_dir() -> String {
    crate::storage::DEFAULT_STATE_DIR.to_string()
}

fn default_output_dir() -> String {
    crate::storage::DEFAULT_PREDICTIONS_DIR.to_string()
}

fn default_cache_ttl() -> i64 {
    crate::engine::cache::DEFAULT_TTL_SECS
}

fn default_deadline() -> u64 {
    crate::engine::pool::DEFAULT_DEADLINE_SECS
}

fn default_max_concurrent() -> usize {
    crate::engine::DEFAULT_MAX_CONCURRENT
}

fn default_hedge_count() -> usize {
    crate::ensemble::upset::DEFAULT_HEDGE_COUNT
}

fn default_risk_high() -> f64 {
    UpsetWeights::default().high_risk_min
}

fn default_risk_medium() -> f64 {
    UpsetWeights::default().medium_risk_min
}
