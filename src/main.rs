//! ROUNDCAST — Sports Round Prediction Pipeline
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the source tiers and the predictor ensemble, then runs the
//! round pipeline once per enabled round kind and writes each
//! prediction artifact to the output directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use secrecy::Secret;
use tracing::{error, info, warn};

use roundcast::config::{self, AppConfig, PredictorSection};
use roundcast::engine::acquirer::TieredAcquirer;
use roundcast::engine::cache::{SlateCache, SystemClock};
use roundcast::engine::pool::PredictorPool;
use roundcast::engine::RoundPipeline;
use roundcast::ensemble::upset::{UpsetScorer, UpsetWeights};
use roundcast::ensemble::ConsensusEngine;
use roundcast::predictors::anthropic::ClaudePredictor;
use roundcast::predictors::chat::ChatPredictor;
use roundcast::predictors::gemini::GeminiPredictor;
use roundcast::predictors::PredictorClient;
use roundcast::sources::betman::{self, BetmanClient};
use roundcast::sources::kspo::{self, KspoClient};
use roundcast::sources::wisetoto::{self, WisetotoClient};
use roundcast::sources::SourceAdapter;
use roundcast::storage;
use roundcast::types::RoundPredictionSet;

const BANNER: &str = r#"
 ____    ___   _   _  _   _  ____    ____     _     ____   _____
|  _ \  / _ \ | | | || \ | ||  _ \  / ___|   / \   / ___| |_   _|
| |_) || | | || | | ||  \| || | | || |      / _ \  \___ \   | |
|  _ < | |_| || |_| || |\  || |_| || |___  / ___ \  ___) |  | |
|_| \_\ \___/  \___/ |_| \_||____/  \____|/_/   \_\|____/   |_|

  Tiered Acquisition + Prediction Ensemble for Fixed-Slate Rounds
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        app_name = %cfg.app.name,
        rounds = ?cfg.rounds.enabled,
        "ROUNDCAST starting up"
    );

    // -- Source tiers ------------------------------------------------------

    let sources = build_sources(&cfg)?;
    if sources.is_empty() {
        anyhow::bail!("No slate sources enabled; nothing to do");
    }

    let mut cache = SlateCache::new(
        PathBuf::from(&cfg.app.state_dir),
        cfg.acquisition.cache_ttl_secs,
        Arc::new(SystemClock),
    );
    for (source_id, ttl) in [
        ("betman", cfg.sources.betman.cache_ttl_secs),
        ("wisetoto", cfg.sources.wisetoto.cache_ttl_secs),
        ("kspo", cfg.sources.kspo.cache_ttl_secs),
    ] {
        if let Some(ttl) = ttl {
            cache.set_source_ttl(source_id, ttl);
        }
    }
    let acquirer = Arc::new(TieredAcquirer::new(sources, Arc::new(cache)));

    // -- Predictor ensemble ------------------------------------------------

    let predictors = build_predictors(&cfg)?;
    if predictors.is_empty() {
        warn!("No predictors available; consensus will be uniform and degraded");
    }
    let mut pool = PredictorPool::new(predictors, cfg.ensemble.deadline_secs);
    if let Some(quorum) = cfg.ensemble.quorum {
        pool = pool.with_quorum(quorum);
    }
    info!(
        members = pool.size(),
        quorum = pool.quorum(),
        deadline_secs = cfg.ensemble.deadline_secs,
        "Predictor pool ready"
    );

    // -- Pipeline ----------------------------------------------------------

    let weights = UpsetWeights {
        high_risk_min: cfg.scoring.risk_high,
        medium_risk_min: cfg.scoring.risk_medium,
        ..UpsetWeights::default()
    };
    let scorer = UpsetScorer::new(weights, cfg.scoring.hedge_count);
    let pipeline = RoundPipeline::new(
        acquirer,
        Arc::new(pool),
        ConsensusEngine::new(),
        scorer,
        cfg.ensemble.max_concurrent_contests,
    );

    // -- One run per enabled round kind ------------------------------------

    let kinds = cfg.rounds.kinds()?;
    let output_dir = PathBuf::from(&cfg.app.output_dir);
    let mut failed = 0usize;

    for &kind in &kinds {
        match pipeline.run(kind, cfg.acquisition.force_refresh).await {
            Ok(set) => {
                log_prediction_set(&set);
                match storage::save_prediction_set(&output_dir, &set) {
                    Ok(path) => {
                        info!(path = %path.display(), "Prediction artifact written")
                    }
                    Err(e) => {
                        error!(kind = %kind, error = %e, "Failed to write prediction artifact");
                        failed += 1;
                    }
                }
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "Round kind failed, continuing with the next");
                failed += 1;
            }
        }
    }

    if failed == kinds.len() {
        anyhow::bail!("No round kind completed");
    }
    if failed > 0 {
        warn!(failed, total = kinds.len(), "Run finished with failures");
    }
    info!("ROUNDCAST run complete.");
    Ok(())
}

/// Construct the enabled source adapters in fixed priority order:
/// betman, then wisetoto, then kspo.
fn build_sources(cfg: &AppConfig) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if cfg.sources.betman.enabled {
        let client = BetmanClient::new(
            cfg.sources.betman.base_url.clone(),
            cfg.sources.betman.timeout_secs.unwrap_or(betman::DEFAULT_TIMEOUT_SECS),
        )?;
        sources.push(Arc::new(client));
    }

    if cfg.sources.wisetoto.enabled {
        let client = WisetotoClient::new(
            cfg.sources.wisetoto.base_url.clone(),
            cfg.sources.wisetoto.timeout_secs.unwrap_or(wisetoto::DEFAULT_TIMEOUT_SECS),
        )?;
        sources.push(Arc::new(client));
    }

    if cfg.sources.kspo.enabled {
        match AppConfig::resolve_env(&cfg.sources.kspo.service_key_env) {
            Ok(key) => {
                let client = KspoClient::new(
                    cfg.sources.kspo.base_url.clone(),
                    Secret::new(key),
                    cfg.sources.kspo.timeout_secs.unwrap_or(kspo::DEFAULT_TIMEOUT_SECS),
                    cfg.sources.kspo.days_ahead.unwrap_or(kspo::DEFAULT_DAYS_AHEAD),
                )?;
                sources.push(Arc::new(client));
            }
            Err(_) => warn!(
                env = %cfg.sources.kspo.service_key_env,
                "KSPO service key not set, skipping source"
            ),
        }
    }

    Ok(sources)
}

/// Construct the enabled predictor clients. A predictor whose key is
/// missing is skipped with a warning; the quorum absorbs the gap.
fn build_predictors(cfg: &AppConfig) -> Result<Vec<Arc<dyn PredictorClient>>> {
    let mut predictors: Vec<Arc<dyn PredictorClient>> = Vec::new();

    if let Some(key) = predictor_key("gpt", &cfg.predictors.gpt) {
        predictors.push(Arc::new(ChatPredictor::openai(
            key,
            cfg.predictors.gpt.model.clone(),
        )?));
    }
    if let Some(key) = predictor_key("claude", &cfg.predictors.claude) {
        predictors.push(Arc::new(ClaudePredictor::new(
            key,
            cfg.predictors.claude.model.clone(),
        )?));
    }
    if let Some(key) = predictor_key("gemini", &cfg.predictors.gemini) {
        predictors.push(Arc::new(GeminiPredictor::new(
            key,
            cfg.predictors.gemini.model.clone(),
        )?));
    }
    if let Some(key) = predictor_key("deepseek", &cfg.predictors.deepseek) {
        predictors.push(Arc::new(ChatPredictor::deepseek(
            key,
            cfg.predictors.deepseek.model.clone(),
        )?));
    }
    if let Some(key) = predictor_key("kimi", &cfg.predictors.kimi) {
        predictors.push(Arc::new(ChatPredictor::kimi(
            key,
            cfg.predictors.kimi.model.clone(),
        )?));
    }

    Ok(predictors)
}

/// Resolve one predictor's API key, warning when it is missing.
fn predictor_key(family: &str, section: &PredictorSection) -> Option<Secret<String>> {
    if !section.enabled {
        return None;
    }
    match AppConfig::resolve_env(&section.api_key_env) {
        Ok(key) => {
            info!(predictor = family, "Predictor enabled");
            Some(Secret::new(key))
        }
        Err(_) => {
            warn!(
                predictor = family,
                env = %section.api_key_env,
                "API key not set, skipping predictor"
            );
            None
        }
    }
}

/// Log a human-readable per-contest summary of one prediction set.
fn log_prediction_set(set: &RoundPredictionSet) {
    info!(
        run_id = %set.run_id,
        round = %set.round,
        hedged_positions = ?set.selected_positions,
        degraded = set.degraded_count(),
        "Round assessed"
    );
    for contest in &set.contests {
        info!(
            contest = %contest.entry,
            consensus = %contest.consensus,
            score = contest.upset.score,
            risk = %contest.upset.risk,
            hedge = contest.upset.selected_for_hedge,
            "Contest assessed"
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("roundcast=info"));

    let json_logging = std::env::var("ROUNDCAST_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
