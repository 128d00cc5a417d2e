//! Full-pipeline scenarios.
//!
//! Each test wires mock sources and predictors into a real
//! `RoundPipeline` over a disposable state directory, then checks the
//! produced artifact. Unit-level behaviour of the acquirer, cache, pool,
//! and scorer is covered in their own modules; these tests cover the
//! seams between them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use roundcast::engine::acquirer::TieredAcquirer;
use roundcast::engine::cache::{Clock, ManualClock, SlateCache};
use roundcast::engine::pool::PredictorPool;
use roundcast::engine::{RoundPipeline, DEFAULT_MAX_CONCURRENT};
use roundcast::ensemble::upset::UpsetScorer;
use roundcast::ensemble::ConsensusEngine;
use roundcast::predictors::PredictorClient;
use roundcast::sources::SourceAdapter;
use roundcast::storage;
use roundcast::types::{Outcome, RoundKind, RoundPredictionSet, RoundcastError};

use crate::mock_predictor::MockPredictor;
use crate::mock_source::MockSlateSource;

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

fn temp_dir() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("roundcast_it_{}", uuid::Uuid::new_v4()));
    p
}

fn fixed_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap(),
    ))
}

fn make_acquirer(
    sources: Vec<Arc<dyn SourceAdapter>>,
    dir: &Path,
    clock: Arc<ManualClock>,
) -> Arc<TieredAcquirer> {
    let cache = Arc::new(SlateCache::new(dir.to_path_buf(), 300, clock));
    Arc::new(TieredAcquirer::new(sources, cache))
}

/// Five members leaning home with mild spread: consensus lands at
/// Home 0.48 / Draw 0.292 / Away 0.228, agreement 0.96, confidence 0.65.
fn standard_members() -> Vec<Arc<MockPredictor>> {
    vec![
        Arc::new(MockPredictor::new("gpt", 0.52, 0.28, 0.20, 0.75)),
        Arc::new(MockPredictor::new("claude", 0.48, 0.30, 0.22, 0.70)),
        Arc::new(MockPredictor::new("gemini", 0.50, 0.26, 0.24, 0.65)),
        Arc::new(MockPredictor::new("deepseek", 0.46, 0.30, 0.24, 0.60)),
        Arc::new(MockPredictor::new("kimi", 0.44, 0.32, 0.24, 0.55)),
    ]
}

fn pool_of(members: &[Arc<MockPredictor>], deadline_secs: u64) -> Arc<PredictorPool> {
    let clients: Vec<Arc<dyn PredictorClient>> = members
        .iter()
        .map(|member| Arc::clone(member) as Arc<dyn PredictorClient>)
        .collect();
    Arc::new(PredictorPool::new(clients, deadline_secs))
}

fn make_pipeline(acquirer: Arc<TieredAcquirer>, pool: Arc<PredictorPool>) -> RoundPipeline {
    RoundPipeline::new(
        acquirer,
        pool,
        ConsensusEngine::default(),
        UpsetScorer::default(),
        DEFAULT_MAX_CONCURRENT,
    )
}

fn assert_artifact_shape(set: &RoundPredictionSet, hedge_count: usize) {
    assert_eq!(set.contests.len(), set.round.slate_size);
    for (i, contest) in set.contests.iter().enumerate() {
        assert_eq!(contest.entry.position, (i + 1) as u32);
        let total: f64 = contest.consensus.probs.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
    let flagged = set
        .contests
        .iter()
        .filter(|c| c.upset.selected_for_hedge)
        .count();
    assert_eq!(flagged, hedge_count);
    assert_eq!(set.selected_positions.len(), hedge_count);
}

// ---------------------------------------------------------------------------
// Full-run tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_run_produces_complete_artifact() {
    let state = temp_dir();
    let out = temp_dir();
    let clock = fixed_clock();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        clock.clone(),
    );
    let members = standard_members();
    let pipeline = make_pipeline(acquirer, pool_of(&members, 30));

    let set = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();

    assert_eq!(set.round.round_number, 84);
    assert_eq!(set.round.source_id, "betman");
    assert_eq!(set.round.kind, RoundKind::SoccerWdl);
    assert_eq!(set.generated_at, clock.now());
    assert_artifact_shape(&set, 4);

    for contest in &set.contests {
        let consensus = &contest.consensus;
        assert!(!consensus.degraded);
        assert_eq!(consensus.contributors.len(), 5);
        assert!((consensus.probs[&Outcome::Home] - 0.48).abs() < 1e-9);
        assert!((consensus.agreement - 0.96).abs() < 1e-9);
        assert_eq!(consensus.top_outcome().0, Outcome::Home);
        assert_eq!(contest.upset.hedge_outcomes, vec![Outcome::Home, Outcome::Draw]);
    }

    // Identical opinions everywhere means identical scores, so hedge
    // selection falls back to position order.
    assert_eq!(set.selected_positions, vec![1, 2, 3, 4]);

    let path = storage::save_prediction_set(&out, &set).unwrap();
    assert!(path.exists());
    let json = std::fs::read_to_string(&path).unwrap();
    let back: RoundPredictionSet = serde_json::from_str(&json).unwrap();
    assert_eq!(back.run_id, set.run_id);
    assert_eq!(back.selected_positions, set.selected_positions);

    std::fs::remove_dir_all(&state).ok();
    std::fs::remove_dir_all(&out).ok();
}

#[tokio::test]
async fn test_basketball_round_flows_end_to_end() {
    let state = temp_dir();
    let out = temp_dir();
    let betman = Arc::new(MockSlateSource::new("betman", 210));
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        fixed_clock(),
    );
    let members = standard_members();
    let pipeline = make_pipeline(acquirer, pool_of(&members, 30));

    let set = pipeline.run(RoundKind::BasketballW5l, false).await.unwrap();

    assert_eq!(set.round.kind, RoundKind::BasketballW5l);
    assert_artifact_shape(&set, 4);

    let path = storage::save_prediction_set(&out, &set).unwrap();
    assert!(path.to_string_lossy().contains("basketball_w5l_round210"));

    std::fs::remove_dir_all(&state).ok();
    std::fs::remove_dir_all(&out).ok();
}

// ---------------------------------------------------------------------------
// Acquisition tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_broken_tiers_fall_through_in_order() {
    let state = temp_dir();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    betman.set_error("503 service unavailable");
    let wisetoto = Arc::new(MockSlateSource::with_contest_count("wisetoto", 84, 12));
    let kspo = Arc::new(MockSlateSource::new("kspo", 84));

    let acquirer = make_acquirer(
        vec![
            Arc::clone(&betman) as Arc<dyn SourceAdapter>,
            Arc::clone(&wisetoto) as Arc<dyn SourceAdapter>,
            Arc::clone(&kspo) as Arc<dyn SourceAdapter>,
        ],
        &state,
        fixed_clock(),
    );
    let members = standard_members();
    let pipeline = make_pipeline(acquirer, pool_of(&members, 30));

    let set = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();

    // Broken primary and the incomplete aggregator were both tried once,
    // then the open-data tier won.
    assert_eq!(set.round.source_id, "kspo");
    assert_eq!(betman.fetch_count(), 1);
    assert_eq!(wisetoto.fetch_count(), 1);
    assert_eq!(kspo.fetch_count(), 1);
    assert_artifact_shape(&set, 4);

    std::fs::remove_dir_all(&state).ok();
}

#[tokio::test]
async fn test_fresh_cache_serves_repeat_runs_until_expiry() {
    let state = temp_dir();
    let clock = fixed_clock();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        clock.clone(),
    );
    let members = standard_members();
    let pipeline = make_pipeline(acquirer, pool_of(&members, 30));

    pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();
    assert_eq!(betman.fetch_count(), 1);

    // Within the TTL the cached slate is reused.
    let cached = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();
    assert_eq!(betman.fetch_count(), 1);
    assert_artifact_shape(&cached, 4);

    // Days later the same wall-clock time of day must not read as fresh.
    clock.advance(Duration::days(10) + Duration::minutes(4));
    let refetched = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();
    assert_eq!(betman.fetch_count(), 2);
    assert_eq!(refetched.generated_at, clock.now());

    std::fs::remove_dir_all(&state).ok();
}

#[tokio::test]
async fn test_forced_refresh_refetches_each_run() {
    let state = temp_dir();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        fixed_clock(),
    );
    let members = standard_members();
    let pipeline = make_pipeline(acquirer, pool_of(&members, 30));

    pipeline.run(RoundKind::SoccerWdl, true).await.unwrap();
    let set = pipeline.run(RoundKind::SoccerWdl, true).await.unwrap();

    assert_eq!(betman.fetch_count(), 2);
    assert_artifact_shape(&set, 4);

    std::fs::remove_dir_all(&state).ok();
}

#[tokio::test]
async fn test_snapshot_rescues_after_restart() {
    let state = temp_dir();
    let clock = fixed_clock();

    // First process: a healthy run leaves a durable snapshot behind.
    {
        let betman = Arc::new(MockSlateSource::new("betman", 84));
        let acquirer = make_acquirer(
            vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
            &state,
            clock.clone(),
        );
        let members = standard_members();
        let pipeline = make_pipeline(acquirer, pool_of(&members, 30));
        pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();
    }

    // Second process: empty memory cache, vendor down. The snapshot is
    // all that is left, and it is enough.
    let betman = Arc::new(MockSlateSource::new("betman", 90));
    betman.set_error("connection reset");
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        clock,
    );
    let members = standard_members();
    let pipeline = make_pipeline(acquirer, pool_of(&members, 30));

    let set = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();
    assert_eq!(set.round.round_number, 84);
    assert_eq!(set.round.source_id, "betman");
    assert_eq!(betman.fetch_count(), 1);
    assert_artifact_shape(&set, 4);

    std::fs::remove_dir_all(&state).ok();
}

#[tokio::test]
async fn test_total_outage_with_clean_state_is_fatal() {
    let state = temp_dir();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    betman.set_error("dns failure");
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        fixed_clock(),
    );
    let members = standard_members();
    let pipeline = make_pipeline(acquirer, pool_of(&members, 30));

    let err = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap_err();
    assert!(matches!(
        err,
        RoundcastError::DataUnavailable {
            kind: RoundKind::SoccerWdl
        }
    ));

    std::fs::remove_dir_all(&state).ok();
}

// ---------------------------------------------------------------------------
// Ensemble tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_quorum_absorbs_minority_predictor_failures() {
    let state = temp_dir();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        fixed_clock(),
    );
    let members = standard_members();
    members[0].set_error("429 rate limited");
    members[1].set_error("500 internal error");
    let pipeline = make_pipeline(acquirer, pool_of(&members, 30));

    let set = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();

    // Three of five answered; quorum for five is three.
    for contest in &set.contests {
        assert!(!contest.consensus.degraded);
        assert_eq!(
            contest.consensus.contributors,
            vec!["gemini", "deepseek", "kimi"]
        );
    }
    assert_artifact_shape(&set, 4);

    std::fs::remove_dir_all(&state).ok();
}

#[tokio::test]
async fn test_losing_quorum_degrades_but_completes() {
    let state = temp_dir();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        fixed_clock(),
    );
    let members = standard_members();
    members[0].set_error("quota exhausted");
    members[1].set_error("quota exhausted");
    members[2].set_error("quota exhausted");
    let pipeline = make_pipeline(acquirer, pool_of(&members, 30));

    let set = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();

    for contest in &set.contests {
        assert!(contest.consensus.degraded);
        assert_eq!(contest.consensus.contributors, vec!["deepseek", "kimi"]);
    }
    assert_artifact_shape(&set, 4);

    std::fs::remove_dir_all(&state).ok();
}

#[tokio::test]
async fn test_pinned_quorum_raises_the_bar() {
    let state = temp_dir();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        fixed_clock(),
    );
    let members = standard_members();
    let clients: Vec<Arc<dyn PredictorClient>> = members
        .iter()
        .map(|member| Arc::clone(member) as Arc<dyn PredictorClient>)
        .collect();
    let pool = Arc::new(PredictorPool::new(clients, 30).with_quorum(5));
    let pipeline = make_pipeline(acquirer, pool);

    let full = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();
    assert!(full.contests.iter().all(|c| !c.consensus.degraded));

    // One member down would satisfy a majority quorum, but not a
    // unanimous one.
    members[4].set_error("quota exhausted");
    let short = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();
    assert!(short.contests.iter().all(|c| c.consensus.degraded));
    assert!(short
        .contests
        .iter()
        .all(|c| c.consensus.contributors.len() == 4));

    std::fs::remove_dir_all(&state).ok();
}

#[tokio::test(start_paused = true)]
async fn test_slow_member_cancelled_at_shared_deadline() {
    let state = temp_dir();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        fixed_clock(),
    );
    let members = vec![
        Arc::new(MockPredictor::new("gpt", 0.52, 0.28, 0.20, 0.75)),
        Arc::new(MockPredictor::new("claude", 0.48, 0.30, 0.22, 0.70)),
        Arc::new(
            MockPredictor::new("gemini", 0.50, 0.26, 0.24, 0.65)
                .with_delay(std::time::Duration::from_secs(300)),
        ),
    ];
    let pipeline = make_pipeline(acquirer, pool_of(&members, 2));

    let set = pipeline.run(RoundKind::SoccerWdl, false).await.unwrap();

    // The stalled member was attempted on every contest but never
    // contributed; the two fast members still make quorum.
    for contest in &set.contests {
        assert!(!contest.consensus.degraded);
        assert_eq!(contest.consensus.contributors, vec!["gpt", "claude"]);
    }
    assert_eq!(members[2].call_count(), 14);

    std::fs::remove_dir_all(&state).ok();
}

// ---------------------------------------------------------------------------
// New-round tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_new_round_bump_flows_through_acquirer() {
    let state = temp_dir();
    let betman = Arc::new(MockSlateSource::new("betman", 84));
    let acquirer = make_acquirer(
        vec![Arc::clone(&betman) as Arc<dyn SourceAdapter>],
        &state,
        fixed_clock(),
    );

    let same = acquirer
        .check_new_round(RoundKind::SoccerWdl, Some(84))
        .await
        .unwrap();
    assert!(same.is_none());

    betman.set_round(85);
    let fresh = acquirer
        .check_new_round(RoundKind::SoccerWdl, Some(84))
        .await
        .unwrap();
    assert_eq!(fresh.unwrap().round.round_number, 85);

    // Detection always refetches; a fresh cache must not mask the bump.
    assert_eq!(betman.fetch_count(), 2);

    std::fs::remove_dir_all(&state).ok();
}
