//! Core engine — slate acquisition, predictor fan-out, and the round
//! pipeline that ties them together.

pub mod acquirer;
pub mod cache;
pub mod pool;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::info;

use crate::engine::acquirer::TieredAcquirer;
use crate::engine::cache::Clock;
use crate::engine::pool::PredictorPool;
use crate::ensemble::upset::UpsetScorer;
use crate::ensemble::ConsensusEngine;
use crate::predictors::ContestContext;
use crate::types::{
    ConsensusResult, ContestEntry, ContestPrediction, RoundKind, RoundPredictionSet,
    RoundcastError,
};

/// How many contests are assessed at once. Each contest already fans out
/// to every predictor, so this bounds total in-flight API calls at
/// `max_concurrent * pool size`.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

// ---------------------------------------------------------------------------
// Round pipeline
// ---------------------------------------------------------------------------

/// End-to-end orchestration for one round: acquire the slate, assess
/// every contest through the predictor pool, aggregate, score upsets,
/// and emit the validated prediction set.
pub struct RoundPipeline {
    acquirer: Arc<TieredAcquirer>,
    pool: Arc<PredictorPool>,
    consensus: ConsensusEngine,
    scorer: UpsetScorer,
    max_concurrent: usize,
    clock: Arc<dyn Clock>,
}

impl RoundPipeline {
    pub fn new(
        acquirer: Arc<TieredAcquirer>,
        pool: Arc<PredictorPool>,
        consensus: ConsensusEngine,
        scorer: UpsetScorer,
        max_concurrent: usize,
    ) -> Self {
        let clock = acquirer.clock();
        Self {
            acquirer,
            pool,
            consensus,
            scorer,
            max_concurrent: max_concurrent.max(1),
            clock,
        }
    }

    /// Run the pipeline for one round kind.
    ///
    /// Source and predictor failures are absorbed along the way; only
    /// `DataUnavailable` (no usable slate anywhere) and `Invariant`
    /// (a bug) reach the caller.
    pub async fn run(
        &self,
        kind: RoundKind,
        force_refresh: bool,
    ) -> Result<RoundPredictionSet, RoundcastError> {
        let slate = self.acquirer.acquire(kind, force_refresh).await?;
        info!(
            round = %slate.round,
            pool = self.pool.size(),
            "Slate acquired; assessing contests"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let quorum = self.pool.quorum();

        let mut handles = Vec::with_capacity(slate.contests.len());
        for entry in &slate.contests {
            let ctx = ContestContext::for_contest(&slate.round, entry);
            let entry = entry.clone();
            let pool = Arc::clone(&self.pool);
            let engine = self.consensus.clone();
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.map_err(|_| {
                    RoundcastError::Invariant("contest semaphore closed".to_string())
                })?;
                let opinions = pool.evaluate(&ctx).await;
                let consensus = engine.build(&opinions, quorum, kind)?;
                Ok::<(ContestEntry, ConsensusResult), RoundcastError>((entry, consensus))
            }));
        }

        let mut assessed = Vec::with_capacity(handles.len());
        for handle in handles {
            let joined = handle.await.map_err(|e| {
                RoundcastError::Invariant(format!("contest task failed: {e}"))
            })?;
            assessed.push(joined?);
        }
        assessed.sort_by_key(|(entry, _)| entry.position);

        let mut scores: Vec<_> = assessed
            .iter()
            .map(|(entry, consensus)| self.scorer.score(entry.position, consensus, kind))
            .collect();
        let selected = self.scorer.select_hedges(&mut scores);

        let contests: Vec<ContestPrediction> = assessed
            .into_iter()
            .zip(scores)
            .map(|((entry, consensus), upset)| ContestPrediction { entry, consensus, upset })
            .collect();

        let set = RoundPredictionSet::new(
            slate.round,
            contests,
            self.scorer.hedge_count(),
            self.clock.now(),
        )?;

        info!(
            run_id = %set.run_id,
            kind = %kind,
            round = set.round.round_number,
            hedges = ?selected,
            degraded = set.degraded_count(),
            "Round prediction set ready"
        );
        Ok(set)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
