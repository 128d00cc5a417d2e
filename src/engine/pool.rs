//! Concurrent predictor fan-out.
//!
//! Sends one contest to every ensemble member at once and collects
//! whatever comes back before the shared deadline. The deadline is one
//! instant for the whole fan-out, not a per-call allowance: a slow
//! backend cannot stretch the round's wall-clock budget. Failures and
//! timeouts are logged and dropped; quorum judgement happens downstream.

use std::sync::Arc;

use tracing::{info, warn};

use crate::predictors::{ContestContext, PredictorClient};
use crate::types::{PredictorOpinion, RoundcastError};

/// Default shared deadline for one contest's fan-out, in seconds.
pub const DEFAULT_DEADLINE_SECS: u64 = 30;

/// Fan-out coordinator over the predictor ensemble.
pub struct PredictorPool {
    predictors: Vec<Arc<dyn PredictorClient>>,
    deadline_secs: u64,
    quorum_override: Option<usize>,
}

impl PredictorPool {
    pub fn new(predictors: Vec<Arc<dyn PredictorClient>>, deadline_secs: u64) -> Self {
        Self {
            predictors,
            deadline_secs,
            quorum_override: None,
        }
    }

    /// Pin the quorum instead of deriving it from the pool size.
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum_override = Some(quorum);
        self
    }

    /// Number of ensemble members.
    pub fn size(&self) -> usize {
        self.predictors.len()
    }

    /// Simple majority of the configured ensemble unless pinned. With
    /// five members that is three; a shrunken two-member pool still
    /// needs both.
    pub fn quorum(&self) -> usize {
        self.quorum_override
            .unwrap_or(self.predictors.len() / 2 + 1)
    }

    /// Fan one contest out to every member and collect the surviving
    /// opinions. Never fails: an empty vector means nobody answered.
    pub async fn evaluate(&self, ctx: &ContestContext) -> Vec<PredictorOpinion> {
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs(self.deadline_secs);
        let deadline_secs = self.deadline_secs;

        let calls = self.predictors.iter().map(|predictor| {
            let predictor = Arc::clone(predictor);
            let ctx = ctx.clone();
            async move {
                let id = predictor.predictor_id().to_string();
                match tokio::time::timeout_at(deadline, predictor.assess(&ctx)).await {
                    Ok(Ok(opinion)) => Some(opinion),
                    Ok(Err(e)) => {
                        warn!(predictor = %id, position = ctx.position, error = %e, "Predictor dropped from contest");
                        None
                    }
                    Err(_) => {
                        let e = RoundcastError::PredictorTimeout {
                            predictor: id.clone(),
                            deadline_secs,
                        };
                        warn!(predictor = %id, position = ctx.position, error = %e, "Predictor dropped from contest");
                        None
                    }
                }
            }
        });

        let opinions: Vec<PredictorOpinion> = futures::future::join_all(calls)
            .await
            .into_iter()
            .flatten()
            .collect();

        info!(
            position = ctx.position,
            survivors = opinions.len(),
            ensemble = self.predictors.len(),
            "Contest fan-out complete"
        );
        opinions
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
