//! Ensemble aggregation — consensus and upset assessment.
//!
//! Turns the surviving predictor opinions for one contest into a single
//! consensus view: mean probabilities, an agreement measure, and the
//! quorum verdict. Upset scoring over the consensus lives in `upset`.

pub mod upset;

use tracing::debug;

use crate::types::{
    ConsensusResult, OutcomeProbs, PredictorOpinion, RoundKind, RoundcastError,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Normalisation scale for top-outcome sample variance. Chosen so that
/// survivors whose top-outcome probabilities span at most 10 percentage
/// points score an agreement of at least 0.8 for any ensemble size; the
/// tightest case is two opinions 0.10 apart (variance 0.005).
const AGREEMENT_VARIANCE_SCALE: f64 = 0.025;

// ---------------------------------------------------------------------------
// Consensus engine
// ---------------------------------------------------------------------------

/// Aggregates per-contest opinions into a consensus. Every surviving
/// opinion carries the same weight; no member is privileged.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    variance_scale: f64,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self { variance_scale: AGREEMENT_VARIANCE_SCALE }
    }
}

impl ConsensusEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the consensus for one contest.
    ///
    /// `quorum` is the minimum number of survivors for a full-strength
    /// consensus; fewer marks the result degraded but still produces a
    /// usable distribution. Zero survivors yield a uniform distribution
    /// with zero agreement and zero confidence, the loudest possible
    /// hedge signal.
    pub fn build(
        &self,
        opinions: &[PredictorOpinion],
        quorum: usize,
        kind: RoundKind,
    ) -> Result<ConsensusResult, RoundcastError> {
        if opinions.is_empty() {
            let outcomes = kind.outcomes();
            let uniform = 1.0 / outcomes.len() as f64;
            let mut probs = OutcomeProbs::new();
            for &outcome in outcomes {
                probs.insert(outcome, uniform);
            }
            return ConsensusResult::new(probs, 0.0, 0.0, Vec::new(), true);
        }

        let n = opinions.len() as f64;
        let mut probs = OutcomeProbs::new();
        for &outcome in kind.outcomes() {
            let mean = opinions.iter().map(|o| o.probability_of(outcome)).sum::<f64>() / n;
            probs.insert(outcome, mean);
        }

        let mean_confidence = opinions.iter().map(|o| o.confidence).sum::<f64>() / n;
        let contributors: Vec<String> =
            opinions.iter().map(|o| o.predictor.clone()).collect();
        let degraded = opinions.len() < quorum;

        // Agreement looks at how tightly the members cluster on the
        // consensus top outcome, via sample variance.
        let mut top = (kind.outcomes()[0], f64::MIN);
        for (&outcome, &p) in &probs {
            if p > top.1 {
                top = (outcome, p);
            }
        }
        let top = top.0;
        let agreement = if opinions.len() <= 1 {
            1.0
        } else {
            let tops: Vec<f64> = opinions.iter().map(|o| o.probability_of(top)).collect();
            let mean_top = tops.iter().sum::<f64>() / n;
            let variance =
                tops.iter().map(|p| (p - mean_top).powi(2)).sum::<f64>() / (n - 1.0);
            (1.0 - (variance / self.variance_scale).min(1.0)).clamp(0.0, 1.0)
        };

        debug!(
            survivors = opinions.len(),
            quorum,
            degraded,
            agreement = format!("{agreement:.3}"),
            "Consensus built"
        );

        ConsensusResult::new(probs, agreement, mean_confidence, contributors, degraded)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
