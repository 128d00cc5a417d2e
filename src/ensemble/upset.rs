//! Upset scoring over consensus results.
//!
//! A pure, deterministic pass that reads each contest's consensus and
//! awards points along four graduated signals: a narrow gap between the
//! top two outcomes, predictor disagreement, low mean confidence, and a
//! heavy secondary outcome. The highest-scoring contests are flagged for
//! hedged picks.

use tracing::debug;

use crate::types::{ConsensusResult, RoundKind, UpsetRisk, UpsetScore};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How many contests receive a hedged pick per round.
pub const DEFAULT_HEDGE_COUNT: usize = 4;

/// One graduated band of a signal. Tiers are checked in order and the
/// first match wins, so each list runs from most to least severe.
#[derive(Debug, Clone, Copy)]
pub struct SignalTier {
    pub threshold: f64,
    pub points: f64,
}

impl SignalTier {
    const fn new(threshold: f64, points: f64) -> Self {
        Self { threshold, points }
    }
}

/// Signal bands and risk cutoffs for upset scoring.
#[derive(Debug, Clone)]
pub struct UpsetWeights {
    /// Awarded when the top-two probability gap falls below the threshold.
    pub gap_tiers: Vec<SignalTier>,
    /// Awarded when agreement falls below the threshold.
    pub disagreement_tiers: Vec<SignalTier>,
    /// Awarded when mean confidence falls below the threshold.
    pub confidence_tiers: Vec<SignalTier>,
    /// Awarded when the secondary-outcome mass reaches the threshold.
    /// Only consulted for kinds with more than two outcomes.
    pub secondary_tiers: Vec<SignalTier>,
    /// Total score at or above this is high risk.
    pub high_risk_min: f64,
    /// Total score at or above this is medium risk.
    pub medium_risk_min: f64,
}

impl Default for UpsetWeights {
    fn default() -> Self {
        Self {
            gap_tiers: vec![
                SignalTier::new(0.10, 15.0),
                SignalTier::new(0.15, 12.0),
                SignalTier::new(0.20, 8.0),
                SignalTier::new(0.25, 4.0),
            ],
            disagreement_tiers: vec![
                SignalTier::new(0.50, 13.0),
                SignalTier::new(0.60, 8.0),
                SignalTier::new(0.70, 4.0),
            ],
            confidence_tiers: vec![
                SignalTier::new(0.40, 12.0),
                SignalTier::new(0.50, 8.0),
                SignalTier::new(0.60, 4.0),
            ],
            secondary_tiers: vec![
                SignalTier::new(0.30, 6.0),
                SignalTier::new(0.25, 4.0),
                SignalTier::new(0.20, 2.0),
            ],
            high_risk_min: 30.0,
            medium_risk_min: 15.0,
        }
    }
}

fn first_below(tiers: &[SignalTier], value: f64) -> Option<&SignalTier> {
    tiers.iter().find(|t| value < t.threshold)
}

fn first_at_or_above(tiers: &[SignalTier], value: f64) -> Option<&SignalTier> {
    tiers.iter().find(|t| value >= t.threshold)
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Scores contests for upset potential and flags the hedge set.
#[derive(Debug, Clone)]
pub struct UpsetScorer {
    weights: UpsetWeights,
    hedge_count: usize,
}

impl Default for UpsetScorer {
    fn default() -> Self {
        Self::new(UpsetWeights::default(), DEFAULT_HEDGE_COUNT)
    }
}

impl UpsetScorer {
    pub fn new(weights: UpsetWeights, hedge_count: usize) -> Self {
        Self { weights, hedge_count }
    }

    pub fn hedge_count(&self) -> usize {
        self.hedge_count
    }

    /// Score one contest's consensus. The returned score is not yet
    /// flagged for hedging; `select_hedges` does that across the round.
    pub fn score(
        &self,
        position: u32,
        consensus: &ConsensusResult,
        kind: RoundKind,
    ) -> UpsetScore {
        let mut total = 0.0;
        let mut signals = Vec::new();

        let gap = consensus.probability_gap();
        if let Some(tier) = first_below(&self.weights.gap_tiers, gap) {
            total += tier.points;
            signals.push(format!("narrow_gap({gap:.2})"));
        }

        let agreement = consensus.agreement;
        if let Some(tier) = first_below(&self.weights.disagreement_tiers, agreement) {
            total += tier.points;
            signals.push(format!("predictor_split({agreement:.2})"));
        }

        let confidence = consensus.mean_confidence;
        if let Some(tier) = first_below(&self.weights.confidence_tiers, confidence) {
            total += tier.points;
            signals.push(format!("low_confidence({confidence:.2})"));
        }

        // Two-outcome kinds have no middle ground to lean on.
        if kind.outcomes().len() > 2 {
            let mass = consensus.secondary_mass();
            if let Some(tier) = first_at_or_above(&self.weights.secondary_tiers, mass) {
                total += tier.points;
                signals.push(format!("draw_mass({mass:.2})"));
            }
        }

        let risk = if total >= self.weights.high_risk_min {
            UpsetRisk::High
        } else if total >= self.weights.medium_risk_min {
            UpsetRisk::Medium
        } else {
            UpsetRisk::Low
        };

        debug!(
            position,
            score = total,
            risk = %risk,
            signals = signals.len(),
            "Contest scored"
        );

        UpsetScore {
            position,
            score: total,
            signals,
            risk,
            hedge_outcomes: consensus.top_two_outcomes(),
            selected_for_hedge: false,
        }
    }

    /// Flag the hedge set: the `hedge_count` highest scores, ties broken
    /// by lower position. Exactly `min(hedge_count, scores.len())` entries
    /// end up flagged; everything else is cleared. Returns the selected
    /// positions in selection order.
    pub fn select_hedges(&self, scores: &mut [UpsetScore]) -> Vec<u32> {
        for s in scores.iter_mut() {
            s.selected_for_hedge = false;
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .score
                .partial_cmp(&scores[a].score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(scores[a].position.cmp(&scores[b].position))
        });

        let take = self.hedge_count.min(scores.len());
        let mut selected = Vec::with_capacity(take);
        for &idx in order.iter().take(take) {
            scores[idx].selected_for_hedge = true;
            selected.push(scores[idx].position);
        }
        selected
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
