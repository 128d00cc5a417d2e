//! Shared types for the ROUNDCAST pipeline.
//!
//! These types form the data model used across all modules: the acquired
//! round slate, predictor opinions, consensus results, upset scores, and
//! the final `RoundPredictionSet` artifact. Invariants (slate size,
//! position contiguity, probability sums) are enforced by the validated
//! constructors here and never relaxed downstream.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Probability maps
// ---------------------------------------------------------------------------

/// Tolerance for probability-map sums: every map must sum to 1 ± this.
pub const PROB_EPSILON: f64 = 1e-3;

/// Per-outcome probability distribution. `BTreeMap` keeps iteration in
/// `Outcome` order, which makes top-outcome tie-breaking deterministic.
pub type OutcomeProbs = BTreeMap<Outcome, f64>;

/// Sum of a probability map.
pub fn probs_total(probs: &OutcomeProbs) -> f64 {
    probs.values().sum()
}

/// Whether a probability map satisfies the sum invariant.
pub fn probs_sum_valid(probs: &OutcomeProbs) -> bool {
    (probs_total(probs) - 1.0).abs() <= PROB_EPSILON
}

// ---------------------------------------------------------------------------
// Round enums
// ---------------------------------------------------------------------------

/// A fixed-slate prediction product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundKind {
    /// Soccer win/draw/lose, 14 contests per round.
    SoccerWdl,
    /// Basketball win/within-5/lose, 14 contests per round.
    BasketballW5l,
}

// Round-number estimation anchors. Rounds are published on a fixed cadence,
// so a round number can be derived from the contest date when a source
// omits it. The anchors need a periodic refresh when the season resets.
const SOCCER_BASE_DATE: (i32, u32, u32) = (2025, 12, 27);
const SOCCER_BASE_ROUND: i64 = 84;
const BASKETBALL_BASE_DATE: (i32, u32, u32) = (2024, 10, 19);
const BASKETBALL_BASE_ROUND: i64 = 1;

impl RoundKind {
    /// All supported round kinds.
    pub const ALL: &'static [RoundKind] = &[RoundKind::SoccerWdl, RoundKind::BasketballW5l];

    /// Number of contests in one round slate. A domain constant, not a
    /// configuration knob: the downstream wagering product is all-or-nothing
    /// over exactly this many contests.
    pub fn slate_size(&self) -> usize {
        match self {
            RoundKind::SoccerWdl => 14,
            RoundKind::BasketballW5l => 14,
        }
    }

    /// The fixed outcome set for this kind. For basketball the `Draw`
    /// slot is the within-5-points band.
    pub fn outcomes(&self) -> &'static [Outcome] {
        match self {
            RoundKind::SoccerWdl => &[Outcome::Home, Outcome::Draw, Outcome::Away],
            RoundKind::BasketballW5l => &[Outcome::Home, Outcome::Draw, Outcome::Away],
        }
    }

    /// Stable string form used in cache keys, file names, and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundKind::SoccerWdl => "soccer_wdl",
            RoundKind::BasketballW5l => "basketball_w5l",
        }
    }

    /// Estimate the round number for a contest date from the publication
    /// cadence: soccer rounds advance weekly, basketball every two days.
    pub fn estimated_round_number(&self, date: NaiveDate) -> u32 {
        let (anchor, base_round, cadence_days) = match self {
            RoundKind::SoccerWdl => (SOCCER_BASE_DATE, SOCCER_BASE_ROUND, 7),
            RoundKind::BasketballW5l => (BASKETBALL_BASE_DATE, BASKETBALL_BASE_ROUND, 2),
        };
        let base = NaiveDate::from_ymd_opt(anchor.0, anchor.1, anchor.2)
            .unwrap_or(date);
        let days = date.signed_duration_since(base).num_days();
        let estimate = base_round + days.div_euclid(cadence_days);
        estimate.max(1) as u32
    }
}

impl fmt::Display for RoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempt to parse a string into a RoundKind (case-insensitive).
impl std::str::FromStr for RoundKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "soccer_wdl" | "soccer" => Ok(RoundKind::SoccerWdl),
            "basketball_w5l" | "basketball" => Ok(RoundKind::BasketballW5l),
            _ => Err(anyhow::anyhow!("Unknown round kind: {s}")),
        }
    }
}

/// One contest outcome. `Draw` doubles as the basketball within-5 band.
/// The derived `Ord` fixes tie-break order: Home before Draw before Away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    /// JSON payload key used by predictor backends.
    pub fn key(&self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }

    /// Short result code as printed on betting slips.
    pub fn code(&self, kind: RoundKind) -> &'static str {
        match kind {
            RoundKind::SoccerWdl => match self {
                Outcome::Home => "1",
                Outcome::Draw => "X",
                Outcome::Away => "2",
            },
            RoundKind::BasketballW5l => match self {
                Outcome::Home => "W",
                Outcome::Draw => "5",
                Outcome::Away => "L",
            },
        }
    }

    /// Human label for predictor prompts.
    pub fn label(&self, kind: RoundKind) -> &'static str {
        match kind {
            RoundKind::SoccerWdl => match self {
                Outcome::Home => "home win",
                Outcome::Draw => "draw",
                Outcome::Away => "away win",
            },
            RoundKind::BasketballW5l => match self {
                Outcome::Home => "home win by 6 or more",
                Outcome::Draw => "margin within 5 points",
                Outcome::Away => "away win by 6 or more",
            },
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Round lifecycle status as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatus {
    Scheduled,
    Open,
    Closed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Scheduled => write!(f, "scheduled"),
            RoundStatus::Open => write!(f, "open"),
            RoundStatus::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Acquired slate
// ---------------------------------------------------------------------------

/// Metadata for one published round. Immutable once constructed; every
/// successful acquisition produces a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub round_number: u32,
    pub kind: RoundKind,
    /// Date of the first contest day.
    pub match_date: NaiveDate,
    /// Slate size for this round (always `kind.slate_size()`).
    pub slate_size: usize,
    pub status: RoundStatus,
    /// Identifier of the source adapter that produced this round.
    pub source_id: String,
    /// Sale deadline, when the source exposes one.
    pub deadline: Option<DateTime<Utc>>,
    /// When the slate was adopted by the acquirer.
    pub fetched_at: DateTime<Utc>,
}

impl fmt::Display for RoundInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] round {} ({} contests, {}, via {})",
            self.kind, self.round_number, self.slate_size, self.status, self.source_id,
        )
    }
}

impl RoundInfo {
    /// Helper to build a test round with sensible defaults.
    #[cfg(test)]
    pub fn sample(kind: RoundKind, round_number: u32) -> Self {
        RoundInfo {
            round_number,
            kind,
            match_date: NaiveDate::from_ymd_opt(2026, 8, 29).unwrap(),
            slate_size: kind.slate_size(),
            status: RoundStatus::Open,
            source_id: "betman".to_string(),
            deadline: None,
            fetched_at: Utc::now(),
        }
    }
}

/// One contest within a round, at a fixed position. Never mutated after
/// creation; owned by the `RoundInfo` that contains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestEntry {
    /// Position within the slate, 1-based and unique.
    pub position: u32,
    pub home: String,
    pub away: String,
    pub start_time: Option<DateTime<Utc>>,
    pub league: Option<String>,
}

impl fmt::Display for ContestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}. {} vs {}", self.position, self.home, self.away)?;
        if let Some(league) = &self.league {
            write!(f, " ({league})")?;
        }
        Ok(())
    }
}

impl ContestEntry {
    /// Helper to build a test contest at a given position.
    #[cfg(test)]
    pub fn sample(position: u32) -> Self {
        ContestEntry {
            position,
            home: format!("Home {position}"),
            away: format!("Away {position}"),
            start_time: None,
            league: Some("K League 1".to_string()),
        }
    }
}

/// A round plus its contest list, as returned by a source adapter.
///
/// Adapters return whatever they parsed; the acquirer validates the
/// contest count and position permutation before adoption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slate {
    pub round: RoundInfo,
    pub contests: Vec<ContestEntry>,
}

impl Slate {
    /// Check that positions form a contiguous 1..len permutation with no
    /// duplicates. Returns a description of the first defect found.
    pub fn validate_positions(&self) -> Result<(), String> {
        let n = self.contests.len();
        let mut seen = vec![false; n];
        for contest in &self.contests {
            let pos = contest.position as usize;
            if pos == 0 || pos > n {
                return Err(format!("contest position {pos} outside 1..={n}"));
            }
            if seen[pos - 1] {
                return Err(format!("duplicate contest position {pos}"));
            }
            seen[pos - 1] = true;
        }
        Ok(())
    }

    /// Whether the contest count matches the round kind's slate size.
    pub fn is_complete(&self) -> bool {
        self.contests.len() == self.round.kind.slate_size()
    }
}

// ---------------------------------------------------------------------------
// Predictor opinions
// ---------------------------------------------------------------------------

/// One predictor backend's probability assessment of a single contest.
/// Created per call, consumed by the consensus, not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorOpinion {
    pub predictor: String,
    pub probs: OutcomeProbs,
    /// Self-reported confidence in [0, 1].
    pub confidence: f64,
    pub rationale: Option<String>,
}

impl PredictorOpinion {
    /// Construct an opinion, enforcing the probability-sum and confidence
    /// range invariants at the boundary.
    pub fn new(
        predictor: impl Into<String>,
        probs: OutcomeProbs,
        confidence: f64,
        rationale: Option<String>,
    ) -> Result<Self, RoundcastError> {
        let predictor = predictor.into();
        if !probs_sum_valid(&probs) {
            return Err(RoundcastError::PredictorMalformed {
                predictor,
                message: format!("probabilities sum to {:.4}, expected 1.0", probs_total(&probs)),
            });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(RoundcastError::PredictorMalformed {
                predictor,
                message: format!("confidence {confidence} outside [0, 1]"),
            });
        }
        Ok(PredictorOpinion { predictor, probs, confidence, rationale })
    }

    /// Probability this opinion assigns to a given outcome.
    pub fn probability_of(&self, outcome: Outcome) -> f64 {
        self.probs.get(&outcome).copied().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

/// Aggregated ensemble view of one contest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub probs: OutcomeProbs,
    /// Inter-predictor agreement in [0, 1]; 1 means all survivors put
    /// near-identical probability on the top outcome.
    pub agreement: f64,
    /// Mean self-reported confidence of the surviving predictors.
    pub mean_confidence: f64,
    /// Predictor identities that contributed (quorum membership).
    pub contributors: Vec<String>,
    /// True when fewer predictors survived than the quorum requires.
    pub degraded: bool,
}

impl ConsensusResult {
    /// Construct a consensus, enforcing the probability-sum invariant.
    /// A breach here is a programming defect, not bad input data.
    pub fn new(
        probs: OutcomeProbs,
        agreement: f64,
        mean_confidence: f64,
        contributors: Vec<String>,
        degraded: bool,
    ) -> Result<Self, RoundcastError> {
        if !probs_sum_valid(&probs) {
            return Err(RoundcastError::Invariant(format!(
                "consensus probabilities sum to {:.4}, expected 1.0",
                probs_total(&probs)
            )));
        }
        if !(0.0..=1.0).contains(&agreement) {
            return Err(RoundcastError::Invariant(format!(
                "agreement {agreement} outside [0, 1]"
            )));
        }
        if !(0.0..=1.0).contains(&mean_confidence) {
            return Err(RoundcastError::Invariant(format!(
                "mean confidence {mean_confidence} outside [0, 1]"
            )));
        }
        Ok(ConsensusResult { probs, agreement, mean_confidence, contributors, degraded })
    }

    /// The consensus top outcome and its probability. Ties resolve to the
    /// smallest `Outcome` (map iteration order), deterministically.
    pub fn top_outcome(&self) -> (Outcome, f64) {
        let mut best = (Outcome::Home, f64::MIN);
        for (&outcome, &p) in &self.probs {
            if p > best.1 {
                best = (outcome, p);
            }
        }
        best
    }

    /// Gap between the top two consensus probabilities.
    pub fn probability_gap(&self) -> f64 {
        let mut sorted: Vec<f64> = self.probs.values().copied().collect();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        match (sorted.first(), sorted.get(1)) {
            (Some(top), Some(second)) => top - second,
            _ => 1.0,
        }
    }

    /// Probability mass on the draw-band outcome when it is not leading.
    pub fn secondary_mass(&self) -> f64 {
        let (top, _) = self.top_outcome();
        if top == Outcome::Draw {
            0.0
        } else {
            self.probs.get(&Outcome::Draw).copied().unwrap_or(0.0)
        }
    }

    /// The two strongest outcomes (for hedged selection cover).
    pub fn top_two_outcomes(&self) -> Vec<Outcome> {
        let mut ranked: Vec<(Outcome, f64)> =
            self.probs.iter().map(|(&o, &p)| (o, p)).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.into_iter().take(2).map(|(o, _)| o).collect()
    }
}

impl fmt::Display for ConsensusResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .probs
            .iter()
            .map(|(o, p)| format!("{}: {:.0}%", o, p * 100.0))
            .collect();
        write!(
            f,
            "{} (agreement {:.2}, {} predictors{})",
            parts.join(" | "),
            self.agreement,
            self.contributors.len(),
            if self.degraded { ", degraded" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Upset scoring
// ---------------------------------------------------------------------------

/// Risk band derived from the numeric upset score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsetRisk {
    High,
    Medium,
    Low,
}

impl fmt::Display for UpsetRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsetRisk::High => write!(f, "high"),
            UpsetRisk::Medium => write!(f, "medium"),
            UpsetRisk::Low => write!(f, "low"),
        }
    }
}

/// Per-contest upset assessment: how likely the consensus favourite is to
/// be wrong, and whether the contest is worth hedging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsetScore {
    pub position: u32,
    /// Accumulated signal points; higher means more uncertain.
    pub score: f64,
    /// Names of the signals that triggered, in evaluation order.
    pub signals: Vec<String>,
    pub risk: UpsetRisk,
    /// The outcomes to cover if this contest is hedged (top two by
    /// consensus probability).
    pub hedge_outcomes: Vec<Outcome>,
    pub selected_for_hedge: bool,
}

// ---------------------------------------------------------------------------
// Round prediction set
// ---------------------------------------------------------------------------

/// Everything the ensemble produced for one contest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestPrediction {
    pub entry: ContestEntry,
    pub consensus: ConsensusResult,
    pub upset: UpsetScore,
}

/// The single output artifact of a pipeline run: the acquired round, one
/// prediction per contest, and the hedge selection. Immutable once
/// produced; handed by reference to downstream collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPredictionSet {
    pub run_id: String,
    pub round: RoundInfo,
    pub contests: Vec<ContestPrediction>,
    /// Fixed hedge budget K for this round kind.
    pub hedge_count: usize,
    /// Selected contest positions, ordered by descending upset score,
    /// ties by ascending position.
    pub selected_positions: Vec<u32>,
    pub generated_at: DateTime<Utc>,
}

impl RoundPredictionSet {
    /// Construct and validate the final artifact. This is the last line of
    /// defence: any breach here means a bug upstream, reported as
    /// `Invariant` and fatal to the run.
    pub fn new(
        round: RoundInfo,
        contests: Vec<ContestPrediction>,
        hedge_count: usize,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, RoundcastError> {
        let expected = round.kind.slate_size();
        if contests.len() != expected {
            return Err(RoundcastError::Invariant(format!(
                "prediction set has {} contests, round kind requires {expected}",
                contests.len()
            )));
        }
        if hedge_count > expected {
            return Err(RoundcastError::Invariant(format!(
                "hedge count {hedge_count} exceeds slate size {expected}"
            )));
        }

        let slate_view = Slate {
            round: round.clone(),
            contests: contests.iter().map(|c| c.entry.clone()).collect(),
        };
        slate_view.validate_positions().map_err(RoundcastError::Invariant)?;

        for contest in &contests {
            if !probs_sum_valid(&contest.consensus.probs) {
                return Err(RoundcastError::Invariant(format!(
                    "contest {} consensus probabilities sum to {:.4}",
                    contest.entry.position,
                    probs_total(&contest.consensus.probs)
                )));
            }
            if contest.upset.position != contest.entry.position {
                return Err(RoundcastError::Invariant(format!(
                    "upset score position {} does not match contest {}",
                    contest.upset.position, contest.entry.position
                )));
            }
        }

        let mut selected: Vec<(f64, u32)> = contests
            .iter()
            .filter(|c| c.upset.selected_for_hedge)
            .map(|c| (c.upset.score, c.entry.position))
            .collect();
        let want = hedge_count.min(contests.len());
        if selected.len() != want {
            return Err(RoundcastError::Invariant(format!(
                "{} contests selected for hedge, expected exactly {want}",
                selected.len()
            )));
        }
        selected.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        let selected_positions = selected.into_iter().map(|(_, pos)| pos).collect();

        Ok(RoundPredictionSet {
            run_id: uuid::Uuid::new_v4().to_string(),
            round,
            contests,
            hedge_count,
            selected_positions,
            generated_at,
        })
    }

    /// Contests flagged for hedged selection, in selection order.
    pub fn hedged_contests(&self) -> Vec<&ContestPrediction> {
        self.selected_positions
            .iter()
            .filter_map(|pos| self.contests.iter().find(|c| c.entry.position == *pos))
            .collect()
    }

    /// Number of contests whose consensus is degraded.
    pub fn degraded_count(&self) -> usize {
        self.contests.iter().filter(|c| c.consensus.degraded).count()
    }
}

impl fmt::Display for RoundPredictionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} contests, {} hedged, {} degraded",
            self.round,
            self.contests.len(),
            self.selected_positions.len(),
            self.degraded_count(),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error taxonomy for ROUNDCAST.
///
/// Source-class errors drive the acquirer's tier advance; predictor-class
/// errors are absorbed by the quorum; only `DataUnavailable` and
/// `Invariant` ever reach the pipeline caller.
#[derive(Debug, thiserror::Error)]
pub enum RoundcastError {
    #[error("Source timeout ({source_id}): {message}")]
    SourceTimeout { source_id: String, message: String },

    #[error("Source parse failure ({source_id}): {message}")]
    SourceParse { source_id: String, message: String },

    #[error("Source unavailable ({source_id}): {message}")]
    SourceUnavailable { source_id: String, message: String },

    #[error("Slate size mismatch ({source_id}): expected {expected} contests, got {actual}")]
    SlateSizeMismatch {
        source_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("No usable slate for {kind} from any source")]
    DataUnavailable { kind: RoundKind },

    #[error("Predictor timeout ({predictor}) after {deadline_secs}s")]
    PredictorTimeout { predictor: String, deadline_secs: u64 },

    #[error("Predictor unavailable ({predictor}): {message}")]
    PredictorUnavailable { predictor: String, message: String },

    #[error("Malformed predictor response ({predictor}): {message}")]
    PredictorMalformed { predictor: String, message: String },

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
