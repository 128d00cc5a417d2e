//! Mock predictor backend for integration testing.
//!
//! Answers every contest with one fixed probability distribution, so a
//! pool of these produces a consensus the test can compute by hand.
//! Failures and slow responses are scripted per member to exercise the
//! quorum and deadline paths.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use roundcast::predictors::{ContestContext, PredictorClient};
use roundcast::types::{Outcome, OutcomeProbs, PredictorOpinion, RoundcastError};

/// A predictor whose opinion is fixed at construction.
pub struct MockPredictor {
    pub id: String,
    home: f64,
    draw: f64,
    away: f64,
    confidence: f64,
    delay: Option<Duration>,
    calls: Arc<Mutex<u32>>,
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockPredictor {
    pub fn new(id: &str, home: f64, draw: f64, away: f64, confidence: f64) -> Self {
        Self {
            id: id.to_string(),
            home,
            draw,
            away,
            confidence,
            delay: None,
            calls: Arc::new(Mutex::new(0)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Sleep this long before answering, to simulate a slow backend.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every subsequent assessment fail with the given message.
    pub fn set_error(&self, message: &str) {
        *self.force_error.lock().unwrap() = Some(message.to_string());
    }

    /// Restore normal service.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// How many times `assess` was called, successful or not.
    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PredictorClient for MockPredictor {
    async fn assess(&self, ctx: &ContestContext) -> Result<PredictorOpinion, RoundcastError> {
        *self.calls.lock().unwrap() += 1;

        if let Some(message) = self.force_error.lock().unwrap().clone() {
            return Err(RoundcastError::PredictorUnavailable {
                predictor: self.id.clone(),
                message,
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut probs = OutcomeProbs::new();
        probs.insert(Outcome::Home, self.home);
        probs.insert(Outcome::Draw, self.draw);
        probs.insert(Outcome::Away, self.away);

        PredictorOpinion::new(
            self.id.clone(),
            probs,
            self.confidence,
            Some(format!("scripted view of contest {}", ctx.position)),
        )
    }

    fn predictor_id(&self) -> &str {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use roundcast::types::RoundKind;

    fn make_context() -> ContestContext {
        ContestContext {
            kind: RoundKind::SoccerWdl,
            round_number: 84,
            position: 7,
            slate_size: 14,
            home: "Home 7".to_string(),
            away: "Away 7".to_string(),
            league: Some("K League 1".to_string()),
            start_time: None,
        }
    }

    #[tokio::test]
    async fn test_mock_returns_configured_opinion() {
        let predictor = MockPredictor::new("gpt", 0.5, 0.3, 0.2, 0.7);
        let opinion = predictor.assess(&make_context()).await.unwrap();

        assert_eq!(opinion.predictor, "gpt");
        assert!((opinion.probability_of(Outcome::Home) - 0.5).abs() < 1e-9);
        assert!((opinion.confidence - 0.7).abs() < 1e-9);
        assert_eq!(
            opinion.rationale.as_deref(),
            Some("scripted view of contest 7")
        );
    }

    #[tokio::test]
    async fn test_mock_forced_error_and_recovery() {
        let predictor = MockPredictor::new("claude", 0.5, 0.3, 0.2, 0.7);
        predictor.set_error("quota exhausted");

        let err = predictor.assess(&make_context()).await.unwrap_err();
        assert!(matches!(err, RoundcastError::PredictorUnavailable { .. }));

        predictor.clear_error();
        assert!(predictor.assess(&make_context()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_counts_every_call() {
        let predictor = MockPredictor::new("gemini", 0.5, 0.3, 0.2, 0.7);
        predictor.set_error("down");
        predictor.assess(&make_context()).await.ok();
        predictor.clear_error();
        predictor.assess(&make_context()).await.ok();
        assert_eq!(predictor.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_delay_consumes_time() {
        let predictor =
            MockPredictor::new("kimi", 0.5, 0.3, 0.2, 0.7).with_delay(Duration::from_millis(250));

        let started = tokio::time::Instant::now();
        predictor.assess(&make_context()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
