//! Mock slate source for integration testing.
//!
//! Serves deterministic slates with no network access. The round number,
//! contest count, and failure mode can all be changed mid-test, which is
//! how the fallback, staleness, and new-round paths get exercised.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use roundcast::sources::SourceAdapter;
use roundcast::types::{ContestEntry, RoundInfo, RoundKind, RoundStatus, RoundcastError, Slate};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Build a round header the way a vendor parser would.
pub fn make_round(kind: RoundKind, round_number: u32, source_id: &str) -> RoundInfo {
    RoundInfo {
        round_number,
        kind,
        match_date: NaiveDate::from_ymd_opt(2026, 8, 29).unwrap(),
        slate_size: kind.slate_size(),
        status: RoundStatus::Open,
        source_id: source_id.to_string(),
        deadline: None,
        fetched_at: Utc::now(),
    }
}

/// Build `n` contests at positions 1..=n.
pub fn make_contests(n: usize) -> Vec<ContestEntry> {
    (1..=n as u32)
        .map(|position| ContestEntry {
            position,
            home: format!("Home {position}"),
            away: format!("Away {position}"),
            start_time: None,
            league: Some("K League 1".to_string()),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Mock source
// ---------------------------------------------------------------------------

/// A slate source whose behaviour is scripted by the test.
pub struct MockSlateSource {
    pub id: String,
    round_number: Arc<Mutex<u32>>,
    /// When set, serve this many contests instead of the full slate.
    contest_override: Arc<Mutex<Option<usize>>>,
    fetches: Arc<Mutex<u32>>,
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockSlateSource {
    pub fn new(id: &str, round_number: u32) -> Self {
        Self {
            id: id.to_string(),
            round_number: Arc::new(Mutex::new(round_number)),
            contest_override: Arc::new(Mutex::new(None)),
            fetches: Arc::new(Mutex::new(0)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// A source that publishes an incomplete slate, as aggregators do
    /// mid-update.
    pub fn with_contest_count(id: &str, round_number: u32, contests: usize) -> Self {
        let source = Self::new(id, round_number);
        *source.contest_override.lock().unwrap() = Some(contests);
        source
    }

    /// Make every subsequent fetch fail with the given message.
    pub fn set_error(&self, message: &str) {
        *self.force_error.lock().unwrap() = Some(message.to_string());
    }

    /// Restore normal service.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Move the vendor on to a new round.
    pub fn set_round(&self, round_number: u32) {
        *self.round_number.lock().unwrap() = round_number;
    }

    /// How many times `fetch_slate` was called, successful or not.
    pub fn fetch_count(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl SourceAdapter for MockSlateSource {
    async fn fetch_slate(
        &self,
        kind: RoundKind,
        _as_of: NaiveDate,
    ) -> Result<Slate, RoundcastError> {
        *self.fetches.lock().unwrap() += 1;

        if let Some(message) = self.force_error.lock().unwrap().clone() {
            return Err(RoundcastError::SourceUnavailable {
                source_id: self.id.clone(),
                message,
            });
        }

        let round_number = *self.round_number.lock().unwrap();
        let count = self
            .contest_override
            .lock()
            .unwrap()
            .unwrap_or(kind.slate_size());

        Ok(Slate {
            round: make_round(kind, round_number, &self.id),
            contests: make_contests(count),
        })
    }

    fn source_id(&self) -> &str {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 25).unwrap()
    }

    #[tokio::test]
    async fn test_mock_serves_full_slate() {
        let source = MockSlateSource::new("betman", 84);
        let slate = source
            .fetch_slate(RoundKind::SoccerWdl, as_of())
            .await
            .unwrap();

        assert_eq!(slate.round.round_number, 84);
        assert_eq!(slate.round.source_id, "betman");
        assert_eq!(slate.contests.len(), 14);
        assert!(slate.validate_positions().is_ok());
    }

    #[tokio::test]
    async fn test_mock_honours_contest_override() {
        let source = MockSlateSource::with_contest_count("wisetoto", 84, 12);
        let slate = source
            .fetch_slate(RoundKind::SoccerWdl, as_of())
            .await
            .unwrap();
        assert_eq!(slate.contests.len(), 12);
    }

    #[tokio::test]
    async fn test_mock_forced_error_and_recovery() {
        let source = MockSlateSource::new("betman", 84);
        source.set_error("connection refused");

        let err = source
            .fetch_slate(RoundKind::SoccerWdl, as_of())
            .await
            .unwrap_err();
        assert!(matches!(err, RoundcastError::SourceUnavailable { .. }));

        source.clear_error();
        assert!(source.fetch_slate(RoundKind::SoccerWdl, as_of()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_counts_every_fetch() {
        let source = MockSlateSource::new("betman", 84);
        source.set_error("down");
        source.fetch_slate(RoundKind::SoccerWdl, as_of()).await.ok();
        source.clear_error();
        source.fetch_slate(RoundKind::SoccerWdl, as_of()).await.ok();
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_round_bump_is_visible() {
        let source = MockSlateSource::new("betman", 84);
        source.set_round(85);
        let slate = source
            .fetch_slate(RoundKind::SoccerWdl, as_of())
            .await
            .unwrap();
        assert_eq!(slate.round.round_number, 85);
    }
}
