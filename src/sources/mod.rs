//! Round data sources.
//!
//! Defines the `SourceAdapter` trait and provides implementations for:
//! - Betman — the official vendor site, authoritative slate and deadlines
//! - Wisetoto — aggregator mirror, first fallback
//! - KSPO — public open-data API, last fallback
//!
//! Adapters fetch and parse only. Freshness, validation, and fallback
//! policy belong to the acquirer.

pub mod betman;
pub mod kspo;
pub mod wisetoto;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::types::{RoundKind, RoundcastError, Slate};

/// Abstraction over round slate providers.
///
/// Implementors return whatever the upstream currently publishes for the
/// given round kind; the acquirer decides whether the result is usable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch the current round slate for one round kind.
    ///
    /// `as_of` is the acquisition date, used for round-number estimation
    /// and date-window queries where the upstream needs one.
    async fn fetch_slate(&self, kind: RoundKind, as_of: NaiveDate)
        -> Result<Slate, RoundcastError>;

    /// Stable identifier used in cache keys, snapshot files, and logs.
    fn source_id(&self) -> &str;
}

/// Map a transport-layer failure onto the source error taxonomy.
pub(crate) fn classify_transport(source_id: &str, err: reqwest::Error) -> RoundcastError {
    if err.is_timeout() {
        RoundcastError::SourceTimeout {
            source_id: source_id.to_string(),
            message: err.to_string(),
        }
    } else if err.is_decode() {
        RoundcastError::SourceParse {
            source_id: source_id.to_string(),
            message: err.to_string(),
        }
    } else {
        RoundcastError::SourceUnavailable {
            source_id: source_id.to_string(),
            message: err.to_string(),
        }
    }
}

/// Build a source parse error.
pub(crate) fn parse_error(source_id: &str, message: impl Into<String>) -> RoundcastError {
    RoundcastError::SourceParse {
        source_id: source_id.to_string(),
        message: message.into(),
    }
}

/// Interpret a contest start time published in Korea Standard Time.
///
/// `raw_time` is "HHMM" or "HH:MM" as the vendors print it. Returns None
/// for anything unparseable; start times are optional metadata.
pub(crate) fn kst_start_time(date: NaiveDate, raw_time: &str) -> Option<DateTime<Utc>> {
    let digits: String = raw_time.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return None;
    }
    let hour: u32 = digits[0..2].parse().ok()?;
    let minute: u32 = digits[2..4].parse().ok()?;

    let kst = FixedOffset::east_opt(9 * 3600)?;
    let local = date.and_hms_opt(hour, minute, 0)?;
    let in_kst = kst.from_local_datetime(&local).single()?;
    Some(in_kst.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
