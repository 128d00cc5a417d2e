//! In-memory slate cache with TTL freshness and durable write-through.
//!
//! Every adopted slate lands in two places: a memory entry keyed by
//! (round kind, source) that answers freshness queries, and a JSON
//! snapshot on disk that survives restarts and serves as the acquirer's
//! last-resort fallback. Freshness is judged on total elapsed time via
//! an injected clock, so tests can cross day boundaries deterministically.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::storage;
use crate::types::{RoundKind, Slate};

/// Default freshness window for cached slates, in seconds.
pub const DEFAULT_TTL_SECS: i64 = 300;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Time source for freshness decisions. Injected so replay runs and
/// tests can control elapsed time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time. The production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests and replay runs. Time only moves when
/// told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Slate cache
// ---------------------------------------------------------------------------

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Stored within the TTL window; usable without refetching.
    Fresh(Slate),
    /// Present but older than the TTL. Kept for fallback inspection.
    Stale(Slate),
    /// Never stored (or not since the process started).
    Missing,
}

struct CachedSlate {
    slate: Slate,
    stored_at: DateTime<Utc>,
}

/// Cache of the most recent slate per (round kind, source).
pub struct SlateCache {
    clock: Arc<dyn Clock>,
    state_dir: PathBuf,
    default_ttl_secs: i64,
    ttl_overrides: HashMap<String, i64>,
    entries: RwLock<HashMap<(RoundKind, String), CachedSlate>>,
}

impl SlateCache {
    pub fn new(state_dir: PathBuf, default_ttl_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state_dir,
            default_ttl_secs,
            ttl_overrides: HashMap::new(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Override the freshness window for one source.
    pub fn set_source_ttl(&mut self, source_id: impl Into<String>, ttl_secs: i64) {
        self.ttl_overrides.insert(source_id.into(), ttl_secs);
    }

    fn ttl_for(&self, source_id: &str) -> i64 {
        self.ttl_overrides
            .get(source_id)
            .copied()
            .unwrap_or(self.default_ttl_secs)
    }

    /// Look up the cached slate for one (round kind, source) pair.
    ///
    /// Freshness compares the TOTAL elapsed time against the TTL, never a
    /// wrapped sub-day component: an entry stored ten days ago is stale
    /// even if the elapsed time modulo 24h would fall inside the window.
    /// An entry stamped in the future counts as stale.
    pub fn get(&self, kind: RoundKind, source_id: &str) -> CacheLookup {
        let entries = self.entries.read().unwrap();
        let Some(entry) = entries.get(&(kind, source_id.to_string())) else {
            debug!(kind = %kind, source = source_id, "Cache miss");
            return CacheLookup::Missing;
        };

        let elapsed_secs = self
            .clock
            .now()
            .signed_duration_since(entry.stored_at)
            .num_seconds();
        let ttl = self.ttl_for(source_id);

        if (0..ttl).contains(&elapsed_secs) {
            debug!(kind = %kind, source = source_id, elapsed_secs, ttl, "Cache hit (fresh)");
            CacheLookup::Fresh(entry.slate.clone())
        } else {
            debug!(kind = %kind, source = source_id, elapsed_secs, ttl, "Cache hit (stale)");
            CacheLookup::Stale(entry.slate.clone())
        }
    }

    /// Store a validated slate: memory entry plus durable snapshot.
    ///
    /// The memory write always happens; the snapshot write can fail (disk
    /// full, permissions) and the error is returned for the caller to log.
    pub fn put(&self, slate: &Slate) -> Result<()> {
        let key = (slate.round.kind, slate.round.source_id.clone());
        {
            let mut entries = self.entries.write().unwrap();
            entries.insert(
                key,
                CachedSlate {
                    slate: slate.clone(),
                    stored_at: self.clock.now(),
                },
            );
        }
        storage::save_snapshot(&self.state_dir, slate)
    }

    /// Load the durable snapshot for one (round kind, source) pair,
    /// regardless of age.
    pub fn durable_snapshot(&self, kind: RoundKind, source_id: &str) -> Result<Option<Slate>> {
        storage::load_snapshot(&self.state_dir, kind, source_id)
    }

    /// Shared clock handle, for collaborators that stamp timestamps.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
