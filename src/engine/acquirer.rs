//! Tiered slate acquisition.
//!
//! Walks the source adapters in fixed priority order: fresh cache first,
//! then a live fetch, validating each result before adoption. A slate
//! with the wrong contest count or a broken position permutation is a
//! soft failure and the next tier is tried. Only when every tier fails
//! does the durable snapshot of the primary source come into play, and
//! only the primary's: lower tiers exist to be fresher, not truer.

use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::cache::{CacheLookup, Clock, SlateCache};
use crate::sources::SourceAdapter;
use crate::types::{RoundKind, RoundcastError, Slate};

/// Priority-ordered slate acquisition over multiple sources.
pub struct TieredAcquirer {
    sources: Vec<Arc<dyn SourceAdapter>>,
    cache: Arc<SlateCache>,
    clock: Arc<dyn Clock>,
}

impl TieredAcquirer {
    /// `sources` is the priority order: index 0 is the authoritative
    /// source whose snapshot backs the last-resort fallback.
    pub fn new(sources: Vec<Arc<dyn SourceAdapter>>, cache: Arc<SlateCache>) -> Self {
        let clock = cache.clock();
        Self { sources, cache, clock }
    }

    /// The clock shared with the cache, for collaborators that stamp
    /// their own output.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Acquire a validated slate for one round kind.
    ///
    /// `force_refresh` bypasses the fresh-cache check only; validation
    /// and write-through still apply to whatever the fetch returns.
    pub async fn acquire(
        &self,
        kind: RoundKind,
        force_refresh: bool,
    ) -> Result<Slate, RoundcastError> {
        let as_of = self.clock.now().date_naive();

        for adapter in &self.sources {
            let source_id = adapter.source_id();

            if !force_refresh {
                if let CacheLookup::Fresh(slate) = self.cache.get(kind, source_id) {
                    info!(kind = %kind, source = source_id, "Using fresh cached slate");
                    return Ok(slate);
                }
            }

            let slate = match adapter.fetch_slate(kind, as_of).await {
                Ok(slate) => slate,
                Err(e) => {
                    warn!(kind = %kind, source = source_id, error = %e, "Source fetch failed, trying next tier");
                    continue;
                }
            };

            let expected = kind.slate_size();
            if slate.contests.len() != expected {
                let e = RoundcastError::SlateSizeMismatch {
                    source_id: source_id.to_string(),
                    expected,
                    actual: slate.contests.len(),
                };
                warn!(kind = %kind, source = source_id, error = %e, "Incomplete slate, trying next tier");
                continue;
            }
            if let Err(defect) = slate.validate_positions() {
                warn!(kind = %kind, source = source_id, defect = %defect, "Bad slate positions, trying next tier");
                continue;
            }

            let mut adopted = slate;
            adopted.round.fetched_at = self.clock.now();

            if let Err(e) = self.cache.put(&adopted) {
                warn!(kind = %kind, source = source_id, error = %e, "Snapshot write failed, continuing with in-memory slate");
            }

            info!(
                kind = %kind,
                source = source_id,
                round = adopted.round.round_number,
                "Slate adopted"
            );
            return Ok(adopted);
        }

        self.fallback_snapshot(kind)
    }

    /// All tiers exhausted: serve the primary source's durable snapshot
    /// regardless of age, or report the round unavailable.
    fn fallback_snapshot(&self, kind: RoundKind) -> Result<Slate, RoundcastError> {
        let Some(primary) = self.sources.first() else {
            return Err(RoundcastError::DataUnavailable { kind });
        };
        let source_id = primary.source_id();

        match self.cache.durable_snapshot(kind, source_id) {
            Ok(Some(slate)) => {
                warn!(
                    kind = %kind,
                    source = source_id,
                    round = slate.round.round_number,
                    fetched_at = %slate.round.fetched_at,
                    "All sources failed, serving stale snapshot"
                );
                Ok(slate)
            }
            Ok(None) => Err(RoundcastError::DataUnavailable { kind }),
            Err(e) => {
                warn!(kind = %kind, source = source_id, error = %e, "Snapshot unreadable");
                Err(RoundcastError::DataUnavailable { kind })
            }
        }
    }

    /// Force-fetch the current slate and report it only if its round
    /// number advances past `last_known`.
    pub async fn check_new_round(
        &self,
        kind: RoundKind,
        last_known: Option<u32>,
    ) -> Result<Option<Slate>, RoundcastError> {
        let slate = self.acquire(kind, true).await?;
        match last_known {
            Some(n) if slate.round.round_number <= n => {
                info!(kind = %kind, round = slate.round.round_number, "No new round yet");
                Ok(None)
            }
            _ => Ok(Some(slate)),
        }
    }

    /// Round number of the last good slate adopted from the primary
    /// source, read from its durable snapshot. None until the first
    /// successful acquisition ever.
    pub fn last_round_number(&self, kind: RoundKind) -> Option<u32> {
        let primary = self.sources.first()?;
        self.cache
            .durable_snapshot(kind, primary.source_id())
            .ok()
            .flatten()
            .map(|slate| slate.round.round_number)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
