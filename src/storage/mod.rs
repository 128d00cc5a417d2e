//! Persistence layer.
//!
//! Two concerns live here: durable slate snapshots (the acquirer's
//! last-resort fallback when every source fails) and the per-round
//! prediction artifacts. Both are plain JSON files; a database can be
//! added later if history queries ever need one.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{RoundKind, RoundPredictionSet, Slate};

/// Default directory for durable slate snapshots.
pub const DEFAULT_STATE_DIR: &str = ".state";

/// Default directory for round prediction artifacts.
pub const DEFAULT_PREDICTIONS_DIR: &str = "predictions";

/// Snapshot file for one (round kind, source) pair. One file per pair:
/// a newer slate from the same source overwrites the previous one.
pub fn snapshot_path(dir: &Path, kind: RoundKind, source_id: &str) -> PathBuf {
    dir.join(format!("{kind}_{source_id}_slate.json"))
}

/// Persist a validated slate as the durable snapshot for its source.
pub fn save_snapshot(dir: &Path, slate: &Slate) -> Result<()> {
    std::fs::create_dir_all(dir)
        .context(format!("Failed to create snapshot dir {}", dir.display()))?;

    let path = snapshot_path(dir, slate.round.kind, &slate.round.source_id);
    let json = serde_json::to_string_pretty(slate)
        .context("Failed to serialise slate snapshot")?;
    std::fs::write(&path, &json)
        .context(format!("Failed to write snapshot to {}", path.display()))?;

    debug!(
        path = %path.display(),
        round = slate.round.round_number,
        "Slate snapshot saved"
    );
    Ok(())
}

/// Load the durable snapshot for one (round kind, source) pair.
/// Returns None if no snapshot has ever been written.
pub fn load_snapshot(dir: &Path, kind: RoundKind, source_id: &str) -> Result<Option<Slate>> {
    let path = snapshot_path(dir, kind, source_id);

    if !path.exists() {
        debug!(path = %path.display(), "No slate snapshot on disk");
        return Ok(None);
    }

    let json = std::fs::read_to_string(&path)
        .context(format!("Failed to read snapshot from {}", path.display()))?;
    let slate: Slate = serde_json::from_str(&json)
        .context(format!("Failed to parse snapshot from {}", path.display()))?;

    info!(
        path = %path.display(),
        round = slate.round.round_number,
        source = %slate.round.source_id,
        "Slate snapshot loaded from disk"
    );
    Ok(Some(slate))
}

/// Delete one snapshot file (for testing or reset).
pub fn delete_snapshot(dir: &Path, kind: RoundKind, source_id: &str) -> Result<()> {
    let path = snapshot_path(dir, kind, source_id);
    if path.exists() {
        std::fs::remove_file(&path)
            .context(format!("Failed to delete snapshot {}", path.display()))?;
    }
    Ok(())
}

/// Artifact file for one round's prediction set.
pub fn prediction_set_path(dir: &Path, set: &RoundPredictionSet) -> PathBuf {
    dir.join(format!(
        "{}_round{}_predictions.json",
        set.round.kind, set.round.round_number
    ))
}

/// Persist the final prediction artifact and return where it landed.
pub fn save_prediction_set(dir: &Path, set: &RoundPredictionSet) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .context(format!("Failed to create predictions dir {}", dir.display()))?;

    let path = prediction_set_path(dir, set);
    let json = serde_json::to_string_pretty(set)
        .context("Failed to serialise prediction set")?;
    std::fs::write(&path, &json)
        .context(format!("Failed to write prediction set to {}", path.display()))?;

    info!(
        path = %path.display(),
        run_id = %set.run_id,
        round = set.round.round_number,
        "Prediction set saved"
    );
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
