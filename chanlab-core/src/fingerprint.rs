//! Structure fingerprinting: a BLAKE3 digest of everything a level derived.
//!
//! Two runs over the same bars with the same configuration produce the same
//! fingerprint. Diagnostics are left out, so an incremental run that had to
//! rebuild still fingerprints like the batch run.

use crate::domain::{DivergenceEvent, MergedBar, PivotZone, Segment, SignalPoint, Stroke, TurningPoint};
use crate::pipeline::LevelResult;
use serde::Serialize;

#[derive(Serialize)]
struct StructureSet<'a> {
    config_hash: &'a str,
    bars: usize,
    merged: &'a [MergedBar],
    points: &'a [TurningPoint],
    strokes: &'a [Stroke],
    segments: &'a [Segment],
    pivots: &'a [PivotZone],
    divergences: &'a [DivergenceEvent],
    signals: &'a [SignalPoint],
}

/// Hex digest of the level's structures.
pub fn fingerprint(result: &LevelResult) -> String {
    let set = StructureSet {
        config_hash: &result.config_hash,
        bars: result.bars,
        merged: &result.merged,
        points: &result.points,
        strokes: &result.strokes,
        segments: &result.segments,
        pivots: &result.pivots,
        divergences: &result.divergences,
        signals: &result.signals,
    };
    // Serializing plain structs and vectors cannot fail.
    let json = serde_json::to_vec(&set).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}
