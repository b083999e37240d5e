use super::{PointId, PointKind};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Local extremum of the merged run.
///
/// Immutable after detection except for `confirmation`, which is refreshed
/// while its forward window still reaches unfinished bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurningPoint {
    pub id: PointId,
    pub kind: PointKind,
    /// Index into the merged run.
    pub merged_index: usize,
    /// Raw index of the merged bar's representative.
    pub raw_index: usize,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub strength: f64,
    /// +1 per forward bar that holds the level, -1 per breach.
    pub confirmation: i32,
}

impl TurningPoint {
    /// Confirmation counter scaled to [-1, 1] over `window` bars.
    pub fn confidence(&self, window: usize) -> f64 {
        if window == 0 {
            return 0.0;
        }
        (self.confirmation as f64 / window as f64).clamp(-1.0, 1.0)
    }

    /// True if `other` is the same kind and strictly more extreme.
    pub fn is_exceeded_by(&self, other: &TurningPoint) -> bool {
        other.kind == self.kind
            && match self.kind {
                PointKind::Top => other.price > self.price,
                PointKind::Bottom => other.price < self.price,
            }
    }
}
