use super::{PivotId, SegmentId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// A segment closed beyond the band by more than the break threshold.
    Break,
    /// The extension cap was reached.
    ExtensionCap,
}

/// Where a price sits relative to a pivot band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandPosition {
    Above,
    Inside,
    Below,
}

/// Consolidation band `[low, high)` formed by overlapping segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotZone {
    pub id: PivotId,
    pub low: f64,
    pub high: f64,
    pub center: f64,
    pub extend_count: usize,
    /// Forming segments followed by every extension, in order.
    pub members: Vec<SegmentId>,
    pub status: PivotStatus,
    pub close_reason: Option<CloseReason>,
    pub closed_at: Option<SegmentId>,
    /// Earliest segment a new pivot may start from once this one closes.
    pub resume_from: Option<usize>,
    /// Number of pivots merged into this one.
    pub merged: usize,
}

impl PivotZone {
    pub fn new(id: PivotId, low: f64, high: f64, members: Vec<SegmentId>) -> Self {
        Self {
            id,
            low,
            high,
            center: (low + high) / 2.0,
            extend_count: 0,
            members,
            status: PivotStatus::Active,
            close_reason: None,
            closed_at: None,
            resume_from: None,
            merged: 0,
        }
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_active(&self) -> bool {
        self.status == PivotStatus::Active
    }

    /// Half-open membership test.
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price < self.high
    }

    pub fn position_of(&self, price: f64) -> BandPosition {
        if price >= self.high {
            BandPosition::Above
        } else if price < self.low {
            BandPosition::Below
        } else {
            BandPosition::Inside
        }
    }

    pub fn first_member(&self) -> Option<SegmentId> {
        self.members.first().copied()
    }

    pub fn last_member(&self) -> Option<SegmentId> {
        self.members.last().copied()
    }

    pub(crate) fn set_band(&mut self, low: f64, high: f64) {
        self.low = low;
        self.high = high;
        self.center = (low + high) / 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> PivotZone {
        PivotZone::new(PivotId(0), 10.0, 12.0, vec![SegmentId(0), SegmentId(1), SegmentId(2)])
    }

    #[test]
    fn band_is_half_open() {
        let z = zone();
        assert!(z.contains(10.0));
        assert!(z.contains(11.99));
        assert!(!z.contains(12.0));
        assert!(!z.contains(9.99));
    }

    #[test]
    fn position_matches_half_open_band() {
        let z = zone();
        assert_eq!(z.position_of(12.0), BandPosition::Above);
        assert_eq!(z.position_of(10.0), BandPosition::Inside);
        assert_eq!(z.position_of(9.0), BandPosition::Below);
    }

    #[test]
    fn center_tracks_band() {
        let mut z = zone();
        assert_eq!(z.center, 11.0);
        z.set_band(10.5, 11.5);
        assert_eq!(z.center, 11.0);
        assert_eq!(z.width(), 1.0);
    }
}
