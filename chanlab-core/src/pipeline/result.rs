//! Snapshot of one level's analysis and its summary metrics.

use crate::domain::{
    BandPosition, Direction, DivergenceEvent, MergedBar, PivotId, PivotZone, Segment,
    SignalPoint, Stroke, TurningPoint,
};
use crate::error::Diagnostic;
use serde::{Deserialize, Serialize};

/// Everything derived from one level's bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelResult {
    pub config_hash: String,
    /// Raw bars accepted after validation.
    pub bars: usize,
    pub merged: Vec<MergedBar>,
    pub points: Vec<TurningPoint>,
    pub strokes: Vec<Stroke>,
    pub segments: Vec<Segment>,
    pub pivots: Vec<PivotZone>,
    pub divergences: Vec<DivergenceEvent>,
    pub signals: Vec<SignalPoint>,
    pub summary: Summary,
    pub diagnostics: Vec<Diagnostic>,
}

impl LevelResult {
    /// True when the structures (not the diagnostics) match.
    pub fn same_structures(&self, other: &LevelResult) -> bool {
        self.bars == other.bars
            && self.merged == other.merged
            && self.points == other.points
            && self.strokes == other.strokes
            && self.segments == other.segments
            && self.pivots == other.pivots
            && self.divergences == other.divergences
            && self.signals == other.signals
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub bars: usize,
    pub merged_bars: usize,
    pub turning_points: usize,
    pub strokes: usize,
    pub segments: usize,
    pub pivots: usize,
    pub divergences: usize,
    pub signals: usize,
    /// Direction of the latest segment, or of the latest stroke if no
    /// segment exists yet.
    pub trend: Option<Direction>,
    pub trend_strength: f64,
    /// Most recent pivot still active.
    pub active_pivot: Option<PivotId>,
    pub last_close: Option<f64>,
    /// Last close relative to the active pivot's band.
    pub position: Option<BandPosition>,
}

/// Borrowed view of a level's arenas, used to build a [`Summary`].
#[derive(Debug, Clone, Copy)]
pub struct StructureView<'a> {
    pub bars: usize,
    pub last_close: Option<f64>,
    pub merged: &'a [MergedBar],
    pub points: &'a [TurningPoint],
    pub strokes: &'a [Stroke],
    pub segments: &'a [Segment],
    pub pivots: &'a [PivotZone],
    pub divergences: &'a [DivergenceEvent],
    pub signals: &'a [SignalPoint],
}

impl Summary {
    pub fn from_view(view: &StructureView<'_>) -> Self {
        let (trend, trend_strength) = match (view.segments.last(), view.strokes.last()) {
            (Some(seg), _) => (Some(seg.direction), seg.strength),
            (None, Some(stroke)) => (Some(stroke.direction), stroke.strength),
            (None, None) => (None, 0.0),
        };
        let active = view.pivots.iter().rev().find(|z| z.is_active());
        let position = match (active, view.last_close) {
            (Some(z), Some(close)) => Some(z.position_of(close)),
            _ => None,
        };
        Self {
            bars: view.bars,
            merged_bars: view.merged.len(),
            turning_points: view.points.len(),
            strokes: view.strokes.len(),
            segments: view.segments.len(),
            pivots: view.pivots.len(),
            divergences: view.divergences.len(),
            signals: view.signals.len(),
            trend,
            trend_strength,
            active_pivot: active.map(|z| z.id),
            last_close: view.last_close,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{segments_from_path, strokes_from_path};
    use crate::domain::SegmentId;

    fn view<'a>(
        strokes: &'a [Stroke],
        segments: &'a [Segment],
        pivots: &'a [PivotZone],
    ) -> StructureView<'a> {
        StructureView {
            bars: 10,
            last_close: Some(15.0),
            merged: &[],
            points: &[],
            strokes,
            segments,
            pivots,
            divergences: &[],
            signals: &[],
        }
    }

    #[test]
    fn empty_summary_has_no_trend() {
        let s = Summary::from_view(&view(&[], &[], &[]));
        assert_eq!(s.trend, None);
        assert_eq!(s.trend_strength, 0.0);
        assert_eq!(s.position, None);
        assert_eq!(s.bars, 10);
    }

    #[test]
    fn trend_falls_back_to_strokes() {
        let strokes = strokes_from_path(&[10.0, 12.0, 11.0]);
        let s = Summary::from_view(&view(&strokes, &[], &[]));
        assert_eq!(s.trend, Some(Direction::Down));
        assert_eq!(s.strokes, 2);

        let segments = segments_from_path(&[10.0, 20.0]);
        let s = Summary::from_view(&view(&strokes, &segments, &[]));
        assert_eq!(s.trend, Some(Direction::Up));
    }

    #[test]
    fn position_relative_to_active_pivot() {
        let pivot = PivotZone::new(
            PivotId(0),
            12.0,
            14.0,
            vec![SegmentId(0), SegmentId(1), SegmentId(2)],
        );
        let pivots = [pivot];
        let s = Summary::from_view(&view(&[], &[], &pivots));
        assert_eq!(s.active_pivot, Some(PivotId(0)));
        assert_eq!(s.position, Some(BandPosition::Above));
    }
}
