use super::{Direction, StrokeId, Swing, SegmentId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One element of a segment's feature sequence: the span of one or more
/// counter-direction strokes after containment reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBar {
    pub high: f64,
    pub low: f64,
    pub first_stroke: StrokeId,
    pub last_stroke: StrokeId,
    /// Stroke holding the surviving extreme.
    pub rep_stroke: StrokeId,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Finalized,
    /// Trailing run with no termination yet; may still grow.
    Open,
}

/// Reason a segment was closed. Declaration order is attribution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    FeatureFractal,
    StrokeCap,
    MomentumDecay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub direction: Direction,
    pub start_stroke: StrokeId,
    pub end_stroke: StrokeId,
    pub start_index: usize,
    pub end_index: usize,
    pub start_raw: usize,
    pub end_raw: usize,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub start_price: f64,
    pub end_price: f64,
    pub high: f64,
    pub low: f64,
    /// Reduced feature sequence of the strokes inside the segment.
    pub features: Vec<FeatureBar>,
    pub integrity: f64,
    pub strength: f64,
    pub status: SegmentStatus,
    /// Primary termination cause, by priority.
    pub cause: Option<TerminationCause>,
    /// Every gate that fired on the terminating step.
    pub causes: Vec<TerminationCause>,
    /// Cleared when amplitude or integrity misses its minimum.
    pub valid: bool,
    /// Highest stroke index consulted to reach the termination decision.
    pub consulted_until: usize,
}

impl Segment {
    pub fn stroke_count(&self) -> usize {
        self.end_stroke.0 - self.start_stroke.0 + 1
    }

    pub fn is_finalized(&self) -> bool {
        self.status == SegmentStatus::Finalized
    }
}

impl Swing for Segment {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn start_price(&self) -> f64 {
        self.start_price
    }

    fn end_price(&self) -> f64 {
        self.end_price
    }

    fn start_raw(&self) -> usize {
        self.start_raw
    }

    fn end_raw(&self) -> usize {
        self.end_raw
    }
}
