use super::{DivergenceId, PivotId, SegmentId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    Top,
    Bottom,
}

/// Which pair of regions was compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceSource {
    /// Segment entering a pivot vs. the same-direction segment leaving it.
    Segment,
    /// Histogram regions k-2 and k of the same sign.
    Streaming,
}

/// Maximal run of same-sign MACD histogram values (zeros join the run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramRegion {
    /// True for a positive (bullish momentum) run.
    pub positive: bool,
    pub start: usize,
    pub end: usize,
    /// Σ|histogram| over the run.
    pub area: f64,
    /// Highest high (positive) or lowest low (negative) inside the run.
    pub extreme_price: f64,
    pub extreme_raw: usize,
    /// False while the run is still the last one.
    pub closed: bool,
}

/// Raw-bar extent of one side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpan {
    pub start_raw: usize,
    pub end_raw: usize,
    pub area: f64,
    pub extreme_price: f64,
    pub extreme_raw: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceEvent {
    pub id: DivergenceId,
    pub kind: DivergenceKind,
    pub source: DivergenceSource,
    pub earlier: RegionSpan,
    pub later: RegionSpan,
    /// later.area / earlier.area (magnitudes).
    pub area_ratio: f64,
    /// |later extreme - earlier extreme| / earlier extreme.
    pub price_change: f64,
    /// Raw index of the confirming MACD cross.
    pub cross_raw: usize,
    /// Timestamp of the later extreme.
    pub timestamp: NaiveDateTime,
    pub reliability: f64,
    pub pivot: Option<PivotId>,
    pub entering: Option<SegmentId>,
    pub leaving: Option<SegmentId>,
}
