use super::{DivergenceId, PivotId, SegmentId, StrokeId};
use crate::data::Timeframe;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Type1,
    Type2,
    Type3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Type1 => f.write_str("type1"),
            SignalKind::Type2 => f.write_str("type2"),
            SignalKind::Type3 => f.write_str("type3"),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// A matching signal found on another timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossConfirmation {
    pub level: Timeframe,
    pub kind: SignalKind,
    pub timestamp: NaiveDateTime,
    pub weight: f64,
    pub bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPoint {
    pub kind: SignalKind,
    pub side: Side,
    pub price: f64,
    pub timestamp: NaiveDateTime,
    pub raw_index: usize,
    /// Reliability before any cross-level bonus.
    pub base_reliability: f64,
    pub cross_bonus: f64,
    pub reliability: f64,
    pub pivot: Option<PivotId>,
    pub segment: Option<SegmentId>,
    pub stroke: Option<StrokeId>,
    pub divergence: Option<DivergenceId>,
    pub confirmations: Vec<CrossConfirmation>,
}

impl SignalPoint {
    pub(crate) fn new(
        kind: SignalKind,
        side: Side,
        price: f64,
        timestamp: NaiveDateTime,
        raw_index: usize,
        reliability: f64,
    ) -> Self {
        Self {
            kind,
            side,
            price,
            timestamp,
            raw_index,
            base_reliability: reliability,
            cross_bonus: 0.0,
            reliability,
            pivot: None,
            segment: None,
            stroke: None,
            divergence: None,
            confirmations: Vec::new(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        !self.confirmations.is_empty()
    }
}
