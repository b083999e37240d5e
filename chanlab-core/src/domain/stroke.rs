use super::{Direction, PointId, StrokeId, Swing};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Directional move between two opposite-kind turning points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    pub direction: Direction,
    pub start: PointId,
    pub end: PointId,
    pub start_index: usize,
    pub end_index: usize,
    pub start_raw: usize,
    pub end_raw: usize,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub start_price: f64,
    pub end_price: f64,
    /// Fraction of close-to-close moves inside the span that agree with `direction`.
    pub purity: f64,
    pub strength: f64,
}

impl Stroke {
    /// Merged bars spanned, end exclusive of start.
    pub fn bar_span(&self) -> usize {
        self.end_index - self.start_index
    }
}

impl Swing for Stroke {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn high(&self) -> f64 {
        self.start_price.max(self.end_price)
    }

    fn low(&self) -> f64 {
        self.start_price.min(self.end_price)
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
