//! Price-span abstraction shared by strokes and segments.
//!
//! The pivot builder and the Type-2/Type-3 classifiers only need the span
//! of a directional move, so they are generic over [`Swing`].

use super::Direction;

pub trait Swing {
    fn direction(&self) -> Direction;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn start_price(&self) -> f64;
    fn end_price(&self) -> f64;
    /// Raw bar index of the starting extreme.
    fn start_raw(&self) -> usize;
    /// Raw bar index of the ending extreme.
    fn end_raw(&self) -> usize;

    /// Relative move, |end - start| / start.
    fn amplitude(&self) -> f64 {
        let start = self.start_price();
        if start > 0.0 {
            (self.end_price() - start).abs() / start
        } else {
            0.0
        }
    }

    /// Length of the overlap between this span and `[low, high]`.
    fn overlap(&self, low: f64, high: f64) -> f64 {
        (self.high().min(high) - self.low().max(low)).max(0.0)
    }
}
