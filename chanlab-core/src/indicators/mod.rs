//! Indicators feeding the divergence analyzer.
//!
//! Indicators consume one close at a time and never look ahead: the value at
//! bar t depends only on bars up to t. The pipeline keeps one [`MacdState`]
//! per level and appends its histogram as bars arrive.

pub mod ema;
pub mod macd;

pub use ema::EmaState;
pub use macd::{MacdPoint, MacdState};

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
