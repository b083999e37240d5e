//! MACD: fast EMA − slow EMA (the MACD line), its EMA (the signal line) and
//! the histogram `line − signal`.
//!
//! The signal EMA is seeded from the first `signal` valid MACD-line values,
//! so the histogram's lookback is `slow + signal − 2`.

use super::EmaState;
use crate::config::MacdConfig;

/// One streamed MACD sample; fields stay `None` during warmup.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MacdPoint {
    pub line: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdState {
    fast: EmaState,
    slow: EmaState,
    signal: EmaState,
}

impl MacdState {
    pub fn new(cfg: &MacdConfig) -> Self {
        Self {
            fast: EmaState::new(cfg.fast),
            slow: EmaState::new(cfg.slow),
            signal: EmaState::new(cfg.signal),
        }
    }

    /// Closes consumed before the first histogram value.
    pub fn lookback(&self) -> usize {
        self.fast.lookback().max(self.slow.lookback()) + self.signal.lookback()
    }

    pub fn push(&mut self, close: f64) -> MacdPoint {
        let fast = self.fast.push(close);
        let slow = self.slow.push(close);
        let line = match (fast, slow) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        };
        let signal = line.and_then(|l| self.signal.push(l));
        let histogram = match (line, signal) {
            (Some(l), Some(s)) => Some(l - s),
            _ => None,
        };
        MacdPoint {
            line,
            signal,
            histogram,
        }
    }
}
