//! Exponential moving average, one value at a time.
//!
//! The first `period` inputs are averaged into the seed; after that each
//! input is blended in with weight `alpha = 2 / (period + 1)`.
//! Nothing is emitted before the seed, so the lookback is `period - 1`.

#[derive(Debug, Clone, PartialEq)]
pub struct EmaState {
    period: usize,
    alpha: f64,
    seen: usize,
    sum: f64,
    value: Option<f64>,
}

impl EmaState {
    /// A zero period is treated as 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seen: 0,
            sum: 0.0,
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Inputs consumed before the first value comes out.
    pub fn lookback(&self) -> usize {
        self.period - 1
    }

    /// Feed the next finite value; returns the EMA once seeded.
    pub fn push(&mut self, v: f64) -> Option<f64> {
        self.value = match self.value {
            Some(prev) => Some(self.alpha * v + (1.0 - self.alpha) * prev),
            None => {
                self.seen += 1;
                self.sum += v;
                (self.seen == self.period).then(|| self.sum / self.period as f64)
            }
        };
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}
