//! Raw bars and their merged counterpart.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Raw OHLCV bar at a single timeframe.
///
/// `amount` is the traded value (price × volume as reported by the feed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// OHLC sanity: high >= max(open, close), low <= min(open, close), prices > 0.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
    }
}

/// A bar of the containment-free run produced by the merger.
///
/// Carries the raw index range it absorbed and the representative bar
/// (the one holding the surviving extreme), whose timestamp it reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedBar {
    /// Timestamp of the representative raw bar.
    pub timestamp: NaiveDateTime,
    /// Timestamp of the earliest absorbed raw bar.
    pub start_time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
    /// Number of raw bars absorbed.
    pub merge_count: usize,
    pub first_raw: usize,
    pub last_raw: usize,
    /// Raw index of the representative bar.
    pub rep_raw: usize,
    /// MACD histogram averaged over the absorbed bars (weighted by
    /// merge count), once warm.
    pub histogram: Option<f64>,
}

impl MergedBar {
    /// Wrap a single raw bar.
    pub fn from_raw(index: usize, bar: &Bar) -> Self {
        Self {
            timestamp: bar.timestamp,
            start_time: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            amount: bar.amount,
            merge_count: 1,
            first_raw: index,
            last_raw: index,
            rep_raw: index,
            histogram: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bar() -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
            amount: 5_150_000.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn merged_from_raw_covers_one_bar() {
        let m = MergedBar::from_raw(4, &sample_bar());
        assert_eq!(m.merge_count, 1);
        assert_eq!((m.first_raw, m.last_raw, m.rep_raw), (4, 4, 4));
        assert_eq!(m.timestamp, m.start_time);
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, deser);
    }
}
