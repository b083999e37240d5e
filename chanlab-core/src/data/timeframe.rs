//! Timeframes and bar resampling.

use crate::domain::Bar;
use chrono::{DateTime, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: i64 = 86_400;

/// Bar granularity. Declaration order runs from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
}

impl Timeframe {
    /// Returns the duration of this timeframe in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::Min1 => 60,
            Timeframe::Min5 => 5 * 60,
            Timeframe::Min15 => 15 * 60,
            Timeframe::Min30 => 30 * 60,
            Timeframe::Hour1 => 60 * 60,
            Timeframe::Day1 => SECONDS_PER_DAY,
            Timeframe::Week1 => 7 * SECONDS_PER_DAY,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Returns a short label for this timeframe.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Min30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
        }
    }

    /// Returns all available timeframes in order.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::Min1,
            Timeframe::Min5,
            Timeframe::Min15,
            Timeframe::Min30,
            Timeframe::Hour1,
            Timeframe::Day1,
            Timeframe::Week1,
        ]
    }

    /// Position from finest (0) to coarsest.
    pub fn rank(&self) -> usize {
        *self as usize
    }

    pub fn is_intraday(&self) -> bool {
        self.seconds() < SECONDS_PER_DAY
    }

    /// Start of the bucket containing `ts`. Weeks start on Monday.
    pub fn bucket_start(&self, ts: NaiveDateTime) -> NaiveDateTime {
        let secs = ts.and_utc().timestamp();
        let start = match self {
            Timeframe::Week1 => {
                // 1970-01-01 was a Thursday; shift so buckets begin on Monday.
                let day = secs.div_euclid(SECONDS_PER_DAY);
                let monday = (day + 3).div_euclid(7) * 7 - 3;
                monday * SECONDS_PER_DAY
            }
            _ => secs.div_euclid(self.seconds()) * self.seconds(),
        };
        DateTime::from_timestamp(start, 0)
            .map(|d| d.naive_utc())
            .unwrap_or(ts)
    }

    /// Aggregate finer bars into this timeframe.
    ///
    /// Bars are bucketed by [`Timeframe::bucket_start`]; each bucket takes the
    /// first open, max high, min low, last close and summed volume/amount, and
    /// is stamped with its bucket start.
    pub fn resample(&self, bars: &[Bar]) -> Vec<Bar> {
        let mut aggregated: Vec<Bar> = Vec::new();
        let mut current: Option<Bar> = None;

        for bar in bars {
            let bucket = self.bucket_start(bar.timestamp);
            match current.as_mut() {
                Some(agg) if agg.timestamp == bucket => {
                    agg.high = agg.high.max(bar.high);
                    agg.low = agg.low.min(bar.low);
                    agg.close = bar.close;
                    agg.volume += bar.volume;
                    agg.amount += bar.amount;
                }
                _ => {
                    if let Some(done) = current.take() {
                        aggregated.push(done);
                    }
                    current = Some(Bar {
                        timestamp: bucket,
                        ..bar.clone()
                    });
                }
            }
        }

        if let Some(agg) = current {
            aggregated.push(agg);
        }
        aggregated
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown timeframe '{0}'")]
pub struct UnknownTimeframe(pub String);

impl FromStr for Timeframe {
    type Err = UnknownTimeframe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::all()
            .iter()
            .copied()
            .find(|tf| tf.label() == s)
            .ok_or_else(|| UnknownTimeframe(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::bars_from_closes_at;
    use chrono::{Datelike, NaiveDate, Weekday};

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn ordered_fine_to_coarse() {
        let all = Timeframe::all();
        assert!(all.windows(2).all(|w| w[0] < w[1] && w[0].seconds() < w[1].seconds()));
        assert!(all.iter().enumerate().all(|(i, tf)| tf.rank() == i));
    }

    #[test]
    fn label_roundtrips_through_from_str() {
        for tf in Timeframe::all() {
            assert_eq!(tf.label().parse::<Timeframe>().unwrap(), *tf);
        }
        assert!("2h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn serde_uses_labels() {
        assert_eq!(serde_json::to_string(&Timeframe::Min15).unwrap(), "\"15m\"");
        let tf: Timeframe = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(tf, Timeframe::Day1);
    }

    #[test]
    fn intraday_buckets_floor() {
        assert_eq!(Timeframe::Min5.bucket_start(ts(2, 9, 37)), ts(2, 9, 35));
        assert_eq!(Timeframe::Hour1.bucket_start(ts(2, 9, 59)), ts(2, 9, 0));
        assert_eq!(Timeframe::Day1.bucket_start(ts(2, 15, 0)), ts(2, 0, 0));
    }

    #[test]
    fn week_buckets_start_monday() {
        // 2024-01-04 is a Thursday.
        let start = Timeframe::Week1.bucket_start(ts(4, 12, 0));
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(start, ts(1, 0, 0));
    }

    #[test]
    fn resample_aggregates_ohlcv() {
        let bars = bars_from_closes_at(
            &[10.0, 12.0, 11.0, 13.0, 9.0, 10.0],
            0.5,
            ts(2, 9, 30),
            Duration::minutes(1),
        );
        let five = Timeframe::Min5.resample(&bars);
        // 09:30..09:34 is one bucket, 09:35 starts the next.
        assert_eq!(five.len(), 2);
        assert_eq!(five[0].timestamp, ts(2, 9, 30));
        assert_eq!(five[0].open, bars[0].open);
        assert_eq!(five[0].close, 9.0);
        assert_eq!(five[0].high, 13.5);
        assert_eq!(five[0].low, 8.5);
        assert_eq!(five[0].volume, bars[..5].iter().map(|b| b.volume).sum::<f64>());
        assert_eq!(five[1].close, 10.0);
    }

    #[test]
    fn resample_empty_is_empty() {
        assert!(Timeframe::Hour1.resample(&[]).is_empty());
    }
}
