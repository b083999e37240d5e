//! Deterministic synthetic bar series for tests, benchmarks and demos.
//!
//! Nothing here reads the clock or an OS entropy source: the same inputs
//! always produce the same bars.

use crate::domain::Bar;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Midnight, 2024-01-02.
pub fn default_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Daily bars from closes; see [`bars_from_closes_at`].
pub fn bars_from_closes(closes: &[f64], spread: f64) -> Vec<Bar> {
    bars_from_closes_at(closes, spread, default_start(), Duration::days(1))
}

/// Bars with `high = close + spread`, `low = close - spread` and
/// `open` = previous close clamped into the bar's range.
pub fn bars_from_closes_at(
    closes: &[f64],
    spread: f64,
    start: NaiveDateTime,
    step: Duration,
) -> Vec<Bar> {
    let mut timestamp = start;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let high = close + spread;
            let low = close - spread;
            let open = if i == 0 { close } else { closes[i - 1].clamp(low, high) };
            let volume = 1000.0;
            let bar = Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
                amount: close * volume,
            };
            timestamp += step;
            bar
        })
        .collect()
}

/// Piecewise-linear closes: starting at `start`, each `(count, step)` leg
/// appends `count` closes moving by `step` per bar.
pub fn closes_from_legs(start: f64, legs: &[(usize, f64)]) -> Vec<f64> {
    let mut closes = vec![start];
    let mut price = start;
    for &(count, step) in legs {
        for _ in 0..count {
            price += step;
            closes.push(price);
        }
    }
    closes
}

/// Seeded random walk of `n` bars starting at 100.0.
///
/// The seed is the BLAKE3 hash of `label`, so distinct labels give
/// independent but reproducible series.
pub fn random_walk(label: &str, n: usize, step: Duration) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(label.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0_f64;
    let mut timestamp = default_start();

    for _ in 0..n {
        let ret: f64 = rng.gen_range(-0.02..0.02);
        let open = price;
        let close = price * (1.0 + ret);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500..5_000u32) as f64;

        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            amount: volume * close,
        });

        price = close;
        timestamp += step;
    }

    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legs_build_expected_closes() {
        let closes = closes_from_legs(10.0, &[(2, 1.0), (1, -0.5)]);
        assert_eq!(closes, vec![10.0, 11.0, 12.0, 11.5]);
    }

    #[test]
    fn bars_from_closes_are_sane() {
        let bars = bars_from_closes(&[10.0, 12.0, 11.0], 0.3);
        assert!(bars.iter().all(Bar::is_sane));
        // Previous close 12.0 clamps into [10.7, 11.3].
        assert_eq!(bars[2].open, bars[2].high);
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn random_walk_is_deterministic() {
        let a = random_walk("SPY", 50, Duration::minutes(1));
        let b = random_walk("SPY", 50, Duration::minutes(1));
        let c = random_walk("QQQ", 50, Duration::minutes(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(Bar::is_sane));
    }
}
