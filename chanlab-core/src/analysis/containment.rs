//! Containment merging.
//!
//! Two spans are in containment when one's `[low, high]` covers the other's.
//! The merger folds such pairs together under the local trend (up: keep the
//! higher high and higher low; down: keep the lower high and lower low) until
//! no adjacent pair is in containment. The same engine reduces raw bars and
//! segment feature sequences.

use crate::config::MergeConfig;
use crate::domain::{Bar, Direction, MergedBar};
use crate::error::Diagnostic;
use tracing::warn;

/// A price span that can be folded into its neighbour.
pub trait Mergeable: Clone {
    fn high(&self) -> f64;
    fn low(&self) -> f64;

    /// Merge `later` into `self` (the earlier element) under `trend`.
    fn absorb(&self, later: &Self, trend: Direction) -> Self;

    /// Trend to use when there is no earlier element to compare against.
    fn fallback_trend(&self) -> Direction {
        Direction::Up
    }
}

/// `a` covers `b`.
pub fn contains<T: Mergeable>(a: &T, b: &T) -> bool {
    a.high() >= b.high() && a.low() <= b.low()
}

/// Either span covers the other.
pub fn in_containment<T: Mergeable>(a: &T, b: &T) -> bool {
    contains(a, b) || contains(b, a)
}

pub fn is_containment_free<T: Mergeable>(items: &[T]) -> bool {
    items.windows(2).all(|w| !in_containment(&w[0], &w[1]))
}

/// Trend between two non-contained neighbours.
fn trend_between<T: Mergeable>(prev: &T, next: &T) -> Direction {
    if next.high() > prev.high() || (next.high() == prev.high() && next.low() > prev.low()) {
        Direction::Up
    } else {
        Direction::Down
    }
}

/// Result of pushing one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Lowest index whose element changed (the new top if nothing merged).
    pub lowest_touched: usize,
    pub iterations: usize,
    /// The backward re-check stopped at the iteration cap.
    pub capped: bool,
}

/// Incremental merger: pushing an element merges it backward to a fixed point.
#[derive(Debug, Clone)]
pub struct ContainmentStack<T> {
    items: Vec<T>,
    default_trend: Option<Direction>,
    max_iterations: usize,
}

impl<T: Mergeable> ContainmentStack<T> {
    /// `default_trend` applies when the first element merges; `None` defers to
    /// [`Mergeable::fallback_trend`] of that element.
    pub fn new(default_trend: Option<Direction>, max_iterations: usize) -> Self {
        Self {
            items: Vec::new(),
            default_trend,
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Trend used to merge `items[j]` with its right neighbour.
    fn trend_at(&self, j: usize) -> Direction {
        if j == 0 {
            self.default_trend
                .unwrap_or_else(|| self.items[0].fallback_trend())
        } else {
            trend_between(&self.items[j - 1], &self.items[j])
        }
    }

    pub fn push(&mut self, item: T) -> PushOutcome {
        self.items.push(item);
        let mut outcome = PushOutcome {
            lowest_touched: self.items.len() - 1,
            iterations: 0,
            capped: false,
        };

        while self.items.len() >= 2 {
            let k = self.items.len() - 1;
            if !in_containment(&self.items[k - 1], &self.items[k]) {
                break;
            }
            if outcome.iterations >= self.max_iterations {
                outcome.capped = true;
                break;
            }
            outcome.iterations += 1;
            let trend = self.trend_at(k - 1);
            let merged = self.items[k - 1].absorb(&self.items[k], trend);
            self.items.pop();
            self.items[k - 1] = merged;
            outcome.lowest_touched = k - 1;
        }
        outcome
    }
}

/// Batch merge result.
#[derive(Debug, Clone)]
pub struct MergeOutcome<T> {
    pub items: Vec<T>,
    /// No adjacent containment remains.
    pub converged: bool,
    pub passes: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Merge a whole run to a fixed point.
///
/// Each pass streams the run through a [`ContainmentStack`]; passes repeat
/// only if a push hit its iteration cap, up to `cfg.max_passes`.
pub fn merge_run<T: Mergeable>(
    items: Vec<T>,
    default_trend: Option<Direction>,
    cfg: &MergeConfig,
) -> MergeOutcome<T> {
    let mut current = items;
    let mut diagnostics = Vec::new();
    let mut passes = 0;
    let mut converged = is_containment_free(&current);

    while passes < cfg.max_passes {
        passes += 1;
        let mut stack = ContainmentStack::new(default_trend, cfg.max_iterations);
        for (at, item) in current.into_iter().enumerate() {
            let pushed = stack.push(item);
            if pushed.capped {
                warn!(at, iterations = pushed.iterations, "containment merge hit iteration cap");
                diagnostics.push(Diagnostic::MergeIterationCap {
                    at_bar: at,
                    iterations: pushed.iterations,
                });
            }
        }
        current = stack.into_items();
        converged = is_containment_free(&current);
        if converged {
            break;
        }
    }

    MergeOutcome {
        items: current,
        converged,
        passes,
        diagnostics,
    }
}

/// Merge raw bars into a containment-free run.
pub fn merge_bars(bars: &[Bar], cfg: &MergeConfig) -> MergeOutcome<MergedBar> {
    let items = bars
        .iter()
        .enumerate()
        .map(|(i, b)| MergedBar::from_raw(i, b))
        .collect();
    merge_run(items, None, cfg)
}

impl Mergeable for MergedBar {
    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn fallback_trend(&self) -> Direction {
        Direction::of_move(self.open, self.close)
    }

    fn absorb(&self, later: &Self, trend: Direction) -> Self {
        let (high, low, later_wins) = match trend {
            Direction::Up => (
                self.high.max(later.high),
                self.low.max(later.low),
                later.high > self.high
                    || (later.high == self.high && later.volume >= self.volume),
            ),
            Direction::Down => (
                self.high.min(later.high),
                self.low.min(later.low),
                later.low < self.low || (later.low == self.low && later.volume >= self.volume),
            ),
        };
        let open = self.open;
        let close = later.close;
        let rep = if later_wins { later } else { self };
        let merge_count = self.merge_count + later.merge_count;
        let histogram = match (self.histogram, later.histogram) {
            (Some(a), Some(b)) => Some(
                (a * self.merge_count as f64 + b * later.merge_count as f64) / merge_count as f64,
            ),
            _ => None,
        };

        MergedBar {
            timestamp: rep.timestamp,
            start_time: self.start_time,
            open,
            high: high.max(open).max(close),
            low: low.min(open).min(close),
            close,
            volume: self.volume + later.volume,
            amount: self.amount + later.amount,
            merge_count,
            first_raw: self.first_raw,
            last_raw: later.last_raw,
            rep_raw: rep.rep_raw,
            histogram,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::default_start;
    use chrono::Duration;

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar {
            timestamp: default_start() + Duration::days(i),
            open,
            high,
            low,
            close,
            volume,
            amount: volume * close,
        }
    }

    fn merge(bars: &[Bar]) -> Vec<MergedBar> {
        let out = merge_bars(bars, &MergeConfig::default());
        assert!(out.converged);
        out.items
    }

    // ── Basic merges ──

    #[test]
    fn no_containment_is_untouched() {
        let bars = vec![
            bar(0, 10.0, 11.0, 9.0, 10.5, 100.0),
            bar(1, 10.5, 12.0, 10.0, 11.5, 100.0),
            bar(2, 11.5, 13.0, 11.0, 12.5, 100.0),
        ];
        let merged = merge(&bars);
        assert_eq!(merged.len(), 3);
        assert!(merged.iter().all(|m| m.merge_count == 1));
    }

    #[test]
    fn uptrend_keeps_higher_high_and_higher_low() {
        let bars = vec![
            bar(0, 10.0, 11.0, 9.0, 10.5, 100.0),
            bar(1, 11.0, 14.0, 10.0, 13.0, 100.0),
            // inside bar 1
            bar(2, 13.0, 13.5, 11.0, 12.0, 50.0),
        ];
        let merged = merge(&bars);
        assert_eq!(merged.len(), 2);
        let m = &merged[1];
        assert_eq!(m.high, 14.0);
        assert_eq!(m.low, 11.0);
        assert_eq!(m.open, 11.0);
        assert_eq!(m.close, 12.0);
        assert_eq!(m.merge_count, 2);
        assert_eq!((m.first_raw, m.last_raw, m.rep_raw), (1, 2, 1));
        assert_eq!(m.volume, 150.0);
        assert_eq!(m.timestamp, bars[1].timestamp);
        assert_eq!(m.start_time, bars[1].timestamp);
    }

    #[test]
    fn downtrend_keeps_lower_high_and_lower_low() {
        let bars = vec![
            bar(0, 20.0, 21.0, 18.0, 19.0, 100.0),
            bar(1, 19.0, 19.5, 15.0, 16.0, 100.0),
            // covers bar 1
            bar(2, 16.0, 20.0, 14.0, 15.0, 100.0),
        ];
        let merged = merge(&bars);
        assert_eq!(merged.len(), 2);
        let m = &merged[1];
        assert_eq!(m.high, 19.5);
        assert_eq!(m.low, 14.0);
        assert_eq!(m.rep_raw, 2);
        assert_eq!(m.timestamp, bars[2].timestamp);
    }

    #[test]
    fn open_close_widen_the_range() {
        let bars = vec![
            bar(0, 10.0, 11.0, 9.0, 10.5, 100.0),
            bar(1, 10.5, 14.0, 10.0, 13.0, 100.0),
            // covers bar 1 and closes below the kept low
            bar(2, 13.0, 14.5, 9.5, 9.8, 100.0),
        ];
        let merged = merge(&bars);
        let m = merged.last().unwrap();
        // up merge keeps low = 10.0, the close 9.8 widens it
        assert_eq!(m.low, 9.8);
        assert_eq!(m.high, 14.5);
    }

    #[test]
    fn equal_ranges_prefer_higher_volume_then_later() {
        let base = bar(0, 9.5, 10.0, 9.0, 9.8, 100.0);
        let louder = vec![
            base.clone(),
            bar(1, 10.5, 12.0, 10.0, 11.0, 300.0),
            bar(2, 11.0, 12.0, 10.0, 11.5, 100.0),
        ];
        assert_eq!(merge(&louder)[1].rep_raw, 1);

        let same = vec![
            base,
            bar(1, 10.5, 12.0, 10.0, 11.0, 100.0),
            bar(2, 11.0, 12.0, 10.0, 11.5, 100.0),
        ];
        assert_eq!(merge(&same)[1].rep_raw, 2);
    }

    #[test]
    fn first_pair_uses_first_bar_direction() {
        // bar 0 closes below its open: down merge
        let bars = vec![
            bar(0, 11.0, 12.0, 9.0, 10.0, 100.0),
            bar(1, 10.0, 11.0, 9.5, 10.5, 100.0),
        ];
        let merged = merge(&bars);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].high, 11.0);
        assert_eq!(merged[0].low, 9.0);
    }

    // ── Fixed point ──

    #[test]
    fn widened_merge_cascades_backward() {
        let bars = vec![
            bar(0, 9.0, 10.0, 8.0, 9.0, 100.0),
            bar(1, 9.5, 12.0, 9.0, 11.5, 100.0),
            // covers bar 1; its close widens the merge below bar 0's low
            bar(2, 12.0, 13.0, 7.0, 7.5, 100.0),
        ];
        let mut stack = ContainmentStack::new(None, 100);
        for (i, b) in bars.iter().enumerate() {
            stack.push(MergedBar::from_raw(i, b));
        }
        assert_eq!(stack.len(), 1);
        let m = &stack.items()[0];
        assert_eq!(m.merge_count, 3);
        assert_eq!(m.high, 13.0);
        assert_eq!(m.low, 7.5);
        assert_eq!(m.open, 9.0);
        assert_eq!(m.close, 7.5);
    }

    #[test]
    fn push_reports_lowest_touched_index() {
        let bars = vec![
            bar(0, 10.0, 11.0, 9.0, 10.5, 100.0),
            bar(1, 10.5, 14.0, 10.0, 13.0, 100.0),
            bar(2, 13.0, 13.5, 11.0, 12.0, 50.0),
        ];
        let mut stack = ContainmentStack::new(None, 100);
        assert_eq!(stack.push(MergedBar::from_raw(0, &bars[0])).lowest_touched, 0);
        assert_eq!(stack.push(MergedBar::from_raw(1, &bars[1])).lowest_touched, 1);
        let third = stack.push(MergedBar::from_raw(2, &bars[2]));
        assert_eq!(third.lowest_touched, 1);
        assert_eq!(third.iterations, 1);
        assert!(!third.capped);
    }

    #[test]
    fn iteration_cap_is_reported_not_fatal() {
        let bars = vec![
            bar(0, 9.0, 10.0, 8.0, 9.0, 100.0),
            bar(1, 9.5, 12.0, 9.0, 11.5, 100.0),
            bar(2, 12.0, 13.0, 7.0, 7.5, 100.0),
        ];
        let cfg = MergeConfig {
            max_iterations: 1,
            max_passes: 3,
        };
        let out = merge_bars(&bars, &cfg);
        assert!(!out.diagnostics.is_empty());
        assert!(matches!(out.diagnostics[0], Diagnostic::MergeIterationCap { .. }));
        // later passes finish the job
        assert!(out.converged);
        assert_eq!(out.items.len(), 1);
        assert!(out.passes >= 2);
    }

    #[test]
    fn merging_is_idempotent() {
        let bars = crate::data::synthetic::random_walk("idem", 300, Duration::minutes(1));
        let first = merge_bars(&bars, &MergeConfig::default());
        assert!(is_containment_free(&first.items));
        let again = merge_run(first.items.clone(), None, &MergeConfig::default());
        assert_eq!(again.items, first.items);
        assert_eq!(again.passes, 1);
    }

    #[test]
    fn merged_histogram_is_weighted_average() {
        let mut a = MergedBar::from_raw(0, &bar(0, 10.5, 14.0, 10.0, 13.0, 100.0));
        a.histogram = Some(1.0);
        let mut b = MergedBar::from_raw(1, &bar(1, 13.0, 13.5, 11.0, 12.0, 100.0));
        b.histogram = Some(4.0);
        let ab = a.absorb(&b, Direction::Up);
        let mut c = MergedBar::from_raw(2, &bar(2, 12.0, 13.0, 11.5, 12.5, 100.0));
        c.histogram = Some(-2.0);
        let abc = ab.absorb(&c, Direction::Up);
        assert_eq!(abc.merge_count, 3);
        assert!((abc.histogram.unwrap() - 1.0).abs() < 1e-12);
    }
}
