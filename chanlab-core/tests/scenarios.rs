//! End-to-end scenarios on hand-shaped series.
//!
//! A. V-shaped decline and rebound: one bottom divergence, one Type-1 buy
//! B. strictly increasing closes: no turning points at all
//! C. three overlapping ranges: the pivot band is their intersection
//! D. replaying the same bars: identical structures and fingerprints

use chanlab_core::analysis::build_pivots;
use chanlab_core::config::{AnalysisConfig, PivotConfig};
use chanlab_core::data::synthetic::{bars_from_closes, closes_from_legs, random_walk};
use chanlab_core::domain::{
    Direction, DivergenceKind, DivergenceSource, Side, SignalKind, Swing,
};
use chanlab_core::fingerprint::fingerprint;
use chanlab_core::{analyze, LevelPipeline};
use chrono::Duration;

// ── Helpers ──────────────────────────────────────────────────────────

fn v_shape() -> Vec<f64> {
    closes_from_legs(
        200.0,
        &[(30, -0.1), (20, -1.5), (20, -0.1), (12, -0.8), (10, 1.0)],
    )
}

/// Range between two prices, used as a bare swing.
struct Range {
    from: f64,
    to: f64,
}

impl Swing for Range {
    fn direction(&self) -> Direction {
        Direction::of_move(self.from, self.to)
    }
    fn high(&self) -> f64 {
        self.from.max(self.to)
    }
    fn low(&self) -> f64 {
        self.from.min(self.to)
    }
    fn start_price(&self) -> f64 {
        self.from
    }
    fn end_price(&self) -> f64 {
        self.to
    }
    fn start_raw(&self) -> usize {
        0
    }
    fn end_raw(&self) -> usize {
        0
    }
}

// ── A. V-shape ───────────────────────────────────────────────────────

#[test]
fn v_shape_yields_one_bottom_divergence_and_one_type1_buy() {
    let closes = v_shape();
    assert_eq!(closes.len(), 93);
    let bars = bars_from_closes(&closes, 0.3);
    let result = analyze(&bars, &AnalysisConfig::default()).unwrap();

    assert_eq!(result.divergences.len(), 1);
    let div = &result.divergences[0];
    assert_eq!(div.kind, DivergenceKind::Bottom);
    assert_eq!(div.source, DivergenceSource::Streaming);
    assert_eq!(div.later.extreme_raw, 82);
    assert!(div.area_ratio < 1.15);
    assert!(div.later.extreme_price < div.earlier.extreme_price);

    assert_eq!(result.signals.len(), 1);
    let sig = &result.signals[0];
    assert_eq!(sig.kind, SignalKind::Type1);
    assert_eq!(sig.side, Side::Buy);
    assert_eq!(sig.raw_index, 82);
    assert!((sig.price - 155.1).abs() < 1e-9);
    assert_eq!(sig.timestamp, bars[82].timestamp);
    assert!(sig.reliability > 0.0 && sig.reliability <= 0.95);
}

#[test]
fn v_shape_has_a_single_bottom_point() {
    let bars = bars_from_closes(&v_shape(), 0.3);
    let result = analyze(&bars, &AnalysisConfig::default()).unwrap();
    assert_eq!(result.points.len(), 1);
    assert_eq!(result.points[0].raw_index, 82);
    assert!(result.strokes.is_empty());
    assert!(result.pivots.is_empty());
}

// ── B. Monotonic series ──────────────────────────────────────────────

#[test]
fn strictly_increasing_series_has_no_turning_points() {
    let closes: Vec<f64> = (0..120).map(|i| 50.0 + i as f64 * 0.5).collect();
    let bars = bars_from_closes(&closes, 0.2);
    let result = analyze(&bars, &AnalysisConfig::default()).unwrap();
    assert!(result.points.is_empty());
    assert!(result.strokes.is_empty());
    assert!(result.segments.is_empty());
    assert!(result.signals.is_empty());
    assert_eq!(result.merged.len(), bars.len());
}

// ── C. Three ranges ──────────────────────────────────────────────────

#[test]
fn three_ranges_form_their_intersection() {
    let ranges = [
        Range { from: 10.0, to: 15.0 },
        Range { from: 15.0, to: 11.0 },
        Range { from: 11.0, to: 14.0 },
    ];
    let pivots = build_pivots(&ranges, &PivotConfig::default());
    assert_eq!(pivots.len(), 1);
    assert_eq!(pivots[0].low, 11.0);
    assert_eq!(pivots[0].high, 14.0);
    assert_eq!(pivots[0].members.len(), 3);
    assert!(pivots[0].is_active());
}

// ── D. Replay determinism ────────────────────────────────────────────

#[test]
fn replaying_the_same_prefix_is_bit_identical() {
    let bars = random_walk("scenario-d", 500, Duration::hours(4));
    let cfg = AnalysisConfig::default();
    let first = analyze(&bars[..400], &cfg).unwrap();
    let second = analyze(&bars[..400], &cfg).unwrap();
    assert_eq!(first, second);
    assert_eq!(fingerprint(&first), fingerprint(&second));

    let mut pipeline = LevelPipeline::new(cfg).unwrap();
    for bar in &bars[..400] {
        pipeline.push_bar(bar.clone()).unwrap();
    }
    assert_eq!(fingerprint(&pipeline.snapshot()), fingerprint(&first));
}
