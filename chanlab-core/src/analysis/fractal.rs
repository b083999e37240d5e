//! Turning-point (fractal) detection on the merged run.
//!
//! A candidate at centre `c` needs every neighbour within the window radius
//! to sit strictly below it on both high and low (top), or strictly above it
//! (bottom); the non-strict mode accepts ties. Candidates are folded into a
//! strictly alternating sequence by a greedy scan that only ever touches its
//! last element, which is what makes resuming from a stable prefix exact.

use crate::config::{FractalConfig, Strictness};
use crate::domain::{MergedBar, PointId, PointKind, TurningPoint};

/// Candidate kind at `center`, if the window around it is complete.
pub fn classify(bars: &[MergedBar], center: usize, cfg: &FractalConfig) -> Option<PointKind> {
    let r = cfg.window_radius;
    if center < r || center + r >= bars.len() {
        return None;
    }
    let c = &bars[center];
    let neighbours = (center - r..=center + r).filter(|&j| j != center).map(|j| &bars[j]);

    let (mut top, mut bottom) = (true, true);
    for nb in neighbours {
        match cfg.strictness {
            Strictness::Strict => {
                top &= nb.high < c.high && nb.low < c.low;
                bottom &= nb.low > c.low && nb.high > c.high;
            }
            Strictness::NonStrict => {
                top &= nb.high <= c.high && nb.low <= c.low;
                bottom &= nb.low >= c.low && nb.high >= c.high;
            }
        }
    }
    match (top, bottom) {
        (true, false) => Some(PointKind::Top),
        (false, true) => Some(PointKind::Bottom),
        _ => None,
    }
}

/// |centre extreme − window's opposite-side extreme| / window-average close.
fn strength(bars: &[MergedBar], center: usize, kind: PointKind, r: usize) -> f64 {
    let window = &bars[center - r..=center + r];
    let avg_close = window.iter().map(|b| b.close).sum::<f64>() / window.len() as f64;
    let spread = match kind {
        PointKind::Top => {
            let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            bars[center].high - lowest
        }
        PointKind::Bottom => {
            let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            highest - bars[center].low
        }
    };
    if avg_close > 0.0 {
        spread.abs() / avg_close
    } else {
        0.0
    }
}

fn point_at(bars: &[MergedBar], center: usize, kind: PointKind, id: usize, r: usize) -> TurningPoint {
    let bar = &bars[center];
    TurningPoint {
        id: PointId(id),
        kind,
        merged_index: center,
        raw_index: bar.rep_raw,
        timestamp: bar.timestamp,
        price: match kind {
            PointKind::Top => bar.high,
            PointKind::Bottom => bar.low,
        },
        strength: strength(bars, center, kind, r),
        confirmation: 0,
    }
}

/// Detect all turning points with confirmation counters.
pub fn detect_turning_points(bars: &[MergedBar], cfg: &FractalConfig) -> Vec<TurningPoint> {
    let mut points = resume_detection(bars, cfg, Vec::new(), 0);
    refresh_confirmations(&mut points, bars, cfg, 0);
    points
}

/// Continue the alternation scan from `from_center` on top of `kept`.
///
/// `kept` must be a prefix produced by an earlier scan whose last element's
/// centre is below `from_center`, and every candidate before `from_center`
/// must be unchanged. New points start with a zero confirmation counter.
pub fn resume_detection(
    bars: &[MergedBar],
    cfg: &FractalConfig,
    mut kept: Vec<TurningPoint>,
    from_center: usize,
) -> Vec<TurningPoint> {
    let r = cfg.window_radius;
    let end = bars.len().saturating_sub(r);
    for center in from_center.max(r)..end {
        let Some(kind) = classify(bars, center, cfg) else {
            continue;
        };
        match kept.last() {
            Some(last) if last.kind == kind => {
                let candidate = point_at(bars, center, kind, last.id.0, r);
                if last.is_exceeded_by(&candidate) {
                    if let Some(slot) = kept.last_mut() {
                        *slot = candidate;
                    }
                }
            }
            _ => {
                let id = kept.len();
                kept.push(point_at(bars, center, kind, id, r));
            }
        }
    }
    kept
}

/// Recompute counters of points whose forward window reaches `dirty_from`.
pub fn refresh_confirmations(
    points: &mut [TurningPoint],
    bars: &[MergedBar],
    cfg: &FractalConfig,
    dirty_from: usize,
) {
    let n = cfg.confirm_bars;
    for p in points.iter_mut().rev() {
        if p.merged_index + n < dirty_from {
            break;
        }
        let last = (p.merged_index + n).min(bars.len().saturating_sub(1));
        let mut counter = 0i32;
        for bar in bars.iter().take(last + 1).skip(p.merged_index + 1) {
            let breached = match p.kind {
                PointKind::Top => bar.high > p.price,
                PointKind::Bottom => bar.low < p.price,
            };
            counter += if breached { -1 } else { 1 };
        }
        p.confirmation = counter;
    }
}
