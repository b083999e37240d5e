//! Stroke building.
//!
//! Walks the alternating turning points keeping an anchor. An opposite-kind
//! point closes a stroke from the anchor when the span is long enough or the
//! move large enough; a same-kind point beyond the anchor replaces it and
//! drags the previous stroke's end along.

use crate::config::StrokeConfig;
use crate::domain::{Direction, MergedBar, PointKind, Stroke, StrokeId, TurningPoint};

/// Relative move between two turning points.
fn amplitude(from: &TurningPoint, to: &TurningPoint) -> f64 {
    if from.price > 0.0 {
        (to.price - from.price).abs() / from.price
    } else {
        0.0
    }
}

/// An opposite-kind point on the right side of the anchor that spans enough
/// bars or moves far enough.
fn qualifies(anchor: &TurningPoint, p: &TurningPoint, cfg: &StrokeConfig) -> bool {
    let consistent = match anchor.kind {
        PointKind::Bottom => p.kind == PointKind::Top && p.price > anchor.price,
        PointKind::Top => p.kind == PointKind::Bottom && p.price < anchor.price,
    };
    if !consistent || p.merged_index <= anchor.merged_index {
        return false;
    }
    let span = p.merged_index - anchor.merged_index;
    span >= cfg.min_bars || amplitude(anchor, p) >= cfg.min_amplitude
}

fn purity(bars: &[MergedBar], from: usize, to: usize, direction: Direction) -> f64 {
    let span = &bars[from..=to];
    let moves = span.len() - 1;
    if moves == 0 {
        return 0.0;
    }
    let consistent = span
        .windows(2)
        .filter(|w| match direction {
            Direction::Up => w[1].close > w[0].close,
            Direction::Down => w[1].close < w[0].close,
        })
        .count();
    consistent as f64 / moves as f64
}

/// Stroke mean volume against the trailing mean, mapped into [0, 1].
fn volume_factor(bars: &[MergedBar], from: usize, to: usize, lookback: usize) -> f64 {
    let mean = |s: &[MergedBar]| s.iter().map(|b| b.volume).sum::<f64>() / s.len() as f64;
    let reference = &bars[from.saturating_sub(lookback)..from];
    if reference.is_empty() {
        return 0.5;
    }
    let base = mean(reference);
    if base <= 0.0 {
        return 0.5;
    }
    (mean(&bars[from..=to]) / base).clamp(0.0, 2.0) / 2.0
}

fn make_stroke(
    id: usize,
    start: &TurningPoint,
    end: &TurningPoint,
    bars: &[MergedBar],
    cfg: &StrokeConfig,
) -> Stroke {
    let direction = start.kind.outgoing();
    let (from, to) = (start.merged_index, end.merged_index);
    let amp_ratio = (amplitude(start, end) / cfg.min_amplitude).min(1.0);
    let strength = 0.7 * amp_ratio + 0.3 * volume_factor(bars, from, to, cfg.volume_lookback);
    Stroke {
        id: StrokeId(id),
        direction,
        start: start.id,
        end: end.id,
        start_index: from,
        end_index: to,
        start_raw: start.raw_index,
        end_raw: end.raw_index,
        start_time: start.timestamp,
        end_time: end.timestamp,
        start_price: start.price,
        end_price: end.price,
        purity: purity(bars, from, to, direction),
        strength,
    }
}

pub fn build_strokes(
    points: &[TurningPoint],
    bars: &[MergedBar],
    cfg: &StrokeConfig,
) -> Vec<Stroke> {
    resume_strokes(points, bars, cfg, Vec::new())
}

/// Continue building on top of `kept`, a prefix of an earlier build whose
/// points (up to the last kept stroke's end) are unchanged.
pub fn resume_strokes(
    points: &[TurningPoint],
    bars: &[MergedBar],
    cfg: &StrokeConfig,
    mut strokes: Vec<Stroke>,
) -> Vec<Stroke> {
    let (mut anchor, from) = match strokes.last() {
        Some(last) => (Some(last.end.0), last.end.0 + 1),
        None => (None, 0),
    };

    for p in points.iter().skip(from) {
        let Some(a) = anchor else {
            anchor = Some(p.id.0);
            continue;
        };
        let ap = &points[a];
        if p.kind == ap.kind {
            if ap.is_exceeded_by(p) {
                anchor = Some(p.id.0);
                if let Some(last) = strokes.last_mut() {
                    if last.end.0 == a {
                        let start = &points[last.start.0];
                        *last = make_stroke(last.id.0, start, p, bars, cfg);
                    }
                }
            }
        } else if qualifies(ap, p, cfg) {
            let id = strokes.len();
            strokes.push(make_stroke(id, ap, p, bars, cfg));
            anchor = Some(p.id.0);
        }
    }
    strokes
}
