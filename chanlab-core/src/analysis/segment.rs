//! Segment building.
//!
//! A segment starts at a stroke and takes its direction. Its feature sequence
//! is the counter-direction strokes, reduced with the containment merger. At
//! every second stroke three independent gates are checked:
//!
//! - the reduced feature sequence ends in a top (up segment) or bottom (down
//!   segment) pattern: the segment ends at the stroke before the extreme
//!   feature element;
//! - the stroke count reached the cap;
//! - with at least five strokes, the last `momentum_window` same-direction
//!   amplitudes are strictly decreasing.
//!
//! A termination is only final once the stroke after the terminating step
//! exists, so every consulted stroke is no longer the last one. Whatever is
//! left at the end becomes an open segment if it has at least three strokes.

use super::containment::{ContainmentStack, Mergeable};
use crate::config::SegmentConfig;
use crate::domain::{
    Direction, FeatureBar, Segment, SegmentId, SegmentStatus, Stroke, Swing, TerminationCause,
};
use crate::error::{Diagnostic, Stage};
use tracing::warn;

impl FeatureBar {
    pub fn from_stroke(stroke: &Stroke) -> Self {
        Self {
            high: stroke.high(),
            low: stroke.low(),
            first_stroke: stroke.id,
            last_stroke: stroke.id,
            rep_stroke: stroke.id,
            count: 1,
        }
    }
}

impl Mergeable for FeatureBar {
    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn absorb(&self, later: &Self, trend: Direction) -> Self {
        let (high, low, later_wins) = match trend {
            Direction::Up => (
                self.high.max(later.high),
                self.low.max(later.low),
                later.high >= self.high,
            ),
            Direction::Down => (
                self.high.min(later.high),
                self.low.min(later.low),
                later.low <= self.low,
            ),
        };
        FeatureBar {
            high,
            low,
            first_stroke: self.first_stroke,
            last_stroke: later.last_stroke,
            rep_stroke: if later_wins { later.rep_stroke } else { self.rep_stroke },
            count: self.count + later.count,
        }
    }
}

/// Reduce the counter-direction strokes of `strokes[start..=end]`.
pub fn reduce_features(
    strokes: &[Stroke],
    start: usize,
    end: usize,
    direction: Direction,
    max_iterations: usize,
) -> Vec<FeatureBar> {
    let mut stack = ContainmentStack::new(Some(direction), max_iterations);
    for stroke in strokes[start..=end].iter().filter(|s| s.direction != direction) {
        stack.push(FeatureBar::from_stroke(stroke));
    }
    stack.into_items()
}

/// 0.5 × fraction of same-direction stroke pairs that extend the move
/// + 0.5 × feature completeness (reduced length / 3, capped at 1).
pub fn integrity(strokes: &[Stroke], start: usize, end: usize, reduced_len: usize) -> f64 {
    let direction = strokes[start].direction;
    let pairs: Vec<bool> = (start..end.saturating_sub(1))
        .step_by(2)
        .map(|i| match direction {
            Direction::Up => strokes[i + 2].end_price > strokes[i].end_price,
            Direction::Down => strokes[i + 2].end_price < strokes[i].end_price,
        })
        .collect();
    let pattern = if pairs.is_empty() {
        0.0
    } else {
        pairs.iter().filter(|&&ok| ok).count() as f64 / pairs.len() as f64
    };
    let completeness = (reduced_len as f64 / 3.0).min(1.0);
    0.5 * pattern + 0.5 * completeness
}

/// Extreme-pattern check on the last three reduced feature elements.
/// Returns the stroke holding the middle element's extreme.
fn feature_fractal(features: &[FeatureBar], direction: Direction) -> Option<usize> {
    let [.., l, m, r] = features else {
        return None;
    };
    let hit = match direction {
        Direction::Up => m.high > l.high && m.high > r.high,
        Direction::Down => m.low < l.low && m.low < r.low,
    };
    hit.then_some(m.rep_stroke.0)
}

fn momentum_decay(strokes: &[Stroke], start: usize, e: usize, window: usize) -> bool {
    let span = 2 * (window - 1);
    if e < start + span {
        return false;
    }
    let amps: Vec<f64> = (0..window).map(|k| strokes[e - span + 2 * k].amplitude()).collect();
    amps.windows(2).all(|w| w[1] < w[0])
}

/// How a segment was closed.
struct Closing {
    status: SegmentStatus,
    causes: Vec<TerminationCause>,
    consulted_until: usize,
}

fn make_segment(
    id: usize,
    strokes: &[Stroke],
    start: usize,
    end: usize,
    closing: Closing,
    cfg: &SegmentConfig,
) -> Segment {
    let Closing {
        status,
        mut causes,
        consulted_until,
    } = closing;
    let first = &strokes[start];
    let last = &strokes[end];
    let span = &strokes[start..=end];
    let direction = first.direction;
    let features = reduce_features(strokes, start, end, direction, cfg.max_iterations);
    let integrity = integrity(strokes, start, end, features.len());
    let high = span.iter().map(Swing::high).fold(f64::NEG_INFINITY, f64::max);
    let low = span.iter().map(Swing::low).fold(f64::INFINITY, f64::min);
    let strength = span.iter().map(|s| s.strength).sum::<f64>() / span.len() as f64;
    causes.sort();
    causes.dedup();

    let mut segment = Segment {
        id: SegmentId(id),
        direction,
        start_stroke: first.id,
        end_stroke: last.id,
        start_index: first.start_index,
        end_index: last.end_index,
        start_raw: first.start_raw,
        end_raw: last.end_raw,
        start_time: first.start_time,
        end_time: last.end_time,
        start_price: first.start_price,
        end_price: last.end_price,
        high,
        low,
        features,
        integrity,
        strength,
        status,
        cause: causes.first().copied(),
        causes,
        valid: false,
        consulted_until,
    };
    segment.valid = segment.amplitude() >= cfg.min_amplitude && integrity >= cfg.min_integrity;
    segment
}

/// Segments plus any diagnostics raised while building them.
#[derive(Debug, Clone, Default)]
pub struct SegmentBuild {
    pub segments: Vec<Segment>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn build_segments(strokes: &[Stroke], cfg: &SegmentConfig) -> SegmentBuild {
    resume_segments(strokes, cfg, Vec::new())
}

/// Continue building after `kept`, a prefix of finalized segments whose
/// consulted strokes are unchanged.
pub fn resume_segments(strokes: &[Stroke], cfg: &SegmentConfig, kept: Vec<Segment>) -> SegmentBuild {
    let n = strokes.len();
    let mut build = SegmentBuild {
        segments: kept,
        diagnostics: Vec::new(),
    };
    if n < 3 {
        build.diagnostics.push(Diagnostic::InsufficientData {
            stage: Stage::Segment,
            required: 3,
            available: n,
        });
        return build;
    }

    let mut start = build.segments.last().map_or(0, |s| s.end_stroke.0 + 1);
    let mut steps = 0usize;

    'segments: while start + 2 < n {
        let direction = strokes[start].direction;
        let mut features = ContainmentStack::new(Some(direction), cfg.max_iterations);
        let mut e = start + 2;

        while e < n {
            steps += 1;
            if steps > cfg.max_iterations {
                warn!(at_stroke = e, steps, "segment termination hit iteration cap");
                build.diagnostics.push(Diagnostic::SegmentIterationCap {
                    at_stroke: e,
                    iterations: steps - 1,
                });
                break 'segments;
            }
            features.push(FeatureBar::from_stroke(&strokes[e - 1]));

            let count = e - start + 1;
            let mut causes = Vec::new();
            let mut end = e;
            if let Some(rep) = feature_fractal(features.items(), direction) {
                if rep >= start + 3 {
                    causes.push(TerminationCause::FeatureFractal);
                    end = rep - 1;
                }
            }
            if count >= cfg.max_strokes {
                causes.push(TerminationCause::StrokeCap);
            }
            if count >= 5 && momentum_decay(strokes, start, e, cfg.momentum_window) {
                causes.push(TerminationCause::MomentumDecay);
            }

            if !causes.is_empty() {
                if e + 1 >= n {
                    // the terminating step still involves the last stroke
                    break;
                }
                let id = build.segments.len();
                build.segments.push(make_segment(
                    id,
                    strokes,
                    start,
                    end,
                    Closing {
                        status: SegmentStatus::Finalized,
                        causes,
                        consulted_until: e + 1,
                    },
                    cfg,
                ));
                start = end + 1;
                continue 'segments;
            }
            e += 2;
        }

        let end = start + 2 * ((n - 1 - start) / 2);
        let id = build.segments.len();
        build.segments.push(make_segment(
            id,
            strokes,
            start,
            end,
            Closing {
                status: SegmentStatus::Open,
                causes: Vec::new(),
                consulted_until: n - 1,
            },
            cfg,
        ));
        break;
    }
    build
}
