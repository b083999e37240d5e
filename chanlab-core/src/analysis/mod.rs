//! Structural analysis stages, from raw bars up to signal points.
//!
//! Each stage is a plain function over the previous stage's arena, plus a
//! `resume_*` variant that continues from a stable prefix. The incremental
//! pipeline in [`crate::pipeline`] is built from the resumable forms.

pub mod containment;
pub mod divergence;
pub mod fractal;
pub mod pivot;
pub mod segment;
pub mod signal;
pub mod stroke;

pub use containment::{
    is_containment_free, merge_bars, merge_run, ContainmentStack, MergeOutcome, Mergeable,
    PushOutcome,
};
pub use divergence::{
    detect_divergences, evaluate_pivot, evaluate_regions, histogram_regions, Evaluation,
    HistogramAreas, RegionTracker,
};
pub use fractal::{detect_turning_points, refresh_confirmations, resume_detection};
pub use pivot::{build_pivots, PivotBuilder, PivotCheckpoint};
pub use segment::{build_segments, resume_segments, SegmentBuild};
pub use signal::{
    classify_signals, dedupe, pivot_exit, points_from_divergence, pullback_leg, type1_from,
    type2_after, type3_for, DivergencePoints, SignalInputs,
};
pub use stroke::{build_strokes, resume_strokes};

#[cfg(test)]
pub(crate) use test_paths::{segments_from_path, strokes_from_path, PathSwing};

#[cfg(test)]
mod test_paths {
    use crate::data::synthetic::default_start;
    use crate::domain::{
        Direction, PointId, Segment, SegmentId, SegmentStatus, Stroke, StrokeId, Swing,
    };
    use chrono::Duration;

    /// Bars between consecutive path vertices.
    const STEP: usize = 5;

    /// Strokes joining consecutive prices, `STEP` bars apart.
    pub fn strokes_from_path(prices: &[f64]) -> Vec<Stroke> {
        prices
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let (from, to) = (i * STEP, (i + 1) * STEP);
                Stroke {
                    id: StrokeId(i),
                    direction: Direction::of_move(w[0], w[1]),
                    start: PointId(i),
                    end: PointId(i + 1),
                    start_index: from,
                    end_index: to,
                    start_raw: from,
                    end_raw: to,
                    start_time: default_start() + Duration::days(from as i64),
                    end_time: default_start() + Duration::days(to as i64),
                    start_price: w[0],
                    end_price: w[1],
                    purity: 1.0,
                    strength: 0.5,
                }
            })
            .collect()
    }

    /// Segments joining consecutive prices; all finalized except the last.
    pub fn segments_from_path(prices: &[f64]) -> Vec<Segment> {
        let n = prices.len().saturating_sub(1);
        prices
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let (from, to) = (i * STEP, (i + 1) * STEP);
                Segment {
                    id: SegmentId(i),
                    direction: Direction::of_move(w[0], w[1]),
                    start_stroke: StrokeId(i * 3),
                    end_stroke: StrokeId(i * 3 + 2),
                    start_index: from,
                    end_index: to,
                    start_raw: from,
                    end_raw: to,
                    start_time: default_start() + Duration::days(from as i64),
                    end_time: default_start() + Duration::days(to as i64),
                    start_price: w[0],
                    end_price: w[1],
                    high: w[0].max(w[1]),
                    low: w[0].min(w[1]),
                    features: Vec::new(),
                    integrity: 1.0,
                    strength: 0.5,
                    status: if i + 1 == n {
                        SegmentStatus::Open
                    } else {
                        SegmentStatus::Finalized
                    },
                    cause: None,
                    causes: Vec::new(),
                    valid: true,
                    consulted_until: i * 3 + 3,
                }
            })
            .collect()
    }

    /// Minimal swing between two prices.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PathSwing {
        pub from: f64,
        pub to: f64,
        pub index: usize,
    }

    impl PathSwing {
        pub fn from_path(prices: &[f64]) -> Vec<PathSwing> {
            prices
                .windows(2)
                .enumerate()
                .map(|(index, w)| PathSwing {
                    from: w[0],
                    to: w[1],
                    index,
                })
                .collect()
        }
    }

    impl Swing for PathSwing {
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
            self.index * STEP
        }

        fn end_raw(&self) -> usize {
            (self.index + 1) * STEP
        }
    }
}
