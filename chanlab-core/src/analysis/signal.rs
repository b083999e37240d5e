//! Type-1/2/3 buy and sell points.
//!
//! Classification is a read-only pass over the structure arenas and the
//! divergence list. Each point derives from one divergence or one pivot, so
//! the incremental pipeline can classify source by source and keep the
//! points whose inputs are frozen.

use std::collections::BTreeMap;

use crate::config::SignalConfig;
use crate::domain::{
    Bar, DivergenceEvent, DivergenceKind, DivergenceSource, Direction, PivotZone, Segment,
    SegmentId, Side, SignalKind, SignalPoint, Stroke, StrokeId, Swing,
};

/// Everything the classifier reads. `bars` are the raw bars of the level.
#[derive(Debug, Clone, Copy)]
pub struct SignalInputs<'a> {
    pub bars: &'a [Bar],
    pub strokes: &'a [Stroke],
    pub segments: &'a [Segment],
    pub pivots: &'a [PivotZone],
    pub divergences: &'a [DivergenceEvent],
}

fn side_of(kind: DivergenceKind) -> Side {
    match kind {
        DivergenceKind::Bottom => Side::Buy,
        DivergenceKind::Top => Side::Sell,
    }
}

/// Type-1 point at the later extreme of a divergence, if the prior trend
/// run qualifies.
pub fn type1_from(
    event: &DivergenceEvent,
    segments: &[Segment],
    pivots: &[PivotZone],
    cfg: &SignalConfig,
) -> Option<SignalPoint> {
    let side = side_of(event.kind);
    let trend_ok = match event.source {
        DivergenceSource::Segment => {
            let entering = segments.get(event.entering?.0)?;
            let pivot = pivots.get(event.pivot?.0)?;
            match side {
                Side::Buy => entering.start_price >= pivot.high,
                Side::Sell => entering.start_price < pivot.low,
            }
        }
        DivergenceSource::Streaming => {
            event
                .later
                .extreme_raw
                .saturating_sub(event.earlier.start_raw)
                >= cfg.min_trend_bars
        }
    };
    if !trend_ok {
        return None;
    }

    let mut point = SignalPoint::new(
        SignalKind::Type1,
        side,
        event.later.extreme_price,
        event.timestamp,
        event.later.extreme_raw,
        event.reliability,
    );
    point.divergence = Some(event.id);
    point.pivot = event.pivot;
    point.segment = event.leaving;
    Some(point)
}

/// Index of the first leg against the Type-1 side that starts after it.
pub fn pullback_leg<S: Swing>(type1: &SignalPoint, legs: &[S]) -> Option<usize> {
    let pullback = match type1.side {
        Side::Buy => Direction::Down,
        Side::Sell => Direction::Up,
    };
    let from = legs.partition_point(|l| l.start_raw() <= type1.raw_index);
    (from..legs.len()).find(|&j| legs[j].direction() == pullback)
}

/// First pullback leg after `type1` that holds above (buy) or below (sell)
/// the Type-1 price, once the following leg exists. Returns the leg index.
pub fn type2_after<S: Swing>(
    type1: &SignalPoint,
    legs: &[S],
    bars: &[Bar],
    cfg: &SignalConfig,
    max_reliability: f64,
) -> Option<(usize, SignalPoint)> {
    let j = pullback_leg(type1, legs)?;
    if j + 1 >= legs.len() {
        return None;
    }
    let leg = &legs[j];
    let (p1, end, start) = (type1.price, leg.end_price(), leg.start_price());
    let holds = match type1.side {
        Side::Buy => end >= p1 * (1.0 - cfg.type2_tolerance),
        Side::Sell => end <= p1 * (1.0 + cfg.type2_tolerance),
    };
    if !holds {
        return None;
    }

    // Share of the move away from p1 that the pullback kept.
    let cushion = if (start - p1).abs() > 0.0 {
        ((end - p1) / (start - p1)).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let reliability = (0.8 * type1.base_reliability + 0.2 * cushion).min(max_reliability);
    let timestamp = bars.get(leg.end_raw())?.timestamp;
    let mut point = SignalPoint::new(
        SignalKind::Type2,
        type1.side,
        end,
        timestamp,
        leg.end_raw(),
        reliability,
    );
    point.divergence = type1.divergence;
    point.pivot = type1.pivot;
    Some((j, point))
}

/// First segment after the pivot's members that ends outside the band.
pub fn pivot_exit(pivot: &PivotZone, segments: &[Segment]) -> Option<usize> {
    let after = pivot.last_member()?.0 + 1;
    (after..segments.len()).find(|&j| !pivot.contains(segments[j].end_price))
}

/// Type-3 point: the first segment to leave `pivot` is followed by a
/// finalized test segment that stays outside the band.
pub fn type3_for(
    pivot: &PivotZone,
    segments: &[Segment],
    bars: &[Bar],
    cfg: &SignalConfig,
    max_reliability: f64,
) -> Option<SignalPoint> {
    let exit = pivot_exit(pivot, segments)?;
    let test = segments.get(exit + 1)?;
    if !test.is_finalized() {
        return None;
    }

    let tol = cfg.type3_tolerance;
    let (side, gap) = if segments[exit].end_price >= pivot.high {
        (Side::Buy, test.low - pivot.high * (1.0 + tol))
    } else {
        (Side::Sell, pivot.low * (1.0 - tol) - test.high)
    };
    let outside = match side {
        Side::Buy => gap >= 0.0,
        Side::Sell => gap > 0.0,
    };
    if !outside {
        return None;
    }

    let width = pivot.width();
    let depth = if width > 0.0 { (gap / width).min(1.0) } else { 1.0 };
    let reliability = (0.5 + 0.5 * depth).min(max_reliability);
    let timestamp = bars.get(test.end_raw)?.timestamp;
    let mut point = SignalPoint::new(
        SignalKind::Type3,
        side,
        test.end_price,
        timestamp,
        test.end_raw,
        reliability,
    );
    point.pivot = Some(pivot.id);
    point.segment = Some(test.id);
    Some(point)
}

/// Keep one point per (kind, bar, side), preferring the higher reliability.
/// The first of equally reliable points wins; the result is ordered by
/// (bar, kind, side).
pub fn dedupe(points: Vec<SignalPoint>) -> Vec<SignalPoint> {
    let mut best: BTreeMap<(usize, SignalKind, Side), SignalPoint> = BTreeMap::new();
    for p in points {
        let key = (p.raw_index, p.kind, p.side);
        match best.get(&key) {
            Some(existing) if existing.reliability >= p.reliability => {}
            _ => {
                best.insert(key, p);
            }
        }
    }
    best.into_values().collect()
}

/// The Type-1 point of one divergence and the Type-2 point after it.
///
/// Segment divergences look for the pullback among segments, streaming ones
/// among strokes.
#[derive(Debug, Clone, PartialEq)]
pub struct DivergencePoints {
    pub type1: Option<SignalPoint>,
    pub type2: Option<SignalPoint>,
    /// Pullback leg searched for the Type-2 point.
    pub pullback: Option<usize>,
}

impl DivergencePoints {
    pub fn into_points(self) -> impl Iterator<Item = SignalPoint> {
        self.type2.into_iter().chain(self.type1)
    }
}

pub fn points_from_divergence(
    event: &DivergenceEvent,
    inputs: &SignalInputs<'_>,
    cfg: &SignalConfig,
    max_reliability: f64,
) -> DivergencePoints {
    let Some(t1) = type1_from(event, inputs.segments, inputs.pivots, cfg) else {
        return DivergencePoints {
            type1: None,
            type2: None,
            pullback: None,
        };
    };
    let (pullback, type2) = match event.source {
        DivergenceSource::Segment => (
            pullback_leg(&t1, inputs.segments),
            type2_after(&t1, inputs.segments, inputs.bars, cfg, max_reliability).map(
                |(j, mut p)| {
                    p.segment = Some(SegmentId(j));
                    p
                },
            ),
        ),
        DivergenceSource::Streaming => (
            pullback_leg(&t1, inputs.strokes),
            type2_after(&t1, inputs.strokes, inputs.bars, cfg, max_reliability).map(
                |(j, mut p)| {
                    p.stroke = Some(StrokeId(j));
                    p
                },
            ),
        ),
    };
    DivergencePoints {
        type1: Some(t1),
        type2,
        pullback,
    }
}

/// All signal points of a level, ordered by (bar, kind, side).
pub fn classify_signals(
    inputs: &SignalInputs<'_>,
    cfg: &SignalConfig,
    max_reliability: f64,
) -> Vec<SignalPoint> {
    let mut points: Vec<SignalPoint> = inputs
        .divergences
        .iter()
        .flat_map(|event| points_from_divergence(event, inputs, cfg, max_reliability).into_points())
        .collect();
    points.extend(
        inputs
            .pivots
            .iter()
            .filter_map(|z| type3_for(z, inputs.segments, inputs.bars, cfg, max_reliability)),
    );
    dedupe(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{segments_from_path, strokes_from_path, PathSwing};
    use crate::data::synthetic::bars_from_closes;
    use crate::domain::{DivergenceId, PivotId, RegionSpan};

    const CAP: f64 = 0.95;

    fn bars(n: usize) -> Vec<Bar> {
        bars_from_closes(&vec![100.0; n], 1.0)
    }

    fn span(start: usize, extreme_raw: usize, price: f64) -> RegionSpan {
        RegionSpan {
            start_raw: start,
            end_raw: extreme_raw + 1,
            area: 1.0,
            extreme_price: price,
            extreme_raw,
        }
    }

    fn streaming_bottom(earlier_start: usize, later_raw: usize, price: f64) -> DivergenceEvent {
        let b = bars(later_raw + 1);
        DivergenceEvent {
            id: DivergenceId(0),
            kind: DivergenceKind::Bottom,
            source: DivergenceSource::Streaming,
            earlier: span(earlier_start, earlier_start + 1, price + 1.0),
            later: span(later_raw - 1, later_raw, price),
            area_ratio: 0.5,
            price_change: 0.01,
            cross_raw: later_raw + 1,
            timestamp: b[later_raw].timestamp,
            reliability: 0.6,
            pivot: None,
            entering: None,
            leaving: None,
        }
    }

    // ── Type 1 ──

    #[test]
    fn streaming_type1_needs_trend_run() {
        let cfg = SignalConfig::default();
        let event = streaming_bottom(0, 10, 90.0);
        let p = type1_from(&event, &[], &[], &cfg).unwrap();
        assert_eq!((p.kind, p.side), (SignalKind::Type1, Side::Buy));
        assert_eq!(p.price, 90.0);
        assert_eq!(p.raw_index, 10);
        assert_eq!(p.divergence, Some(DivergenceId(0)));

        let short = streaming_bottom(8, 10, 90.0);
        assert!(type1_from(&short, &[], &[], &cfg).is_none());
    }

    #[test]
    fn segment_type1_needs_entry_from_beyond_band() {
        let cfg = SignalConfig::default();
        // entering G0 falls 20 -> 12 into the band [12.5, 14)
        let segments = segments_from_path(&[20.0, 12.0, 15.0, 12.5, 14.0, 11.0, 13.0]);
        let pivot = PivotZone::new(
            PivotId(0),
            12.5,
            14.0,
            vec![SegmentId(1), SegmentId(2), SegmentId(3)],
        );
        let mut event = streaming_bottom(0, 25, 11.0);
        event.source = DivergenceSource::Segment;
        event.pivot = Some(PivotId(0));
        event.entering = Some(SegmentId(0));
        event.leaving = Some(SegmentId(4));
        let p = type1_from(&event, &segments, std::slice::from_ref(&pivot), &cfg).unwrap();
        assert_eq!(p.segment, Some(SegmentId(4)));
        assert_eq!(p.pivot, Some(PivotId(0)));

        let low_entry = segments_from_path(&[13.0, 12.0, 15.0, 12.5, 14.0, 11.0, 13.0]);
        assert!(type1_from(&event, &low_entry, std::slice::from_ref(&pivot), &cfg).is_none());
    }

    fn streaming_top(earlier_start: usize, later_raw: usize, price: f64) -> DivergenceEvent {
        let mut event = streaming_bottom(earlier_start, later_raw, price);
        event.kind = DivergenceKind::Top;
        event.earlier.extreme_price = price - 1.0;
        event
    }

    #[test]
    fn segment_type1_sell_needs_entry_from_below_band() {
        let cfg = SignalConfig::default();
        // entering G0 rises 5 -> 13 through the band [10.5, 12.5]
        let segments = segments_from_path(&[5.0, 13.0, 10.0, 12.5, 10.5, 16.0, 14.0]);
        let pivot = PivotZone::new(
            PivotId(0),
            10.5,
            12.5,
            vec![SegmentId(1), SegmentId(2), SegmentId(3)],
        );
        let mut event = streaming_top(0, 24, 16.0);
        event.source = DivergenceSource::Segment;
        event.pivot = Some(PivotId(0));
        event.entering = Some(SegmentId(0));
        event.leaving = Some(SegmentId(4));
        let p = type1_from(&event, &segments, std::slice::from_ref(&pivot), &cfg).unwrap();
        assert_eq!((p.kind, p.side), (SignalKind::Type1, Side::Sell));
        assert_eq!(p.price, 16.0);
        assert_eq!(p.raw_index, 24);
        assert_eq!(p.segment, Some(SegmentId(4)));

        let high_entry = segments_from_path(&[11.0, 13.0, 10.0, 12.5, 10.5, 16.0, 14.0]);
        assert!(type1_from(&event, &high_entry, std::slice::from_ref(&pivot), &cfg).is_none());
    }

    #[test]
    fn streaming_top_yields_type1_and_type2_sells() {
        let cfg = SignalConfig::default();
        let b = bars(40);
        // peak 112 at raw 15, bounce 107 -> 110 stays under it, then 110 -> 102
        let strokes = strokes_from_path(&[100.0, 108.0, 104.0, 112.0, 107.0, 110.0, 102.0]);
        let event = streaming_top(0, 15, 112.0);
        let inputs = SignalInputs {
            bars: &b,
            strokes: &strokes,
            segments: &[],
            pivots: &[],
            divergences: std::slice::from_ref(&event),
        };

        let derived = points_from_divergence(&event, &inputs, &cfg, CAP);
        assert_eq!(derived.pullback, Some(4));
        let t1 = derived.type1.clone().unwrap();
        assert_eq!((t1.kind, t1.side), (SignalKind::Type1, Side::Sell));
        assert_eq!((t1.price, t1.raw_index), (112.0, 15));
        let t2 = derived.type2.clone().unwrap();
        assert_eq!((t2.kind, t2.side), (SignalKind::Type2, Side::Sell));
        assert_eq!((t2.price, t2.raw_index), (110.0, 25));
        assert_eq!(t2.stroke, Some(StrokeId(4)));
        assert_eq!(t2.divergence, Some(DivergenceId(0)));
        // the bounce gave back 40% of the 112 -> 107 drop
        assert!((t2.reliability - (0.8 * 0.6 + 0.2 * 0.4)).abs() < 1e-12);

        let signals = classify_signals(&inputs, &cfg, CAP);
        let kinds: Vec<_> = signals.iter().map(|p| (p.kind, p.side, p.raw_index)).collect();
        assert_eq!(
            kinds,
            vec![(SignalKind::Type1, Side::Sell, 15), (SignalKind::Type2, Side::Sell, 25)]
        );
    }

    #[test]
    fn type2_sell_rejects_higher_high() {
        let cfg = SignalConfig::default();
        let event = streaming_top(0, 15, 112.0);
        let t1 = type1_from(&event, &[], &[], &cfg).unwrap();
        let higher = PathSwing::from_path(&[100.0, 108.0, 104.0, 112.0, 107.0, 113.0, 102.0]);
        assert!(type2_after(&t1, &higher, &bars(40), &cfg, CAP).is_none());
    }

    // ── Type 2 ──

    fn type1_buy(raw: usize, price: f64) -> SignalPoint {
        let b = bars(raw + 1);
        SignalPoint::new(SignalKind::Type1, Side::Buy, price, b[raw].timestamp, raw, 0.5)
    }

    #[test]
    fn type2_buy_on_higher_low() {
        let cfg = SignalConfig::default();
        // legs: 10->9 (type-1 low at raw 5), 9->12, 12->10, 10->13
        let legs = PathSwing::from_path(&[10.0, 9.0, 12.0, 10.0, 13.0]);
        let (j, p) = type2_after(&type1_buy(5, 9.0), &legs, &bars(30), &cfg, CAP).unwrap();
        assert_eq!(j, 2);
        assert_eq!((p.kind, p.side), (SignalKind::Type2, Side::Buy));
        assert_eq!(p.price, 10.0);
        assert_eq!(p.raw_index, 15);
        // the pullback kept a third of the 9 -> 12 move
        let expected = 0.8 * 0.5 + 0.2 * (1.0 / 3.0);
        assert!((p.reliability - expected).abs() < 1e-12);
    }

    #[test]
    fn type2_rejects_lower_low_and_unconfirmed_leg() {
        let cfg = SignalConfig::default();
        let lower = PathSwing::from_path(&[10.0, 9.0, 12.0, 8.5, 13.0]);
        assert!(type2_after(&type1_buy(5, 9.0), &lower, &bars(30), &cfg, CAP).is_none());

        let loose = SignalConfig {
            type2_tolerance: 0.1,
            ..SignalConfig::default()
        };
        assert!(type2_after(&type1_buy(5, 9.0), &lower, &bars(30), &loose, CAP).is_some());

        let unconfirmed = PathSwing::from_path(&[10.0, 9.0, 12.0, 10.0]);
        assert!(type2_after(&type1_buy(5, 9.0), &unconfirmed, &bars(30), &cfg, CAP).is_none());
    }

    // ── Type 3 ──

    fn band() -> PivotZone {
        PivotZone::new(
            PivotId(0),
            12.0,
            14.0,
            vec![SegmentId(0), SegmentId(1), SegmentId(2)],
        )
    }

    #[test]
    fn type3_buy_when_test_holds_above_band() {
        let cfg = SignalConfig::default();
        // members 10->15->12->14, exit 14->18, test 18->15, then 15->20
        let segments = segments_from_path(&[10.0, 15.0, 12.0, 14.0, 18.0, 15.0, 20.0]);
        let p = type3_for(&band(), &segments, &bars(40), &cfg, CAP).unwrap();
        assert_eq!((p.kind, p.side), (SignalKind::Type3, Side::Buy));
        assert_eq!(p.price, 15.0);
        assert_eq!(p.segment, Some(SegmentId(4)));
        assert!((p.reliability - 0.75).abs() < 1e-12);
    }

    #[test]
    fn type3_sell_when_test_stays_below() {
        let cfg = SignalConfig::default();
        let segments = segments_from_path(&[10.0, 15.0, 12.0, 14.0, 9.0, 11.0, 7.0]);
        let p = type3_for(&band(), &segments, &bars(40), &cfg, CAP).unwrap();
        assert_eq!(p.side, Side::Sell);
        assert_eq!(p.price, 11.0);
    }

    #[test]
    fn type3_requires_finalized_test_outside_band() {
        let cfg = SignalConfig::default();
        let back_inside = segments_from_path(&[10.0, 15.0, 12.0, 14.0, 18.0, 13.0, 20.0]);
        assert!(type3_for(&band(), &back_inside, &bars(40), &cfg, CAP).is_none());

        // test segment is the open last one
        let open_test = segments_from_path(&[10.0, 15.0, 12.0, 14.0, 18.0, 15.0]);
        assert!(type3_for(&band(), &open_test, &bars(40), &cfg, CAP).is_none());

        let strict = SignalConfig {
            type3_tolerance: 0.1,
            ..SignalConfig::default()
        };
        let shallow = segments_from_path(&[10.0, 15.0, 12.0, 14.0, 18.0, 15.0, 20.0]);
        assert!(type3_for(&band(), &shallow, &bars(40), &strict, CAP).is_none());
    }

    #[test]
    fn classify_dedupes_and_orders() {
        let cfg = SignalConfig::default();
        let b = bars(40);
        let mut strong = streaming_bottom(0, 10, 90.0);
        strong.reliability = 0.9;
        let weak = streaming_bottom(2, 10, 90.0);
        let divergences = [weak, strong];
        let inputs = SignalInputs {
            bars: &b,
            strokes: &[],
            segments: &[],
            pivots: &[],
            divergences: &divergences,
        };
        let signals = classify_signals(&inputs, &cfg, CAP);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].reliability, 0.9);
    }
}
