//! MACD divergence.
//!
//! Two comparison modes share the same test. The later region must carry less
//! histogram momentum than the earlier one (by the configured area ratio),
//! price must make a new extreme in the trend direction, and a confirming
//! MACD cross must follow the later extreme within the confirmation window.
//!
//! - segment mode compares the segment entering a pivot with the first
//!   same-direction segment leaving it;
//! - streaming mode compares histogram regions `k-2` and `k` when `k` closes.

use crate::config::DivergenceConfig;
use crate::domain::{
    Bar, DivergenceEvent, DivergenceId, DivergenceKind, DivergenceSource, Direction,
    HistogramRegion, PivotZone, RegionSpan, Segment, SegmentId,
};

// ── Histogram bookkeeping ──

/// Running prefix sums of positive and negative histogram magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramAreas {
    positive: Vec<f64>,
    negative: Vec<f64>,
}

impl Default for HistogramAreas {
    fn default() -> Self {
        Self {
            positive: vec![0.0],
            negative: vec![0.0],
        }
    }
}

impl HistogramAreas {
    pub fn from_histogram(hist: &[f64]) -> Self {
        let mut areas = Self::default();
        for &h in hist {
            areas.push(h);
        }
        areas
    }

    pub fn push(&mut self, h: f64) {
        let (pos, neg) = match h {
            h if h > 0.0 => (h, 0.0),
            h if h < 0.0 => (0.0, -h),
            _ => (0.0, 0.0),
        };
        let last_pos = self.positive[self.positive.len() - 1];
        let last_neg = self.negative[self.negative.len() - 1];
        self.positive.push(last_pos + pos);
        self.negative.push(last_neg + neg);
    }

    pub fn len(&self) -> usize {
        self.positive.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Σ|h| over `start..=end` for the sign matching `positive`.
    pub fn area(&self, start: usize, end: usize, positive: bool) -> f64 {
        let sums = if positive { &self.positive } else { &self.negative };
        let end = (end + 1).min(sums.len() - 1);
        if start >= end {
            return 0.0;
        }
        sums[end] - sums[start]
    }
}

/// Splits the histogram into maximal same-sign runs as values arrive.
///
/// Zeros join the current run; leading zeros and warmup NaNs are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionTracker {
    regions: Vec<HistogramRegion>,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn regions(&self) -> &[HistogramRegion] {
        &self.regions
    }

    /// Number of closed regions (all but a trailing open one).
    pub fn closed_len(&self) -> usize {
        match self.regions.last() {
            Some(r) if !r.closed => self.regions.len() - 1,
            _ => self.regions.len(),
        }
    }

    /// Feed the histogram value of raw bar `index`. Returns the index of a
    /// region closed by this value, if any.
    pub fn push(&mut self, index: usize, h: f64, bar: &Bar) -> Option<usize> {
        if !h.is_finite() {
            return None;
        }
        let current = self.regions.last_mut();
        let joins = match &current {
            Some(r) => h == 0.0 || (h > 0.0) == r.positive,
            None => false,
        };
        if joins {
            if let Some(r) = current {
                r.end = index;
                r.area += h.abs();
                let better = if r.positive {
                    bar.high > r.extreme_price
                } else {
                    bar.low < r.extreme_price
                };
                if better {
                    r.extreme_price = if r.positive { bar.high } else { bar.low };
                    r.extreme_raw = index;
                }
            }
            return None;
        }
        if h == 0.0 {
            return None;
        }

        let closed = match self.regions.last_mut() {
            Some(r) => {
                r.closed = true;
                Some(self.regions.len() - 1)
            }
            None => None,
        };
        let positive = h > 0.0;
        self.regions.push(HistogramRegion {
            positive,
            start: index,
            end: index,
            area: h.abs(),
            extreme_price: if positive { bar.high } else { bar.low },
            extreme_raw: index,
            closed: false,
        });
        closed
    }
}

pub fn histogram_regions(hist: &[f64], bars: &[Bar]) -> Vec<HistogramRegion> {
    let mut tracker = RegionTracker::new();
    for (i, (&h, bar)) in hist.iter().zip(bars).enumerate() {
        tracker.push(i, h, bar);
    }
    tracker.regions
}

/// First MACD cross in `from..=from + window`: bullish means the histogram
/// turns from negative to non-negative.
pub fn find_cross(hist: &[f64], from: usize, window: usize, bullish: bool) -> Option<usize> {
    let last = (from + window).min(hist.len().checked_sub(1)?);
    (from.max(1)..=last).find(|&c| {
        if bullish {
            hist[c - 1] < 0.0 && hist[c] >= 0.0
        } else {
            hist[c - 1] > 0.0 && hist[c] <= 0.0
        }
    })
}

/// Mean of the area-deviation and price-difference scores, capped.
pub fn reliability(ratio: f64, threshold: f64, price_change: f64, cfg: &DivergenceConfig) -> f64 {
    let area_score = ((ratio - threshold).abs() / threshold).min(1.0);
    let price_score = (price_change / cfg.price_scale).min(1.0);
    ((area_score + price_score) / 2.0).min(cfg.max_reliability)
}

/// Outcome of one comparison. `settled` is false while the confirmation
/// window still extends past the last bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub event: Option<DivergenceEvent>,
    pub settled: bool,
}

impl Evaluation {
    fn none() -> Self {
        Self {
            event: None,
            settled: true,
        }
    }
}

/// Shared divergence test for two spans of the same momentum sign.
fn compare(
    kind: DivergenceKind,
    source: DivergenceSource,
    earlier: RegionSpan,
    later: RegionSpan,
    bars: &[Bar],
    hist: &[f64],
    cfg: &DivergenceConfig,
) -> Evaluation {
    if earlier.area <= 0.0 || earlier.extreme_price <= 0.0 {
        return Evaluation::none();
    }
    let ratio = later.area / earlier.area;
    let (threshold, area_ok, new_extreme) = match kind {
        DivergenceKind::Bottom => (
            cfg.bottom_area_ratio,
            ratio < cfg.bottom_area_ratio,
            later.extreme_price < earlier.extreme_price,
        ),
        DivergenceKind::Top => (
            cfg.top_area_ratio,
            ratio < cfg.top_area_ratio,
            later.extreme_price > earlier.extreme_price,
        ),
    };
    if !area_ok || !new_extreme {
        return Evaluation::none();
    }

    let bullish = kind == DivergenceKind::Bottom;
    let cross = find_cross(hist, later.extreme_raw, cfg.confirm_window, bullish);
    let window_complete = later.extreme_raw + cfg.confirm_window < hist.len();
    let Some(cross_raw) = cross else {
        return Evaluation {
            event: None,
            settled: window_complete,
        };
    };

    let price_change = (later.extreme_price - earlier.extreme_price).abs() / earlier.extreme_price;
    let event = DivergenceEvent {
        id: DivergenceId(0),
        kind,
        source,
        area_ratio: ratio,
        price_change,
        cross_raw,
        timestamp: bars[later.extreme_raw].timestamp,
        reliability: reliability(ratio, threshold, price_change, cfg),
        earlier,
        later,
        pivot: None,
        entering: None,
        leaving: None,
    };
    Evaluation {
        event: Some(event),
        settled: true,
    }
}

fn span_of_region(r: &HistogramRegion) -> RegionSpan {
    RegionSpan {
        start_raw: r.start,
        end_raw: r.end,
        area: r.area,
        extreme_price: r.extreme_price,
        extreme_raw: r.extreme_raw,
    }
}

/// Streaming comparison of `regions[k - 2]` and `regions[k]`.
pub fn evaluate_regions(
    regions: &[HistogramRegion],
    k: usize,
    bars: &[Bar],
    hist: &[f64],
    cfg: &DivergenceConfig,
) -> Evaluation {
    if k < 2 || k >= regions.len() || !regions[k].closed {
        return Evaluation::none();
    }
    let (earlier, later) = (&regions[k - 2], &regions[k]);
    if earlier.positive != later.positive {
        return Evaluation::none();
    }
    let kind = if later.positive {
        DivergenceKind::Top
    } else {
        DivergenceKind::Bottom
    };
    compare(
        kind,
        DivergenceSource::Streaming,
        span_of_region(earlier),
        span_of_region(later),
        bars,
        hist,
        cfg,
    )
}

/// Raw span of a segment with its histogram area and price extreme.
fn span_of_segment(seg: &Segment, bars: &[Bar], areas: &HistogramAreas) -> Option<RegionSpan> {
    let end = seg.end_raw.min(bars.len().checked_sub(1)?);
    let start = seg.start_raw.min(end);
    let positive = seg.direction == Direction::Up;
    let mut extreme_raw = start;
    for i in start..=end {
        let better = if positive {
            bars[i].high > bars[extreme_raw].high
        } else {
            bars[i].low < bars[extreme_raw].low
        };
        if better {
            extreme_raw = i;
        }
    }
    Some(RegionSpan {
        start_raw: start,
        end_raw: end,
        area: areas.area(start, end, positive),
        extreme_price: if positive {
            bars[extreme_raw].high
        } else {
            bars[extreme_raw].low
        },
        extreme_raw,
    })
}

/// Segments compared around `pivot`: the one entering it and the first
/// later one of the same direction leaving it.
pub fn pivot_legs(pivot: &PivotZone, segments: &[Segment]) -> Option<(usize, usize)> {
    let entering = pivot.first_member()?.0.checked_sub(1)?;
    let after = pivot.last_member()?.0 + 1;
    let direction = segments.get(entering)?.direction;
    let leaving = (after..segments.len()).find(|&j| segments[j].direction == direction)?;
    Some((entering, leaving))
}

/// Segment-mode comparison around one pivot.
pub fn evaluate_pivot(
    pivot: &PivotZone,
    segments: &[Segment],
    bars: &[Bar],
    hist: &[f64],
    areas: &HistogramAreas,
    cfg: &DivergenceConfig,
) -> Evaluation {
    let Some((entering, leaving)) = pivot_legs(pivot, segments) else {
        return Evaluation::none();
    };
    let (enter_seg, leave_seg) = (&segments[entering], &segments[leaving]);
    if !enter_seg.valid || !leave_seg.valid {
        return Evaluation::none();
    }
    let (Some(earlier), Some(later)) = (
        span_of_segment(enter_seg, bars, areas),
        span_of_segment(leave_seg, bars, areas),
    ) else {
        return Evaluation::none();
    };
    let kind = match enter_seg.direction {
        Direction::Down => DivergenceKind::Bottom,
        Direction::Up => DivergenceKind::Top,
    };
    let mut eval = compare(kind, DivergenceSource::Segment, earlier, later, bars, hist, cfg);
    if let Some(event) = eval.event.as_mut() {
        event.pivot = Some(pivot.id);
        event.entering = Some(SegmentId(entering));
        event.leaving = Some(SegmentId(leaving));
    }
    eval
}

/// Sort events by the later extreme and number them from `first`.
pub fn assign_ids(events: &mut [DivergenceEvent], first: usize) {
    events.sort_by(|a, b| {
        (a.later.extreme_raw, a.source, a.earlier.start_raw)
            .cmp(&(b.later.extreme_raw, b.source, b.earlier.start_raw))
    });
    for (i, e) in events.iter_mut().enumerate() {
        e.id = DivergenceId(first + i);
    }
}

/// Batch detection over a complete level.
pub fn detect_divergences(
    bars: &[Bar],
    hist: &[f64],
    segments: &[Segment],
    pivots: &[PivotZone],
    cfg: &DivergenceConfig,
) -> Vec<DivergenceEvent> {
    let mut events = Vec::new();
    if cfg.mode.segment_enabled() {
        let areas = HistogramAreas::from_histogram(hist);
        for pivot in pivots {
            events.extend(evaluate_pivot(pivot, segments, bars, hist, &areas, cfg).event);
        }
    }
    if cfg.mode.streaming_enabled() {
        let regions = histogram_regions(hist, bars);
        for k in 2..regions.len() {
            events.extend(evaluate_regions(&regions, k, bars, hist, cfg).event);
        }
    }
    assign_ids(&mut events, 0);
    events
}
