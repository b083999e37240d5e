//! Incremental per-level pipeline.
//!
//! Bars are validated and appended one at a time. Each raw bar feeds the
//! streaming MACD, the histogram region tracker and the containment stack;
//! the stack reports the lowest merged index it touched. A refresh then
//! re-derives only what can depend on that index:
//!
//! - turning points whose fractal window lies entirely below it are kept and
//!   detection resumes after the last kept one;
//! - strokes ending at a kept point are kept;
//! - finalized segments whose consulted strokes all survived are kept;
//! - pivots are replayed from a checkpoint taken at the frozen segments.
//!
//! A segment is frozen once the segment after it is finalized as well. If a
//! merge ever reaches a merged bar a frozen segment depends on, the level is
//! rebuilt from scratch and a [`Diagnostic::FullRebuild`] is recorded, so the
//! incremental result always equals a batch run over the same bars.
//!
//! Divergences and signal points are kept as a settled prefix plus a tail.
//! Every event or point that can still change lies at or after the horizon,
//! a raw index derived from the frozen segments, the unsettled pivots and the
//! open histogram regions. Settled entries below the horizon are appended to
//! the prefix once and never revisited.

use tracing::{debug, warn};

use super::result::{LevelResult, StructureView, Summary};
use crate::analysis::divergence::{assign_ids, pivot_legs};
use crate::analysis::{
    dedupe, evaluate_pivot, evaluate_regions, pivot_exit, points_from_divergence,
    refresh_confirmations, resume_detection, resume_segments, resume_strokes, type3_for,
    ContainmentStack, HistogramAreas, PivotBuilder, PivotCheckpoint, RegionTracker, SignalInputs,
};
use crate::config::AnalysisConfig;
use crate::data::{screen_bar, Screened};
use crate::domain::{
    Bar, DivergenceEvent, DivergenceSource, MergedBar, PivotZone, Segment, SignalPoint, Stroke,
    TurningPoint,
};
use crate::error::{AnalysisError, ConfigError, Diagnostic, InputDataError, Stage};
use crate::indicators::MacdState;

/// Segments that can no longer change, and the pivot state after them.
#[derive(Debug, Clone, Default)]
struct FrozenPrefix {
    segments: usize,
    /// Highest merged index the frozen segments depend on.
    boundary: Option<usize>,
    /// Copy of the last frozen segment, checked after every refresh.
    anchor: Option<Segment>,
    pivots: PivotCheckpoint,
    /// Pivot state one segment earlier, while it is still reachable.
    previous: Option<PivotCheckpoint>,
}

/// Settled divergences. `divergences[..committed]` is final.
#[derive(Debug, Clone, Default)]
struct DivergenceMemo {
    /// Pivots before this index have been compared for good.
    pivots: usize,
    /// Final events at or after the horizon, not yet committed.
    carried: Vec<DivergenceEvent>,
    committed: usize,
}

/// Settled signal points. `signals[..committed]` is final.
#[derive(Debug, Clone, Default)]
struct SignalMemo {
    /// Divergences before this index have yielded all their points.
    divergences: usize,
    /// Pivots before this index have yielded their Type-3 point.
    pivots: usize,
    carried: Vec<SignalPoint>,
    committed: usize,
}

/// How much of a level no further bar can change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settled {
    pub segments: usize,
    pub pivots: usize,
    pub divergences: usize,
    pub signals: usize,
}

#[derive(Debug, Clone)]
pub struct LevelPipeline {
    cfg: AnalysisConfig,
    config_hash: String,
    offered: usize,
    bars: Vec<Bar>,
    macd: MacdState,
    histogram: Vec<f64>,
    areas: HistogramAreas,
    regions: RegionTracker,
    merged: ContainmentStack<MergedBar>,
    dirty_from: Option<usize>,
    points: Vec<TurningPoint>,
    strokes: Vec<Stroke>,
    segments: Vec<Segment>,
    pivots: PivotBuilder,
    frozen: FrozenPrefix,
    /// Closed regions whose confirmation window was still open.
    pending_regions: Vec<usize>,
    divergence_memo: DivergenceMemo,
    divergences: Vec<DivergenceEvent>,
    signal_memo: SignalMemo,
    signals: Vec<SignalPoint>,
    /// Dropped rows, iteration caps and rebuilds, in order of occurrence.
    events: Vec<Diagnostic>,
    segment_diagnostics: Vec<Diagnostic>,
}

impl LevelPipeline {
    pub fn new(cfg: AnalysisConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            config_hash: cfg.config_hash(),
            offered: 0,
            bars: Vec::new(),
            macd: MacdState::new(&cfg.macd),
            histogram: Vec::new(),
            areas: HistogramAreas::default(),
            regions: RegionTracker::new(),
            merged: ContainmentStack::new(None, cfg.merge.max_iterations),
            dirty_from: None,
            points: Vec::new(),
            strokes: Vec::new(),
            segments: Vec::new(),
            pivots: PivotBuilder::new(),
            frozen: FrozenPrefix::default(),
            pending_regions: Vec::new(),
            divergence_memo: DivergenceMemo::default(),
            divergences: Vec::new(),
            signal_memo: SignalMemo::default(),
            signals: Vec::new(),
            events: Vec::new(),
            segment_diagnostics: Vec::new(),
            cfg,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.cfg
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// MACD histogram per raw bar, NaN during warmup.
    pub fn histogram(&self) -> &[f64] {
        &self.histogram
    }

    pub fn merged(&self) -> &[MergedBar] {
        self.merged.items()
    }

    pub fn points(&self) -> &[TurningPoint] {
        &self.points
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn pivots(&self) -> &[PivotZone] {
        self.pivots.pivots()
    }

    pub fn divergences(&self) -> &[DivergenceEvent] {
        &self.divergences
    }

    pub fn signals(&self) -> &[SignalPoint] {
        &self.signals
    }

    /// Number of leading segments that can no longer change.
    pub fn frozen_segments(&self) -> usize {
        self.frozen.segments
    }

    /// Leading entries of each output that later bars leave untouched.
    pub fn settled(&self) -> Settled {
        Settled {
            segments: self.frozen.segments,
            pivots: self.frozen.pivots.settled(),
            divergences: self.divergence_memo.committed,
            signals: self.signal_memo.committed,
        }
    }

    /// Append one bar and bring every structure up to date.
    pub fn push_bar(&mut self, bar: Bar) -> Result<(), AnalysisError> {
        if self.accept(bar)? {
            self.refresh();
        }
        Ok(())
    }

    /// Append many bars with a single refresh at the end. On a validation
    /// error the bars before it stay applied.
    pub fn extend<I>(&mut self, bars: I) -> Result<(), AnalysisError>
    where
        I: IntoIterator<Item = Bar>,
    {
        let result = bars.into_iter().try_for_each(|bar| self.accept(bar).map(|_| ()));
        self.refresh();
        result.map_err(AnalysisError::from)
    }

    /// Validate and ingest one bar without refreshing the structures.
    /// Returns false when the bar was dropped under the repair policy.
    fn accept(&mut self, bar: Bar) -> Result<bool, InputDataError> {
        let index = self.offered;
        self.offered += 1;
        let previous = self.bars.last().map(|b| b.timestamp);
        if let Screened::Dropped(diagnostic) =
            screen_bar(index, &bar, previous, self.cfg.validation.policy)?
        {
            self.events.push(diagnostic);
            return Ok(false);
        }

        let raw = self.bars.len();
        let h = self.macd.push(bar.close).histogram.unwrap_or(f64::NAN);
        self.histogram.push(h);
        self.areas.push(h);
        let mut merged = MergedBar::from_raw(raw, &bar);
        if h.is_finite() {
            merged.histogram = Some(h);
        }
        self.bars.push(bar);

        if let Some(k) = self.regions.push(raw, h, &self.bars[raw]) {
            self.close_region(k);
        }

        let outcome = self.merged.push(merged);
        if outcome.capped {
            warn!(at_bar = raw, iterations = outcome.iterations, "containment merge hit iteration cap");
            self.events.push(Diagnostic::MergeIterationCap {
                at_bar: raw,
                iterations: outcome.iterations,
            });
        }
        let touched = outcome.lowest_touched;
        self.dirty_from = Some(self.dirty_from.map_or(touched, |d| d.min(touched)));
        Ok(true)
    }

    fn close_region(&mut self, k: usize) {
        if !self.cfg.divergence.mode.streaming_enabled() {
            return;
        }
        let eval = evaluate_regions(
            self.regions.regions(),
            k,
            &self.bars,
            &self.histogram,
            &self.cfg.divergence,
        );
        if eval.settled {
            self.divergence_memo.carried.extend(eval.event);
        } else {
            self.pending_regions.push(k);
        }
    }

    /// Re-derive every structure that can depend on merged bars at or after
    /// the lowest index touched since the last refresh.
    pub fn refresh(&mut self) {
        let Some(dirty) = self.dirty_from.take() else {
            return;
        };
        let dirty = match self.frozen.boundary {
            Some(boundary) if dirty <= boundary => self.rebuild(dirty, boundary),
            _ => dirty,
        };
        self.update_structures(dirty);

        let anchor_moved = self.frozen.anchor.as_ref().is_some_and(|anchor| {
            self.segments.get(anchor.id.0) != Some(anchor)
        });
        if anchor_moved {
            let boundary = self.frozen.boundary.unwrap_or(0);
            let dirty = self.rebuild(dirty, boundary);
            self.update_structures(dirty);
        }

        self.update_pivots();
        self.update_divergences();
        self.update_signals();
        debug!(
            bars = self.bars.len(),
            merged = self.merged.len(),
            points = self.points.len(),
            strokes = self.strokes.len(),
            segments = self.segments.len(),
            pivots = self.pivots.pivots().len(),
            frozen = self.frozen.segments,
            settled_divergences = self.divergence_memo.committed,
            settled_signals = self.signal_memo.committed,
            "level refreshed"
        );
    }

    fn rebuild(&mut self, merged_index: usize, frozen_boundary: usize) -> usize {
        warn!(merged_index, frozen_boundary, "merge reached frozen history, rebuilding level");
        self.events.push(Diagnostic::FullRebuild {
            merged_index,
            frozen_boundary,
        });
        self.points.clear();
        self.strokes.clear();
        self.segments.clear();
        self.frozen = FrozenPrefix::default();
        self.pivots = PivotBuilder::new();
        self.reset_outputs();
        0
    }

    /// Drop every settled divergence and signal point and replay the region
    /// closes, which do not depend on the structures.
    fn reset_outputs(&mut self) {
        self.divergence_memo = DivergenceMemo::default();
        self.signal_memo = SignalMemo::default();
        self.divergences.clear();
        self.signals.clear();
        self.pending_regions.clear();
        for k in 0..self.regions.closed_len() {
            self.close_region(k);
        }
    }

    fn update_structures(&mut self, dirty: usize) {
        let stable_points = self.update_points(dirty);
        let stable_strokes = self.update_strokes(stable_points);
        self.update_segments(stable_strokes);
    }

    /// Returns how many leading points are unchanged.
    fn update_points(&mut self, dirty: usize) -> usize {
        let cfg = &self.cfg.fractal;
        let bars = self.merged.items();
        let stable_below = dirty.saturating_sub(cfg.window_radius);
        let keep = self.points.partition_point(|p| p.merged_index < stable_below);
        let last_kept = keep.checked_sub(1).map(|i| self.points[i].clone());
        let from = last_kept.as_ref().map_or(0, |p| p.merged_index + 1);

        let mut points = std::mem::take(&mut self.points);
        points.truncate(keep);
        let mut points = resume_detection(bars, cfg, points, from);
        let confirm_from = points
            .get(keep.saturating_sub(1))
            .map_or(dirty, |p| p.merged_index.min(dirty));
        refresh_confirmations(&mut points, bars, cfg, confirm_from);

        let mut stable = keep;
        if let Some(before) = &last_kept {
            if !same_point(before, &points[keep - 1]) {
                stable -= 1;
            }
        }
        self.points = points;
        stable
    }

    /// Returns how many leading strokes are unchanged.
    fn update_strokes(&mut self, stable_points: usize) -> usize {
        let keep = self.strokes.partition_point(|s| s.end.0 < stable_points);
        let last_kept = keep.checked_sub(1).map(|i| self.strokes[i].clone());
        let mut strokes = std::mem::take(&mut self.strokes);
        strokes.truncate(keep);
        let strokes = resume_strokes(&self.points, self.merged.items(), &self.cfg.stroke, strokes);
        let mut stable = keep;
        if last_kept.is_some() && strokes.get(keep - 1) != last_kept.as_ref() {
            stable -= 1;
        }
        self.strokes = strokes;
        stable
    }

    fn update_segments(&mut self, stable_strokes: usize) {
        // Only the last segment can be open; consulted_until grows with the index.
        let finalized = self.finalized_segments();
        let keep = self.segments[..finalized].partition_point(|s| s.consulted_until < stable_strokes);
        let mut kept = std::mem::take(&mut self.segments);
        kept.truncate(keep);
        let build = resume_segments(&self.strokes, &self.cfg.segment, kept);
        self.segments = build.segments;
        self.segment_diagnostics = build.diagnostics;
    }

    fn finalized_segments(&self) -> usize {
        match self.segments.last() {
            Some(last) if !last.is_finalized() => self.segments.len() - 1,
            _ => self.segments.len(),
        }
    }

    /// Replay pivots from the frozen checkpoint.
    ///
    /// The last finalized segment can fall back to open while the frozen
    /// segments stay put, so the frozen count drops by at most one between
    /// refreshes. That step back resumes from the previous checkpoint and
    /// keeps the old anchor and boundary, which still guard everything
    /// settled so far.
    fn update_pivots(&mut self) {
        let frozen = self.finalized_segments().saturating_sub(1);
        let mut released = false;
        if frozen >= self.frozen.pivots.processed() {
            self.pivots.rewind(&self.frozen.pivots);
        } else if let Some(previous) = self
            .frozen
            .previous
            .take()
            .filter(|p| p.processed() == frozen)
        {
            debug!(frozen, "last frozen segment released");
            self.pivots.rewind(&previous);
            released = true;
        } else {
            self.pivots = PivotBuilder::new();
            self.frozen.pivots = PivotCheckpoint::default();
            self.reset_outputs();
        }

        let before_last = frozen.saturating_sub(1);
        if self.pivots.processed() <= before_last {
            self.pivots.feed_until(&self.segments, before_last, &self.cfg.pivot);
            self.frozen.previous = Some(self.pivots.checkpoint());
        }
        self.pivots.feed_until(&self.segments, frozen, &self.cfg.pivot);
        self.frozen.pivots = self.pivots.checkpoint();
        self.frozen.segments = frozen;
        if !released {
            self.frozen.anchor = frozen.checked_sub(1).map(|i| self.segments[i].clone());
            self.frozen.boundary = frozen.checked_sub(1).and_then(|i| self.dependency_of(i));
        }
        self.pivots.feed(&self.segments, &self.cfg.pivot);
    }

    /// Highest merged index segment `i` was derived from.
    fn dependency_of(&self, i: usize) -> Option<usize> {
        let seg = self.segments.get(i)?;
        let stroke = self.strokes.get(seg.consulted_until)?;
        let point = self.points.get(stroke.end.0)?;
        Some(point.merged_index + self.cfg.fractal.window_radius)
    }

    /// Strokes before this index stay put unless the level is rebuilt.
    fn stable_strokes(&self) -> usize {
        self.frozen
            .segments
            .checked_sub(1)
            .map_or(0, |i| self.segments[i].start_stroke.0)
    }

    /// Lowest raw index a divergence or signal point that may still change
    /// can sit at.
    ///
    /// Pullback legs past the frozen segments and strokes may still move, as
    /// may the comparisons of unsettled pivots and of pending or open
    /// histogram regions.
    fn horizon(&self) -> usize {
        let Some(last_frozen) = self.frozen.segments.checked_sub(1) else {
            return 0;
        };
        let mut horizon = self.segments[last_frozen].start_raw;
        let leg = self.stable_strokes().saturating_sub(1);
        if let Some(stroke) = self.strokes.get(leg) {
            horizon = horizon.min(stroke.start_raw);
        }

        let pivots = self.pivots.pivots();
        for pivot in &pivots[self.divergence_memo.pivots.min(pivots.len())..] {
            if let Some(seg) = pivot.first_member().and_then(|m| self.segments.get(m.0)) {
                horizon = horizon.min(seg.start_raw);
            }
        }

        if self.cfg.divergence.mode.streaming_enabled() {
            let regions = self.regions.regions();
            let open = regions
                .get(self.regions.closed_len())
                .map_or(self.bars.len(), |r| r.start);
            horizon = horizon.min(open);
            for &k in &self.pending_regions {
                horizon = horizon.min(regions[k].start);
            }
        }
        horizon
    }

    fn update_divergences(&mut self) {
        let cfg = &self.cfg.divergence;
        let frozen = self.frozen.segments;
        let settled_pivots = self.frozen.pivots.settled();
        let mut open = Vec::new();

        if cfg.mode.segment_enabled() {
            let pivots = self.pivots.pivots();
            let mut advancing = true;
            for (i, pivot) in pivots.iter().enumerate().skip(self.divergence_memo.pivots) {
                let eval = evaluate_pivot(
                    pivot,
                    &self.segments,
                    &self.bars,
                    &self.histogram,
                    &self.areas,
                    cfg,
                );
                advancing = advancing
                    && i < settled_pivots
                    && eval.settled
                    && legs_frozen(pivot, &self.segments, frozen);
                if advancing {
                    self.divergence_memo.pivots = i + 1;
                    self.divergence_memo.carried.extend(eval.event);
                } else {
                    open.extend(eval.event);
                }
            }
        } else {
            self.divergence_memo.pivots = settled_pivots;
        }

        if cfg.mode.streaming_enabled() {
            let mut still_pending = Vec::new();
            for &k in &self.pending_regions {
                let eval =
                    evaluate_regions(self.regions.regions(), k, &self.bars, &self.histogram, cfg);
                if eval.settled {
                    self.divergence_memo.carried.extend(eval.event);
                } else {
                    still_pending.push(k);
                    open.extend(eval.event);
                }
            }
            self.pending_regions = still_pending;
        }

        let horizon = self.horizon();
        let memo = &mut self.divergence_memo;
        let (mut commit, carried): (Vec<_>, Vec<_>) = std::mem::take(&mut memo.carried)
            .into_iter()
            .partition(|e| e.later.extreme_raw < horizon);
        self.divergences.truncate(memo.committed);
        assign_ids(&mut commit, memo.committed);
        self.divergences.extend(commit);
        memo.committed = self.divergences.len();
        memo.carried = carried;

        let mut tail = memo.carried.clone();
        tail.extend(open);
        assign_ids(&mut tail, memo.committed);
        self.divergences.extend(tail);
    }

    fn update_signals(&mut self) {
        let mut horizon = self.horizon();
        let cfg = &self.cfg.signal;
        let cap = self.cfg.divergence.max_reliability;
        let frozen = self.frozen.segments;
        let stable_strokes = self.stable_strokes();
        let settled_pivots = self.frozen.pivots.settled();
        let committed_divergences = self.divergence_memo.committed;
        let inputs = SignalInputs {
            bars: &self.bars,
            strokes: &self.strokes,
            segments: &self.segments,
            pivots: self.pivots.pivots(),
            divergences: &self.divergences,
        };
        let memo = &mut self.signal_memo;
        let mut open = Vec::new();

        let mut advancing = true;
        for (i, event) in inputs.divergences.iter().enumerate().skip(memo.divergences) {
            let derived = points_from_divergence(event, &inputs, cfg, cap);
            let stable_legs = match event.source {
                DivergenceSource::Segment => frozen,
                DivergenceSource::Streaming => stable_strokes,
            };
            let pullback_settled = derived.type1.is_none()
                || derived.pullback.is_some_and(|j| j + 1 < stable_legs);
            advancing = advancing && i < committed_divergences && pullback_settled;
            if advancing {
                memo.divergences = i + 1;
                memo.carried.extend(derived.into_points());
            } else {
                open.extend(derived.into_points());
            }
        }

        let mut advancing = true;
        for (i, pivot) in inputs.pivots.iter().enumerate().skip(memo.pivots) {
            let point = type3_for(pivot, inputs.segments, inputs.bars, cfg, cap);
            advancing = advancing
                && i < settled_pivots
                && pivot_exit(pivot, inputs.segments).is_some_and(|e| e + 1 < frozen);
            if advancing {
                memo.pivots = i + 1;
                memo.carried.extend(point);
            } else {
                open.extend(point);
            }
        }

        // Points of sources not yet passed start at their source's extreme.
        if let Some(event) = inputs.divergences.get(memo.divergences) {
            horizon = horizon.min(event.later.extreme_raw);
        }
        if let Some(seg) = inputs
            .pivots
            .get(memo.pivots)
            .and_then(|p| p.first_member())
            .and_then(|m| inputs.segments.get(m.0))
        {
            horizon = horizon.min(seg.start_raw);
        }

        let (commit, carried): (Vec<_>, Vec<_>) = std::mem::take(&mut memo.carried)
            .into_iter()
            .partition(|p| p.raw_index < horizon);
        self.signals.truncate(memo.committed);
        self.signals.extend(dedupe(commit));
        memo.committed = self.signals.len();
        memo.carried = carried;

        let mut tail = memo.carried.clone();
        tail.extend(open);
        self.signals.extend(dedupe(tail));
    }

    fn stage_diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let window = 2 * self.cfg.fractal.window_radius + 1;
        if self.merged.len() < window {
            diagnostics.push(Diagnostic::InsufficientData {
                stage: Stage::Fractal,
                required: window,
                available: self.merged.len(),
            });
        }
        if self.points.len() < 2 {
            diagnostics.push(Diagnostic::InsufficientData {
                stage: Stage::Stroke,
                required: 2,
                available: self.points.len(),
            });
        }
        diagnostics.extend(self.segment_diagnostics.iter().cloned());
        if self.segments.len() < 3 {
            diagnostics.push(Diagnostic::InsufficientData {
                stage: Stage::Pivot,
                required: 3,
                available: self.segments.len(),
            });
        }
        let warm = self.macd.lookback() + 1;
        if self.bars.len() < warm {
            diagnostics.push(Diagnostic::InsufficientData {
                stage: Stage::Divergence,
                required: warm,
                available: self.bars.len(),
            });
        }
        diagnostics
    }

    pub fn summary(&self) -> Summary {
        Summary::from_view(&StructureView {
            bars: self.bars.len(),
            last_close: self.bars.last().map(|b| b.close),
            merged: self.merged.items(),
            points: &self.points,
            strokes: &self.strokes,
            segments: &self.segments,
            pivots: self.pivots.pivots(),
            divergences: &self.divergences,
            signals: &self.signals,
        })
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> LevelResult {
        let mut diagnostics = self.events.clone();
        diagnostics.extend(self.stage_diagnostics());
        LevelResult {
            config_hash: self.config_hash.clone(),
            bars: self.bars.len(),
            merged: self.merged.items().to_vec(),
            points: self.points.clone(),
            strokes: self.strokes.clone(),
            segments: self.segments.clone(),
            pivots: self.pivots.pivots().to_vec(),
            divergences: self.divergences.clone(),
            signals: self.signals.clone(),
            summary: self.summary(),
            diagnostics,
        }
    }
}

/// Whether both compared segments of `pivot` are frozen, or the pivot has no
/// entering segment to compare.
fn legs_frozen(pivot: &PivotZone, segments: &[Segment], frozen: usize) -> bool {
    match pivot_legs(pivot, segments) {
        Some((_, leaving)) => leaving < frozen,
        None => pivot.first_member().is_some_and(|m| m.0 == 0),
    }
}

/// Fields a stroke reads from its end points.
fn same_point(a: &TurningPoint, b: &TurningPoint) -> bool {
    a.kind == b.kind
        && a.merged_index == b.merged_index
        && a.raw_index == b.raw_index
        && a.price == b.price
        && a.timestamp == b.timestamp
}

/// Batch analysis of one level.
pub fn analyze(bars: &[Bar], cfg: &AnalysisConfig) -> Result<LevelResult, AnalysisError> {
    let mut pipeline = LevelPipeline::new(cfg.clone())?;
    pipeline.extend(bars.iter().cloned())?;
    Ok(pipeline.snapshot())
}
