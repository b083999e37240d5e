//! Pivot (consolidation band) building over any sequence of swings.
//!
//! Three consecutive swings with a common overlap form a band
//! `[max(lows), min(highs))`. While a pivot is active, each later swing
//! either breaks it (its end lands beyond the band by more than the break
//! threshold), extends it (overlap / band width reaches the configured
//! ratio; the band narrows to the intersection), or passes without effect.
//! A pivot formed right after a broken one whose band overlaps it is merged
//! into it.

use crate::config::PivotConfig;
use crate::domain::{CloseReason, PivotId, PivotStatus, PivotZone, SegmentId, Swing};

/// Resumable pivot state machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotBuilder {
    pivots: Vec<PivotZone>,
    active: Option<usize>,
    next_free: usize,
    processed: usize,
}

/// Position a [`PivotBuilder`] can be rewound to.
///
/// Later swings only append pivots or change the last one, so the checkpoint
/// keeps the pivot count and a copy of the last pivot instead of the list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotCheckpoint {
    len: usize,
    last: Option<PivotZone>,
    active: Option<usize>,
    next_free: usize,
    processed: usize,
    settled: usize,
}

impl PivotCheckpoint {
    /// Swings consumed when the checkpoint was taken.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Leading pivots that no swing after the checkpoint can change.
    pub fn settled(&self) -> usize {
        self.settled
    }
}

impl PivotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of swings consumed so far.
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn pivots(&self) -> &[PivotZone] {
        &self.pivots
    }

    pub fn into_pivots(self) -> Vec<PivotZone> {
        self.pivots
    }

    pub fn checkpoint(&self) -> PivotCheckpoint {
        PivotCheckpoint {
            len: self.pivots.len(),
            last: self.pivots.last().cloned(),
            active: self.active,
            next_free: self.next_free,
            processed: self.processed,
            settled: self.settled(),
        }
    }

    /// Return to `checkpoint`, which must have been taken from this builder
    /// with no rewind to an earlier one since.
    pub fn rewind(&mut self, checkpoint: &PivotCheckpoint) {
        self.pivots.truncate(checkpoint.len);
        if let (Some(slot), Some(last)) = (self.pivots.last_mut(), &checkpoint.last) {
            slot.clone_from(last);
        }
        self.active = checkpoint.active;
        self.next_free = checkpoint.next_free;
        self.processed = checkpoint.processed;
    }

    /// All pivots but the last while it is active, or while a pivot formed
    /// right after its break could still merge into it.
    fn settled(&self) -> usize {
        let Some(last) = self.pivots.last() else {
            return 0;
        };
        let reopenable = last.close_reason == Some(CloseReason::Break)
            && last.resume_from.is_some_and(|r| self.processed <= r + 2);
        if self.active.is_some() || reopenable {
            self.pivots.len() - 1
        } else {
            self.pivots.len()
        }
    }

    /// Consume `swings[self.processed()..upto]`.
    pub fn feed_until<S: Swing>(&mut self, swings: &[S], upto: usize, cfg: &PivotConfig) {
        let upto = upto.min(swings.len());
        while self.processed < upto {
            let k = self.processed;
            self.step(swings, k, cfg);
            self.processed += 1;
        }
    }

    /// Consume every swing not yet seen.
    pub fn feed<S: Swing>(&mut self, swings: &[S], cfg: &PivotConfig) {
        self.feed_until(swings, swings.len(), cfg);
    }

    fn step<S: Swing>(&mut self, swings: &[S], k: usize, cfg: &PivotConfig) {
        if let Some(a) = self.active {
            self.advance_active(a, &swings[k], k, cfg);
        } else if k >= self.next_free + 2 {
            self.try_form(swings, k, cfg);
        }
    }

    fn advance_active<S: Swing>(&mut self, a: usize, s: &S, k: usize, cfg: &PivotConfig) {
        let p = &mut self.pivots[a];
        let end = s.end_price();
        if end > p.high * (1.0 + cfg.break_threshold) || end < p.low * (1.0 - cfg.break_threshold) {
            p.status = PivotStatus::Inactive;
            p.close_reason = Some(CloseReason::Break);
            p.closed_at = Some(SegmentId(k));
            p.resume_from = Some(k);
            self.active = None;
            self.next_free = k;
            return;
        }

        let width = p.width();
        if width > 0.0 && s.overlap(p.low, p.high) / width >= cfg.overlap_ratio {
            let low = p.low.max(s.low());
            let high = p.high.min(s.high());
            p.set_band(low, high);
            p.extend_count += 1;
            p.members.push(SegmentId(k));
            if p.extend_count >= cfg.extension_cap {
                p.status = PivotStatus::Inactive;
                p.close_reason = Some(CloseReason::ExtensionCap);
                p.closed_at = Some(SegmentId(k));
                p.resume_from = Some(k + 1);
                self.active = None;
                self.next_free = k + 1;
            }
        }
    }

    fn try_form<S: Swing>(&mut self, swings: &[S], k: usize, cfg: &PivotConfig) {
        let trio = &swings[k - 2..=k];
        let low = trio.iter().map(Swing::low).fold(f64::NEG_INFINITY, f64::max);
        let high = trio.iter().map(Swing::high).fold(f64::INFINITY, f64::min);
        if high <= low {
            return;
        }
        let members: Vec<SegmentId> = (k - 2..=k).map(SegmentId).collect();

        if cfg.merge_overlapping {
            if let Some(last) = self.pivots.last_mut() {
                let follows_break = last.close_reason == Some(CloseReason::Break)
                    && last.resume_from == Some(k - 2);
                if follows_break && low < last.high && high > last.low {
                    let (l, h) = (last.low.min(low), last.high.max(high));
                    last.set_band(l, h);
                    last.members.extend(members);
                    last.merged += 1;
                    last.status = PivotStatus::Active;
                    last.close_reason = None;
                    last.closed_at = None;
                    last.resume_from = None;
                    self.active = Some(self.pivots.len() - 1);
                    return;
                }
            }
        }

        let id = self.pivots.len();
        self.pivots.push(PivotZone::new(PivotId(id), low, high, members));
        self.active = Some(id);
    }
}

pub fn build_pivots<S: Swing>(swings: &[S], cfg: &PivotConfig) -> Vec<PivotZone> {
    let mut builder = PivotBuilder::new();
    builder.feed(swings, cfg);
    builder.into_pivots()
}
