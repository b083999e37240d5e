//! Streaming multi-level analysis from a single base feed.
//!
//! Base bars go straight into the finest level's pipeline. Every coarser
//! level aggregates them into its own bucket and receives the bucket once a
//! bar from the next bucket arrives. [`MultiLevelSession::report`] includes
//! each level's open bucket as a provisional bar, so a report equals what the
//! coordinator produces from the same feed through a resampling source.

use crate::config::{RunnerConfig, RunnerConfigError};
use crate::coordinator::{assemble, LevelError};
use crate::report::MultiLevelReport;
use chanlab_core::data::Timeframe;
use chanlab_core::domain::Bar;
use chanlab_core::{AnalysisError, LevelPipeline, LevelResult};
use tracing::warn;

#[derive(Debug, Clone)]
struct SessionLevel {
    timeframe: Timeframe,
    pipeline: LevelPipeline,
    /// Bucket still receiving base bars. Always empty for the base level.
    open: Option<Bar>,
    failed: Option<AnalysisError>,
}

impl SessionLevel {
    fn feed(&mut self, bar: Bar) {
        if self.failed.is_some() {
            return;
        }
        if let Err(err) = self.pipeline.push_bar(bar) {
            warn!(timeframe = %self.timeframe, error = %err, "level stopped");
            self.failed = Some(err);
        }
    }

    /// Fold a base bar into the open bucket, emitting the previous bucket
    /// when this bar starts a new one.
    fn aggregate(&mut self, bar: &Bar) {
        let bucket = self.timeframe.bucket_start(bar.timestamp);
        match self.open.as_mut() {
            Some(agg) if agg.timestamp == bucket => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
                agg.amount += bar.amount;
            }
            _ => {
                let next = Bar {
                    timestamp: bucket,
                    ..bar.clone()
                };
                if let Some(done) = self.open.replace(next) {
                    self.feed(done);
                }
            }
        }
    }

    fn snapshot(&self) -> Result<LevelResult, LevelError> {
        if let Some(err) = &self.failed {
            return Err(err.clone().into());
        }
        match &self.open {
            None => Ok(self.pipeline.snapshot()),
            Some(bar) => {
                let mut provisional = self.pipeline.clone();
                provisional.push_bar(bar.clone())?;
                Ok(provisional.snapshot())
            }
        }
    }
}

pub struct MultiLevelSession {
    config: RunnerConfig,
    base: Timeframe,
    /// Coarsest first; the base level is last.
    levels: Vec<SessionLevel>,
    pushed: usize,
}

impl MultiLevelSession {
    /// The finest configured level becomes the base feed.
    pub fn new(config: RunnerConfig) -> Result<Self, RunnerConfigError> {
        config.validate()?;
        let order = config.levels_coarse_to_fine();
        let base = order.last().copied().ok_or(RunnerConfigError::NoLevels)?;
        let levels = order
            .into_iter()
            .map(|timeframe| {
                let pipeline = LevelPipeline::new(config.analysis_for(timeframe).clone())
                    .map_err(|source| RunnerConfigError::Analysis {
                        level: timeframe.label().to_string(),
                        source,
                    })?;
                Ok(SessionLevel {
                    timeframe,
                    pipeline,
                    open: None,
                    failed: None,
                })
            })
            .collect::<Result<Vec<_>, RunnerConfigError>>()?;

        Ok(Self {
            config,
            base,
            levels,
            pushed: 0,
        })
    }

    pub fn base(&self) -> Timeframe {
        self.base
    }

    /// Base bars pushed so far.
    pub fn pushed(&self) -> usize {
        self.pushed
    }

    /// Push one base bar. A level that rejects a bar stops and is reported
    /// as failed; the other levels keep going.
    pub fn push_bar(&mut self, bar: Bar) {
        self.pushed += 1;
        let base = self.base;
        for level in &mut self.levels {
            if level.timeframe == base {
                level.feed(bar.clone());
            } else {
                level.aggregate(&bar);
            }
        }
    }

    pub fn extend<I>(&mut self, bars: I)
    where
        I: IntoIterator<Item = Bar>,
    {
        for bar in bars {
            self.push_bar(bar);
        }
    }

    /// Committed pipeline of one level, excluding its open bucket.
    pub fn pipeline(&self, timeframe: Timeframe) -> Option<&LevelPipeline> {
        self.levels
            .iter()
            .find(|l| l.timeframe == timeframe)
            .map(|l| &l.pipeline)
    }

    pub fn failed_levels(&self) -> Vec<Timeframe> {
        self.levels
            .iter()
            .filter(|l| l.failed.is_some())
            .map(|l| l.timeframe)
            .collect()
    }

    /// Snapshot every level and cross-confirm the signals.
    pub fn report(&self) -> MultiLevelReport {
        let outcomes = self
            .levels
            .iter()
            .map(|level| (level.timeframe, level.snapshot()))
            .collect();
        assemble(&self.config, outcomes)
    }
}
