//! Multi-level coordinator: one pipeline per timeframe, run in parallel,
//! followed by cross-level confirmation.
//!
//! Levels share nothing while they run. A level whose bars cannot be loaded
//! or fail validation is reported as failed; the others still complete and
//! confirm each other.

use crate::confirmation::apply_confirmations;
use crate::config::{RunnerConfig, RunnerConfigError};
use crate::report::{LevelOutcome, LevelReport, MultiLevelReport, SCHEMA_VERSION};
use crate::source::{BarSource, SourceError};
use chanlab_core::data::Timeframe;
use chanlab_core::domain::SignalPoint;
use chanlab_core::fingerprint::fingerprint;
use chanlab_core::{analyze, AnalysisError, LevelResult};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

/// Why one level produced no result.
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("load bars: {0}")]
    Source(#[from] SourceError),

    #[error("analysis: {0}")]
    Analysis(#[from] AnalysisError),
}

pub struct Coordinator<S> {
    config: RunnerConfig,
    source: S,
}

impl<S: BarSource> Coordinator<S> {
    /// Validates the configuration, including every level's analysis config.
    pub fn new(config: RunnerConfig, source: S) -> Result<Self, RunnerConfigError> {
        config.validate()?;
        Ok(Self { config, source })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Analyse every configured level and cross-confirm the signals.
    pub fn run(&self) -> MultiLevelReport {
        let levels = self.config.levels_coarse_to_fine();
        info!(
            instrument = %self.config.instrument,
            levels = levels.len(),
            source = self.source.name(),
            "starting multi-level run"
        );

        let outcomes: Vec<(Timeframe, Result<LevelResult, LevelError>)> = levels
            .par_iter()
            .map(|&timeframe| (timeframe, self.run_level(timeframe)))
            .collect();

        assemble(&self.config, outcomes)
    }

    /// Analyse a single level, without cross-level confirmation.
    pub fn run_level(&self, timeframe: Timeframe) -> Result<LevelResult, LevelError> {
        let span = info_span!("level", instrument = %self.config.instrument, %timeframe);
        let _enter = span.enter();

        let bars = self.source.load(&self.config.instrument, timeframe)?;
        debug!(bars = bars.len(), "bars loaded");
        let result = analyze(&bars, self.config.analysis_for(timeframe))?;
        info!(
            strokes = result.strokes.len(),
            segments = result.segments.len(),
            pivots = result.pivots.len(),
            signals = result.signals.len(),
            "level analysed"
        );
        Ok(result)
    }
}

/// Confirm signals across the successful levels, fingerprint them and build
/// the report (coarsest level first).
pub(crate) fn assemble(
    config: &RunnerConfig,
    mut outcomes: Vec<(Timeframe, Result<LevelResult, LevelError>)>,
) -> MultiLevelReport {
    outcomes.sort_by(|a, b| b.0.cmp(&a.0));

    let confirmed_signals = {
        let mut views: Vec<(Timeframe, &mut Vec<SignalPoint>)> = outcomes
            .iter_mut()
            .filter_map(|(tf, outcome)| outcome.as_mut().ok().map(|r| (*tf, &mut r.signals)))
            .collect();
        apply_confirmations(&mut views, &config.cross_level)
    };

    let levels = outcomes
        .into_iter()
        .map(|(timeframe, outcome)| {
            let outcome = match outcome {
                Ok(result) => LevelOutcome::Ok {
                    fingerprint: fingerprint(&result),
                    result: Box::new(result),
                },
                Err(err) => {
                    warn!(%timeframe, error = %err, "level failed");
                    LevelOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            LevelReport { timeframe, outcome }
        })
        .collect();

    MultiLevelReport {
        schema_version: SCHEMA_VERSION,
        instrument: config.instrument.clone(),
        levels,
        confirmed_signals,
    }
}
