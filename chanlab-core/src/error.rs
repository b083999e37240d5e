//! Error taxonomy and non-fatal diagnostics.
//!
//! Hard failures are `thiserror` enums that propagate with `?`. Conditions
//! the pipeline can live with (too little data, iteration caps, dropped rows)
//! are collected as [`Diagnostic`] values and returned next to the result.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Malformed input bar. Every variant carries the offending bar index.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputDataError {
    #[error("bar {index}: timestamp {timestamp} is not after the previous bar's {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        timestamp: String,
        previous: String,
    },

    #[error("bar {index}: non-positive price in field '{field}' ({value})")]
    NonPositivePrice {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("bar {index}: OHLC violation (high={high}, low={low}, open={open}, close={close})")]
    OhlcViolation {
        index: usize,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("bar {index}: non-finite value in field '{field}'")]
    NonFiniteValue { index: usize, field: &'static str },
}

impl InputDataError {
    pub fn index(&self) -> usize {
        match self {
            Self::NonMonotonicTimestamp { index, .. }
            | Self::NonPositivePrice { index, .. }
            | Self::OhlcViolation { index, .. }
            | Self::NonFiniteValue { index, .. } => *index,
        }
    }
}

/// Invalid configuration, rejected before any processing starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be {requirement} (got {value})")]
    OutOfRange {
        field: &'static str,
        requirement: &'static str,
        value: String,
    },

    #[error("macd fast period ({fast}) must be shorter than slow period ({slow})")]
    MacdPeriods { fast: usize, slow: usize },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn out_of_range(
        field: &'static str,
        requirement: &'static str,
        value: impl fmt::Display,
    ) -> Self {
        Self::OutOfRange {
            field,
            requirement,
            value: value.to_string(),
        }
    }
}

/// Top-level error for a pipeline run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    Input(#[from] InputDataError),

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
}

/// Pipeline stage, used to attribute diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Merge,
    Fractal,
    Stroke,
    Segment,
    Pivot,
    Divergence,
    Signal,
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validation => "validation",
            Stage::Merge => "merge",
            Stage::Fractal => "fractal",
            Stage::Stroke => "stroke",
            Stage::Segment => "segment",
            Stage::Pivot => "pivot",
            Stage::Divergence => "divergence",
            Stage::Signal => "signal",
            Stage::Pipeline => "pipeline",
        };
        f.write_str(s)
    }
}

/// Non-fatal condition recorded during analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A stage had fewer inputs than it needs and returned an empty result.
    InsufficientData {
        stage: Stage,
        required: usize,
        available: usize,
    },
    /// The containment merge loop hit its iteration cap.
    MergeIterationCap { at_bar: usize, iterations: usize },
    /// The segment termination loop hit its iteration cap.
    SegmentIterationCap { at_stroke: usize, iterations: usize },
    /// A malformed row was dropped under the repair policy.
    RowDropped { index: usize, reason: String },
    /// A tail merge reached into frozen history and the level was rebuilt.
    FullRebuild { merged_index: usize, frozen_boundary: usize },
}

impl Diagnostic {
    pub fn stage(&self) -> Stage {
        match self {
            Diagnostic::InsufficientData { stage, .. } => *stage,
            Diagnostic::MergeIterationCap { .. } => Stage::Merge,
            Diagnostic::SegmentIterationCap { .. } => Stage::Segment,
            Diagnostic::RowDropped { .. } => Stage::Validation,
            Diagnostic::FullRebuild { .. } => Stage::Pipeline,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::InsufficientData {
                stage,
                required,
                available,
            } => write!(
                f,
                "{stage}: insufficient data (need {required}, have {available})"
            ),
            Diagnostic::MergeIterationCap { at_bar, iterations } => write!(
                f,
                "merge: iteration cap reached at bar {at_bar} after {iterations} iterations"
            ),
            Diagnostic::SegmentIterationCap {
                at_stroke,
                iterations,
            } => write!(
                f,
                "segment: iteration cap reached at stroke {at_stroke} after {iterations} steps"
            ),
            Diagnostic::RowDropped { index, reason } => {
                write!(f, "validation: dropped row {index} ({reason})")
            }
            Diagnostic::FullRebuild {
                merged_index,
                frozen_boundary,
            } => write!(
                f,
                "pipeline: merge reached index {merged_index} below frozen boundary {frozen_boundary}, rebuilt"
            ),
        }
    }
}
