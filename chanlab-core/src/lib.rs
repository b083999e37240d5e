//! chanlab core: structural decomposition of OHLCV bars.
//!
//! One level (timeframe) is processed as a chain of stages, each working on
//! the flat arena produced by the previous one:
//! - containment merging of raw bars
//! - turning points (fractals) on the merged run
//! - strokes between alternating turning points
//! - segments built from strokes, terminated by feature-sequence fractals,
//!   a stroke cap or momentum decay
//! - pivots (consolidation bands) over consecutive segments
//! - MACD divergence and Type-1/2/3 signal points
//!
//! [`pipeline::LevelPipeline`] runs the chain incrementally; [`pipeline::analyze`]
//! is the batch entry point.

pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod indicators;
pub mod pipeline;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, ConfigError, Diagnostic, InputDataError, Stage};
pub use pipeline::{analyze, LevelPipeline, LevelResult, Summary};
