//! chanlab runner: multi-level orchestration on top of `chanlab-core`.
//!
//! This crate provides:
//! - Runner configuration loaded from TOML, with per-level overrides
//! - Bar sources (in-memory, CSV directory, resampling from one base feed)
//! - The coordinator, which analyses every level in parallel
//! - Cross-level confirmation of signal points
//! - A streaming session for multi-level updates bar by bar
//! - The serializable multi-level report

pub mod config;
pub mod confirmation;
pub mod coordinator;
pub mod report;
pub mod session;
pub mod source;

pub use config::{CrossLevelConfig, RunnerConfig, RunnerConfigError, WindowOverride};
pub use confirmation::apply_confirmations;
pub use coordinator::{Coordinator, LevelError};
pub use report::{LevelOutcome, LevelReport, MultiLevelReport, ReportError, SCHEMA_VERSION};
pub use session::MultiLevelSession;
pub use source::{BarSource, CsvSource, InMemorySource, ResamplingSource, SourceError};
