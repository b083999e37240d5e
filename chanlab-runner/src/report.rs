//! Multi-level report and JSON export.
//!
//! Every persisted report carries a `schema_version`; newer versions are
//! rejected on load.

use chanlab_core::data::Timeframe;
use chanlab_core::LevelResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported schema version {found} (max supported: {max})", max = SCHEMA_VERSION)]
    SchemaVersion { found: u32 },
}

/// Outcome of one level: the analysis with its fingerprint, or the error
/// that stopped it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LevelOutcome {
    Ok {
        fingerprint: String,
        result: Box<LevelResult>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    pub timeframe: Timeframe,
    pub outcome: LevelOutcome,
}

impl LevelReport {
    pub fn result(&self) -> Option<&LevelResult> {
        match &self.outcome {
            LevelOutcome::Ok { result, .. } => Some(result.as_ref()),
            LevelOutcome::Failed { .. } => None,
        }
    }

    pub fn fingerprint(&self) -> Option<&str> {
        match &self.outcome {
            LevelOutcome::Ok { fingerprint, .. } => Some(fingerprint.as_str()),
            LevelOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            LevelOutcome::Ok { .. } => None,
            LevelOutcome::Failed { error } => Some(error.as_str()),
        }
    }
}

/// All levels of one instrument, coarsest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLevelReport {
    pub schema_version: u32,
    pub instrument: String,
    pub levels: Vec<LevelReport>,
    /// Signals, across all levels, with at least one cross-level confirmation.
    pub confirmed_signals: usize,
}

impl MultiLevelReport {
    pub fn level(&self, timeframe: Timeframe) -> Option<&LevelReport> {
        self.levels.iter().find(|l| l.timeframe == timeframe)
    }

    pub fn result(&self, timeframe: Timeframe) -> Option<&LevelResult> {
        self.level(timeframe).and_then(LevelReport::result)
    }

    pub fn failures(&self) -> impl Iterator<Item = &LevelReport> {
        self.levels.iter().filter(|l| l.error().is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let report: Self = serde_json::from_str(json)?;
        if report.schema_version > SCHEMA_VERSION {
            return Err(ReportError::SchemaVersion {
                found: report.schema_version,
            });
        }
        Ok(report)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
