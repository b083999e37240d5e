//! Runner configuration: instrument, levels, per-level analysis overrides and
//! cross-level confirmation settings.
//!
//! ```toml
//! instrument = "BTCUSD"
//! levels = ["1d", "1h", "5m"]
//!
//! [analysis.stroke]
//! min_bars = 5
//!
//! [level_analysis."5m".fractal]
//! confirm_bars = 3
//!
//! [cross_level]
//! window_bars = 2
//!
//! [[cross_level.overrides]]
//! levels = ["1h", "5m"]
//! window_minutes = 90
//! ```

use chanlab_core::data::Timeframe;
use chanlab_core::{AnalysisConfig, ConfigError};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse runner TOML: {0}")]
    Parse(String),

    #[error("at least one level is required")]
    NoLevels,

    #[error("level {0} is listed more than once")]
    DuplicateLevel(Timeframe),

    #[error("analysis override for '{0}' does not name a configured level")]
    UnknownOverride(String),

    #[error("analysis config for {level}: {source}")]
    Analysis {
        level: String,
        #[source]
        source: ConfigError,
    },

    #[error("cross_level.{field} must be {requirement} (got {value})")]
    CrossLevel {
        field: &'static str,
        requirement: &'static str,
        value: String,
    },
}

/// Everything needed to analyse one instrument across several levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub instrument: String,
    pub levels: Vec<Timeframe>,

    /// Shared analysis settings, used by every level without an override.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Full replacement config per level, keyed by timeframe label.
    #[serde(default)]
    pub level_analysis: BTreeMap<String, AnalysisConfig>,

    #[serde(default)]
    pub cross_level: CrossLevelConfig,
}

impl RunnerConfig {
    pub fn new(instrument: impl Into<String>, levels: Vec<Timeframe>) -> Self {
        Self {
            instrument: instrument.into(),
            levels,
            analysis: AnalysisConfig::default(),
            level_analysis: BTreeMap::new(),
            cross_level: CrossLevelConfig::default(),
        }
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RunnerConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| RunnerConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, RunnerConfigError> {
        let cfg: Self =
            toml::from_str(content).map_err(|e| RunnerConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Analysis config in effect for `level`.
    pub fn analysis_for(&self, level: Timeframe) -> &AnalysisConfig {
        self.level_analysis
            .get(level.label())
            .unwrap_or(&self.analysis)
    }

    /// Levels ordered coarsest first, as reports list them.
    pub fn levels_coarse_to_fine(&self) -> Vec<Timeframe> {
        let mut levels = self.levels.clone();
        levels.sort_unstable_by(|a, b| b.cmp(a));
        levels
    }

    pub fn validate(&self) -> Result<(), RunnerConfigError> {
        if self.levels.is_empty() {
            return Err(RunnerConfigError::NoLevels);
        }
        for (i, level) in self.levels.iter().enumerate() {
            if self.levels[..i].contains(level) {
                return Err(RunnerConfigError::DuplicateLevel(*level));
            }
        }
        for key in self.level_analysis.keys() {
            match key.parse::<Timeframe>() {
                Ok(tf) if self.levels.contains(&tf) => {}
                _ => return Err(RunnerConfigError::UnknownOverride(key.clone())),
            }
        }

        self.analysis
            .validate()
            .map_err(|source| RunnerConfigError::Analysis {
                level: "all levels".to_string(),
                source,
            })?;
        for (key, cfg) in &self.level_analysis {
            cfg.validate().map_err(|source| RunnerConfigError::Analysis {
                level: key.clone(),
                source,
            })?;
        }
        self.cross_level.validate()
    }
}

// ── Cross-level confirmation ──

/// Explicit matching window for one pair of levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowOverride {
    /// The two levels, in either order.
    pub levels: [Timeframe; 2],
    pub window_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossLevelConfig {
    /// Default window, in bars of the coarser level of a pair.
    pub window_bars: u32,
    pub overrides: Vec<WindowOverride>,
    /// Bonus for one confirming level before weighting.
    pub base_bonus: f64,
    /// Weight when the confirming level is coarser than the signal's level.
    pub coarse_to_fine_weight: f64,
    /// Weight when the confirming level is finer than the signal's level.
    pub fine_to_coarse_weight: f64,
    /// Cap on the summed bonus of one signal.
    pub max_bonus: f64,
}

impl Default for CrossLevelConfig {
    fn default() -> Self {
        Self {
            window_bars: 3,
            overrides: Vec::new(),
            base_bonus: 0.1,
            coarse_to_fine_weight: 1.0,
            fine_to_coarse_weight: 0.5,
            max_bonus: 0.25,
        }
    }
}

impl CrossLevelConfig {
    /// Matching window between two levels. Symmetric in its arguments.
    pub fn window(&self, a: Timeframe, b: Timeframe) -> Duration {
        let explicit = self.overrides.iter().find(|o| {
            (o.levels[0] == a && o.levels[1] == b) || (o.levels[0] == b && o.levels[1] == a)
        });
        let window = match explicit {
            Some(o) => Duration::try_minutes(o.window_minutes),
            None => self.default_window(a.max(b)),
        };
        // Out-of-range windows only reach here without validate().
        window.unwrap_or(Duration::MAX)
    }

    /// `window_bars` bars of `coarser`, if that fits a duration.
    fn default_window(&self, coarser: Timeframe) -> Option<Duration> {
        let bars = i32::try_from(self.window_bars).ok()?;
        coarser.duration().checked_mul(bars)
    }

    /// Weight of a confirmation found on `other` for a signal on `own`.
    pub fn weight(&self, own: Timeframe, other: Timeframe) -> f64 {
        if other > own {
            self.coarse_to_fine_weight
        } else {
            self.fine_to_coarse_weight
        }
    }

    pub fn validate(&self) -> Result<(), RunnerConfigError> {
        fn check(
            field: &'static str,
            requirement: &'static str,
            value: f64,
            ok: bool,
        ) -> Result<(), RunnerConfigError> {
            if ok {
                Ok(())
            } else {
                Err(RunnerConfigError::CrossLevel {
                    field,
                    requirement,
                    value: value.to_string(),
                })
            }
        }

        check(
            "window_bars",
            ">= 1",
            f64::from(self.window_bars),
            self.window_bars >= 1,
        )?;
        if self.default_window(Timeframe::Week1).is_none() {
            return Err(RunnerConfigError::CrossLevel {
                field: "window_bars",
                requirement: "small enough for a weekly window",
                value: self.window_bars.to_string(),
            });
        }
        for o in &self.overrides {
            if o.window_minutes < 0 || Duration::try_minutes(o.window_minutes).is_none() {
                return Err(RunnerConfigError::CrossLevel {
                    field: "overrides.window_minutes",
                    requirement: ">= 0 and within the duration range",
                    value: o.window_minutes.to_string(),
                });
            }
        }
        check(
            "base_bonus",
            "finite and >= 0",
            self.base_bonus,
            self.base_bonus.is_finite() && self.base_bonus >= 0.0,
        )?;
        check(
            "coarse_to_fine_weight",
            "finite and >= 0",
            self.coarse_to_fine_weight,
            self.coarse_to_fine_weight.is_finite() && self.coarse_to_fine_weight >= 0.0,
        )?;
        check(
            "fine_to_coarse_weight",
            "finite and >= 0",
            self.fine_to_coarse_weight,
            self.fine_to_coarse_weight.is_finite() && self.fine_to_coarse_weight >= 0.0,
        )?;
        check(
            "max_bonus",
            "in [0, 1]",
            self.max_bonus,
            (0.0..=1.0).contains(&self.max_bonus),
        )
    }
}
