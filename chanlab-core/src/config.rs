//! Analysis configuration for one timeframe.
//!
//! Every group has documented defaults and can be partially overridden from
//! TOML; missing keys fall back to `Default`. [`AnalysisConfig::validate`] is
//! called by the pipeline constructor, so an invalid threshold is rejected
//! before any bar is processed.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Complete configuration surface for the per-level pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub merge: MergeConfig,
    pub fractal: FractalConfig,
    pub stroke: StrokeConfig,
    pub segment: SegmentConfig,
    pub pivot: PivotConfig,
    pub macd: MacdConfig,
    pub divergence: DivergenceConfig,
    pub signal: SignalConfig,
    pub validation: ValidationConfig,
}

impl AnalysisConfig {
    /// Parse a (possibly partial) TOML document and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the configuration (BLAKE3 over canonical JSON).
    pub fn config_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.merge.validate()?;
        self.fractal.validate()?;
        self.stroke.validate()?;
        self.segment.validate()?;
        self.pivot.validate()?;
        self.macd.validate()?;
        self.divergence.validate()?;
        self.signal.validate()?;
        Ok(())
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(field, "finite and > 0", value))
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(field, "finite and >= 0", value))
    }
}

fn require_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(field, "in (0, 1]", value))
    }
}

fn require_at_least(field: &'static str, value: usize, min: usize) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        let requirement = match min {
            1 => ">= 1",
            2 => ">= 2",
            3 => ">= 3",
            _ => ">= the documented minimum",
        };
        Err(ConfigError::out_of_range(field, requirement, value))
    }
}

// ── Containment merge ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Backward re-check iterations allowed per pushed bar.
    pub max_iterations: usize,
    /// Full verification passes over the run in batch merging.
    pub max_passes: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            max_passes: 8,
        }
    }
}

impl MergeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_at_least("merge.max_iterations", self.max_iterations, 1)?;
        require_at_least("merge.max_passes", self.max_passes, 1)
    }
}

// ── Turning points ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Neighbours must be strictly below (top) / above (bottom) the centre.
    Strict,
    /// Neighbours may equal the centre.
    NonStrict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FractalConfig {
    pub window_radius: usize,
    pub strictness: Strictness,
    /// Forward bars scanned by the confirmation counter.
    pub confirm_bars: usize,
}

impl Default for FractalConfig {
    fn default() -> Self {
        Self {
            window_radius: 1,
            strictness: Strictness::Strict,
            confirm_bars: 5,
        }
    }
}

impl FractalConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_at_least("fractal.window_radius", self.window_radius, 1)
    }
}

// ── Strokes ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeConfig {
    /// Minimum merged-bar span (end index - start index).
    pub min_bars: usize,
    /// Minimum relative amplitude, as a fraction of the start price.
    pub min_amplitude: f64,
    /// Merged bars before the stroke used as the volume reference.
    pub volume_lookback: usize,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            min_bars: 4,
            min_amplitude: 0.03,
            volume_lookback: 20,
        }
    }
}

impl StrokeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_at_least("stroke.min_bars", self.min_bars, 1)?;
        require_positive("stroke.min_amplitude", self.min_amplitude)?;
        require_at_least("stroke.volume_lookback", self.volume_lookback, 1)
    }
}

// ── Segments ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Stroke-count cap that forces termination. Must be odd.
    pub max_strokes: usize,
    /// Same-direction strokes inspected by the momentum-decay gate.
    pub momentum_window: usize,
    pub min_integrity: f64,
    /// Minimum relative amplitude for a valid segment. The default 0.0
    /// leaves validity to integrity alone.
    pub min_amplitude: f64,
    /// Cap on total termination-loop steps for one build.
    pub max_iterations: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_strokes: 9,
            momentum_window: 3,
            min_integrity: 0.5,
            min_amplitude: 0.0,
            max_iterations: 100_000,
        }
    }
}

impl SegmentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_strokes < 3 || self.max_strokes % 2 == 0 {
            return Err(ConfigError::out_of_range(
                "segment.max_strokes",
                "odd and >= 3",
                self.max_strokes,
            ));
        }
        require_at_least("segment.momentum_window", self.momentum_window, 2)?;
        if !(0.0..=1.0).contains(&self.min_integrity) {
            return Err(ConfigError::out_of_range(
                "segment.min_integrity",
                "in [0, 1]",
                self.min_integrity,
            ));
        }
        require_non_negative("segment.min_amplitude", self.min_amplitude)?;
        require_at_least("segment.max_iterations", self.max_iterations, 1)
    }
}

// ── Pivots ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotConfig {
    /// Overlap / band-width ratio a later segment needs to extend the band.
    pub overlap_ratio: f64,
    pub extension_cap: usize,
    /// Fraction beyond the band a segment end must reach to break the pivot.
    pub break_threshold: f64,
    pub merge_overlapping: bool,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            overlap_ratio: 0.5,
            extension_cap: 9,
            break_threshold: 0.02,
            merge_overlapping: true,
        }
    }
}

impl PivotConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_unit("pivot.overlap_ratio", self.overlap_ratio)?;
        require_at_least("pivot.extension_cap", self.extension_cap, 1)?;
        require_non_negative("pivot.break_threshold", self.break_threshold)
    }
}

// ── MACD ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdConfig {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

impl MacdConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_at_least("macd.fast", self.fast, 1)?;
        require_at_least("macd.signal", self.signal, 1)?;
        if self.fast >= self.slow {
            return Err(ConfigError::MacdPeriods {
                fast: self.fast,
                slow: self.slow,
            });
        }
        Ok(())
    }
}

// ── Divergence ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceMode {
    /// Segments entering and leaving a pivot.
    Segment,
    /// Consecutive same-sign histogram regions.
    Streaming,
    Both,
}

impl DivergenceMode {
    pub fn segment_enabled(self) -> bool {
        matches!(self, DivergenceMode::Segment | DivergenceMode::Both)
    }

    pub fn streaming_enabled(self) -> bool {
        matches!(self, DivergenceMode::Streaming | DivergenceMode::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceConfig {
    pub mode: DivergenceMode,
    /// Later/earlier signed-area threshold for bottoms. Signed areas are
    /// negative, so the later magnitude must stay below `ratio * earlier`.
    pub bottom_area_ratio: f64,
    /// Later/earlier area must fall below this for tops.
    pub top_area_ratio: f64,
    /// Bars after the later extreme in which the confirming cross must occur.
    pub confirm_window: usize,
    pub max_reliability: f64,
    /// Price difference (fraction) that earns a full price score.
    pub price_scale: f64,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            mode: DivergenceMode::Both,
            bottom_area_ratio: 1.15,
            top_area_ratio: 0.85,
            confirm_window: 5,
            max_reliability: 0.95,
            price_scale: 0.05,
        }
    }
}

impl DivergenceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("divergence.bottom_area_ratio", self.bottom_area_ratio)?;
        require_positive("divergence.top_area_ratio", self.top_area_ratio)?;
        require_unit("divergence.max_reliability", self.max_reliability)?;
        require_positive("divergence.price_scale", self.price_scale)
    }
}

// ── Signals ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Raw bars from the earlier region's start to the later extreme that a
    /// streaming Type-1 needs as its prior trend run.
    pub min_trend_bars: usize,
    /// Fraction a Type-2 pullback may undercut (buy) / overshoot (sell) the
    /// Type-1 price and still count as a failure to re-breach.
    pub type2_tolerance: f64,
    /// Fraction a Type-3 test must stay clear of the pivot boundary.
    pub type3_tolerance: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_trend_bars: 5,
            type2_tolerance: 0.0,
            type3_tolerance: 0.0,
        }
    }
}

impl SignalConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_non_negative("signal.type2_tolerance", self.type2_tolerance)?;
        require_non_negative("signal.type3_tolerance", self.type3_tolerance)
    }
}

// ── Input validation ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// First malformed bar aborts with [`crate::error::InputDataError`].
    #[default]
    Strict,
    /// Malformed bars are dropped and reported as diagnostics.
    Repair,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub policy: ValidationPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn documented_defaults() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.fractal.window_radius, 1);
        assert_eq!(cfg.segment.max_strokes, 9);
        assert_eq!(cfg.pivot.extension_cap, 9);
        assert_eq!(cfg.macd, MacdConfig { fast: 12, slow: 26, signal: 9 });
        assert_eq!(cfg.divergence.confirm_window, 5);
        assert_eq!(cfg.validation.policy, ValidationPolicy::Strict);
    }

    #[test]
    fn zero_overlap_ratio_rejected() {
        let mut cfg = AnalysisConfig::default();
        cfg.pivot.overlap_ratio = 0.0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("pivot.overlap_ratio"));
    }

    #[test]
    fn even_stroke_cap_rejected() {
        let mut cfg = AnalysisConfig::default();
        cfg.segment.max_strokes = 8;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_macd_rejected() {
        let mut cfg = AnalysisConfig::default();
        cfg.macd.fast = 30;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MacdPeriods { fast: 30, slow: 26 })
        );
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg = AnalysisConfig::from_toml_str(
            r#"
            [fractal]
            window_radius = 2
            strictness = "non_strict"

            [divergence]
            mode = "streaming"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.fractal.window_radius, 2);
        assert_eq!(cfg.fractal.strictness, Strictness::NonStrict);
        assert_eq!(cfg.fractal.confirm_bars, 5);
        assert_eq!(cfg.divergence.mode, DivergenceMode::Streaming);
        assert_eq!(cfg.pivot, PivotConfig::default());
    }

    #[test]
    fn invalid_toml_value_is_config_error() {
        let err = AnalysisConfig::from_toml_str("[pivot]\noverlap_ratio = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn config_hash_is_stable_and_sensitive() {
        let a = AnalysisConfig::default();
        let mut b = AnalysisConfig::default();
        assert_eq!(a.config_hash(), b.config_hash());
        b.stroke.min_bars = 5;
        assert_ne!(a.config_hash(), b.config_hash());
    }
}
