//! Bar sources: where the coordinator gets each level's bars from.
//!
//! The coordinator only sees the [`BarSource`] trait. Three implementations
//! ship with the runner:
//! - [`InMemorySource`]: pre-loaded series, mostly for tests and embedding
//! - [`CsvSource`]: one CSV file per instrument and timeframe on disk
//! - [`ResamplingSource`]: derives coarser levels from one base feed

use chanlab_core::data::Timeframe;
use chanlab_core::domain::Bar;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no bars for {instrument} at {timeframe}")]
    NotFound {
        instrument: String,
        timeframe: Timeframe,
    },

    #[error("{timeframe} is finer than the base feed ({base})")]
    FinerThanBase { timeframe: Timeframe, base: Timeframe },

    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: unparseable timestamp '{value}'")]
    Timestamp {
        path: String,
        row: usize,
        value: String,
    },
}

/// Supplies ordered bars for an instrument at one timeframe.
///
/// Implementations must be `Send + Sync`: the coordinator loads every level
/// from its own worker.
pub trait BarSource: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    fn load(&self, instrument: &str, timeframe: Timeframe) -> Result<Vec<Bar>, SourceError>;
}

// ── In-memory ──

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    series: HashMap<(String, Timeframe), Vec<Bar>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: &str, timeframe: Timeframe, bars: Vec<Bar>) {
        self.series.insert((instrument.to_string(), timeframe), bars);
    }

    pub fn with(mut self, instrument: &str, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        self.insert(instrument, timeframe, bars);
        self
    }
}

impl BarSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self, instrument: &str, timeframe: Timeframe) -> Result<Vec<Bar>, SourceError> {
        self.series
            .get(&(instrument.to_string(), timeframe))
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                instrument: instrument.to_string(),
                timeframe,
            })
    }
}

// ── CSV files ──

/// One row of a bar file. `amount` may be omitted; it then defaults to
/// `close * volume`.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    amount: Option<f64>,
}

/// Reads `<root>/<instrument>/<timeframe label>.csv`, e.g. `data/BTCUSD/1h.csv`.
///
/// Rows are returned in file order; ordering and OHLC checks are left to the
/// pipeline's validation policy.
#[derive(Debug, Clone)]
pub struct CsvSource {
    root: PathBuf,
}

impl CsvSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, instrument: &str, timeframe: Timeframe) -> PathBuf {
        self.root
            .join(instrument)
            .join(format!("{}.csv", timeframe.label()))
    }
}

impl BarSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn load(&self, instrument: &str, timeframe: Timeframe) -> Result<Vec<Bar>, SourceError> {
        let path = self.path_for(instrument, timeframe);
        if !path.exists() {
            return Err(SourceError::NotFound {
                instrument: instrument.to_string(),
                timeframe,
            });
        }
        read_bars_csv(&path)
    }
}

/// Parse a bar file with a `timestamp,open,high,low,close,volume[,amount]` header.
pub fn read_bars_csv(path: &Path) -> Result<Vec<Bar>, SourceError> {
    let display = path.display().to_string();
    let mut reader = csv::Reader::from_path(path).map_err(|source| SourceError::Csv {
        path: display.clone(),
        source,
    })?;

    let mut bars = Vec::new();
    for (row, record) in reader.deserialize::<CsvRow>().enumerate() {
        let record = record.map_err(|source| SourceError::Csv {
            path: display.clone(),
            source,
        })?;
        let timestamp =
            parse_timestamp(&record.timestamp).ok_or_else(|| SourceError::Timestamp {
                path: display.clone(),
                row,
                value: record.timestamp.clone(),
            })?;
        bars.push(Bar {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
            amount: record.amount.unwrap_or(record.close * record.volume),
        });
    }
    Ok(bars)
}

/// Write bars in the format [`read_bars_csv`] reads, creating parent
/// directories as needed.
pub fn write_bars_csv(path: &Path, bars: &[Bar]) -> Result<(), SourceError> {
    let display = path.display().to_string();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SourceError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|source| SourceError::Csv {
        path: display.clone(),
        source,
    })?;
    for bar in bars {
        writer
            .serialize(CsvRow {
                timestamp: bar.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                amount: Some(bar.amount),
            })
            .map_err(|source| SourceError::Csv {
                path: display.clone(),
                source,
            })?;
    }
    writer.flush().map_err(|source| SourceError::Io {
        path: display,
        source,
    })
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, the ISO `T` form, or a bare date
/// (midnight).
fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ── Resampling ──

/// Serves every level at or above `base` by resampling the base feed.
#[derive(Debug, Clone)]
pub struct ResamplingSource<S> {
    inner: S,
    base: Timeframe,
}

impl<S: BarSource> ResamplingSource<S> {
    pub fn new(inner: S, base: Timeframe) -> Self {
        Self { inner, base }
    }

    pub fn base(&self) -> Timeframe {
        self.base
    }
}

impl<S: BarSource> BarSource for ResamplingSource<S> {
    fn name(&self) -> &str {
        "resampling"
    }

    fn load(&self, instrument: &str, timeframe: Timeframe) -> Result<Vec<Bar>, SourceError> {
        if timeframe < self.base {
            return Err(SourceError::FinerThanBase {
                timeframe,
                base: self.base,
            });
        }
        let bars = self.inner.load(instrument, self.base)?;
        if timeframe == self.base {
            Ok(bars)
        } else {
            Ok(timeframe.resample(&bars))
        }
    }
}
