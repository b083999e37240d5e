//! Per-row input validation.
//!
//! Each bar is checked on its own (finite values, positive prices, OHLC
//! ordering) and against the last accepted bar (strictly increasing
//! timestamps). Under [`ValidationPolicy::Strict`] the first failure is
//! returned; under [`ValidationPolicy::Repair`] the row is dropped and a
//! [`Diagnostic::RowDropped`] is recorded instead.

use crate::config::ValidationPolicy;
use crate::domain::Bar;
use crate::error::{Diagnostic, InputDataError};
use chrono::NaiveDateTime;
use tracing::warn;

/// Validate one bar at `index`, given the timestamp of the last accepted bar.
pub fn check_bar(
    index: usize,
    bar: &Bar,
    previous: Option<NaiveDateTime>,
) -> Result<(), InputDataError> {
    let fields = [
        ("open", bar.open),
        ("high", bar.high),
        ("low", bar.low),
        ("close", bar.close),
        ("volume", bar.volume),
        ("amount", bar.amount),
    ];
    for (field, value) in fields {
        if !value.is_finite() {
            return Err(InputDataError::NonFiniteValue { index, field });
        }
    }
    for &(field, value) in &fields[..4] {
        if value <= 0.0 {
            return Err(InputDataError::NonPositivePrice {
                index,
                field,
                value,
            });
        }
    }
    if !bar.is_sane() {
        return Err(InputDataError::OhlcViolation {
            index,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        });
    }
    if let Some(prev) = previous {
        if bar.timestamp <= prev {
            return Err(InputDataError::NonMonotonicTimestamp {
                index,
                timestamp: bar.timestamp.to_string(),
                previous: prev.to_string(),
            });
        }
    }
    Ok(())
}

/// What happened to one screened row.
#[derive(Debug, Clone, PartialEq)]
pub enum Screened {
    Accepted,
    /// Malformed and dropped under [`ValidationPolicy::Repair`].
    Dropped(Diagnostic),
}

/// Check one row and apply `policy` to a failure.
pub fn screen_bar(
    index: usize,
    bar: &Bar,
    previous: Option<NaiveDateTime>,
    policy: ValidationPolicy,
) -> Result<Screened, InputDataError> {
    let Err(err) = check_bar(index, bar, previous) else {
        return Ok(Screened::Accepted);
    };
    match policy {
        ValidationPolicy::Strict => Err(err),
        ValidationPolicy::Repair => {
            warn!(index, error = %err, "dropping malformed bar");
            Ok(Screened::Dropped(Diagnostic::RowDropped {
                index,
                reason: err.to_string(),
            }))
        }
    }
}
