//! Input side: validation, timeframes and synthetic series.

pub mod synthetic;
pub mod timeframe;
pub mod validate;

pub use timeframe::{Timeframe, UnknownTimeframe};
pub use validate::{check_bar, screen_bar, Screened};
