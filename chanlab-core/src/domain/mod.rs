//! Domain types: bars, turning points, strokes, segments, pivots,
//! divergences and signal points.

pub mod bar;
pub mod direction;
pub mod divergence;
pub mod ids;
pub mod pivot;
pub mod segment;
pub mod signal;
pub mod stroke;
pub mod swing;
pub mod turning_point;

pub use bar::{Bar, MergedBar};
pub use direction::{Direction, PointKind};
pub use divergence::{DivergenceEvent, DivergenceKind, DivergenceSource, HistogramRegion, RegionSpan};
pub use ids::{DivergenceId, PivotId, PointId, SegmentId, StrokeId};
pub use pivot::{BandPosition, CloseReason, PivotStatus, PivotZone};
pub use segment::{FeatureBar, Segment, SegmentStatus, TerminationCause};
pub use signal::{CrossConfirmation, Side, SignalKind, SignalPoint};
pub use stroke::Stroke;
pub use swing::Swing;
pub use turning_point::TurningPoint;
