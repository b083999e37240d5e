//! Typed arena indices.
//!
//! Every structure refers to others by position in the per-level arenas,
//! never by shared reference.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Index into the turning-point arena.
    PointId,
    "P"
);
arena_id!(
    /// Index into the stroke arena.
    StrokeId,
    "S"
);
arena_id!(
    /// Index into the segment arena.
    SegmentId,
    "G"
);
arena_id!(
    /// Index into the pivot arena.
    PivotId,
    "Z"
);
arena_id!(
    /// Index into the divergence list of a level result.
    DivergenceId,
    "D"
);
