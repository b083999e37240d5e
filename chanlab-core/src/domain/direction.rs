use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a stroke, segment or local trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Direction of a move from `from` to `to`; flat counts as up.
    pub fn of_move(from: f64, to: f64) -> Self {
        if to >= from {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// Kind of a turning point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Top,
    Bottom,
}

impl PointKind {
    pub fn opposite(self) -> Self {
        match self {
            PointKind::Top => PointKind::Bottom,
            PointKind::Bottom => PointKind::Top,
        }
    }

    /// Direction of a stroke that starts at a point of this kind.
    pub fn outgoing(self) -> Direction {
        match self {
            PointKind::Bottom => Direction::Up,
            PointKind::Top => Direction::Down,
        }
    }
}
