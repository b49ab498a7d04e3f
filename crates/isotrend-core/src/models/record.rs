//! Visit record models (one validated CSV row).

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Test stance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Position {
    I,
    Y,
    T,
}

impl Position {
    /// All positions in display order.
    pub const ALL: [Position; 3] = [Position::I, Position::Y, Position::T];

    /// Parse a bare position code (`I`, `Y`, `T`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "I" => Some(Position::I),
            "Y" => Some(Position::Y),
            "T" => Some(Position::T),
            _ => None,
        }
    }

    /// Single-letter code.
    pub fn code(&self) -> &'static str {
        match self {
            Position::I => "I",
            Position::Y => "Y",
            Position::T => "T",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Position::I => 0,
            Position::Y => 1,
            Position::T => 2,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Measured (or derived) quantity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// Peak force in newtons
    MaxForce,
    /// Rate of force development over the first 100ms, N/s
    Rfd,
    /// Max force divided by bodyweight, N/kg (always derived)
    NormalizedForce,
}

impl Metric {
    /// All metrics in summary-table order.
    pub const ALL: [Metric; 3] = [Metric::MaxForce, Metric::Rfd, Metric::NormalizedForce];

    /// Column label used by the force plate export.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::MaxForce => "Max Force (N)",
            Metric::Rfd => "RFD 100ms (N/s)",
            Metric::NormalizedForce => "Max Force / BW",
        }
    }

    /// Parse an export label or short name, case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_lowercase();
        match lower.as_str() {
            "max force (n)" | "maxforce" | "max force" => Some(Metric::MaxForce),
            "rfd 100ms (n/s)" | "rfd" => Some(Metric::Rfd),
            "max force / bw" | "normalizedforce" | "normalized force" => {
                Some(Metric::NormalizedForce)
            }
            _ => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Metric::MaxForce => 0,
            Metric::Rfd => 1,
            Metric::NormalizedForce => 2,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Limb side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    /// The contralateral side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Parse `Left`/`Right` (or `L`/`R`), case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "left" | "l" => Some(Side::Left),
            "right" | "r" => Some(Side::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional demographic columns carried on each row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Demographics {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub sport: Option<String>,
    pub injured_side: Option<Side>,
}

/// One CSV row after validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitRecord {
    pub metric: Metric,
    /// Cleaned position code
    pub position: Position,
    pub left_value: Option<f64>,
    pub right_value: Option<f64>,
    /// Bodyweight in kg
    pub bodyweight_kg: Option<f64>,
    /// Visit date, taken from the filename
    pub test_date: NaiveDate,
    /// Name of the uploaded file this row came from
    pub source_file: String,
    pub demographics: Demographics,
}

impl VisitRecord {
    /// Value for one side.
    pub fn value(&self, side: Side) -> Option<f64> {
        match side {
            Side::Left => self.left_value,
            Side::Right => self.right_value,
        }
    }

    /// ISO date string used as the visibility key.
    pub fn date_key(&self) -> String {
        date_key(self.test_date)
    }
}

/// Format a calendar date as `YYYY-MM-DD`.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
