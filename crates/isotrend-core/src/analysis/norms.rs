//! Normative bands for normalized force (N/kg) per test position.

use serde::{Deserialize, Serialize};

use super::axis::AxisRange;
use crate::models::Position;

/// Band a normalized force falls into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NormBand {
    Poor,
    Average,
    Good,
    Excellent,
}

/// Cut points for one position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NormativeThresholds {
    pub poor_max: f64,
    pub average_mid: f64,
    pub good_min: f64,
    pub excellent_min: f64,
}

impl NormativeThresholds {
    pub fn classify(&self, normalized_force: f64) -> NormBand {
        if normalized_force >= self.excellent_min {
            NormBand::Excellent
        } else if normalized_force >= self.good_min {
            NormBand::Good
        } else if normalized_force > self.poor_max {
            NormBand::Average
        } else {
            NormBand::Poor
        }
    }

    /// All cut points, for keeping them inside a chart's range.
    pub fn values(&self) -> [f64; 4] {
        [self.poor_max, self.average_mid, self.good_min, self.excellent_min]
    }

    /// Background zones clipped to `range`; zones with no height are skipped.
    pub fn zones(&self, range: AxisRange) -> Vec<NormZone> {
        [
            (NormBand::Poor, range.min, self.poor_max),
            (NormBand::Average, self.poor_max, self.good_min),
            (NormBand::Good, self.good_min, self.excellent_min),
            (NormBand::Excellent, self.excellent_min, range.max),
        ]
        .into_iter()
        .filter_map(|(band, lower, upper)| {
            let lower = lower.max(range.min);
            let upper = upper.min(range.max);
            (upper > lower).then_some(NormZone { band, lower, upper })
        })
        .collect()
    }
}

/// A horizontal band on a chart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NormZone {
    pub band: NormBand,
    pub lower: f64,
    pub upper: f64,
}

/// Thresholds for every position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NormativeTable {
    #[serde(rename = "I")]
    pub i: NormativeThresholds,
    #[serde(rename = "Y")]
    pub y: NormativeThresholds,
    #[serde(rename = "T")]
    pub t: NormativeThresholds,
}

impl Default for NormativeTable {
    fn default() -> Self {
        Self {
            i: NormativeThresholds {
                poor_max: 1.47,
                average_mid: 1.65,
                good_min: 1.85,
                excellent_min: 2.1,
            },
            y: NormativeThresholds {
                poor_max: 1.25,
                average_mid: 1.4,
                good_min: 1.6,
                excellent_min: 1.76,
            },
            t: NormativeThresholds {
                poor_max: 1.15,
                average_mid: 1.25,
                good_min: 1.4,
                excellent_min: 1.58,
            },
        }
    }
}

impl NormativeTable {
    pub fn for_position(&self, position: Position) -> &NormativeThresholds {
        match position {
            Position::I => &self.i,
            Position::Y => &self.y,
            Position::T => &self.t,
        }
    }
}
