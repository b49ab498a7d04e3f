//! Per-visit aggregate models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::record::{Metric, Position, Side};

/// Left/right measurement pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SidePair {
    pub left: Option<f64>,
    pub right: Option<f64>,
}

impl SidePair {
    pub fn new(left: Option<f64>, right: Option<f64>) -> Self {
        Self { left, right }
    }

    pub fn get(&self, side: Side) -> Option<f64> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// Overwrite each side only when the incoming value is present.
    pub fn coalesce(&mut self, left: Option<f64>, right: Option<f64>) {
        self.left = left.or(self.left);
        self.right = right.or(self.right);
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Fixed-shape {Position × Metric} grid of side pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MeasurementGrid {
    cells: [[SidePair; 3]; 3],
}

impl MeasurementGrid {
    pub fn get(&self, position: Position, metric: Metric) -> SidePair {
        self.cells[position.index()][metric.index()]
    }

    pub fn value(&self, position: Position, metric: Metric, side: Side) -> Option<f64> {
        self.get(position, metric).get(side)
    }

    pub(crate) fn cell_mut(&mut self, position: Position, metric: Metric) -> &mut SidePair {
        &mut self.cells[position.index()][metric.index()]
    }
}

/// One visible visit (calendar date) for a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitAggregate {
    pub test_date: NaiveDate,
    /// Whole weeks since the earliest visible visit
    pub weeks_since_first: i64,
    /// Last non-null bodyweight seen for the date, kg
    pub bodyweight_kg: Option<f64>,
    pub grid: MeasurementGrid,
}

impl VisitAggregate {
    pub(crate) fn new(test_date: NaiveDate) -> Self {
        Self {
            test_date,
            weeks_since_first: 0,
            bodyweight_kg: None,
            grid: MeasurementGrid::default(),
        }
    }

    pub fn measurement(&self, position: Position, metric: Metric) -> SidePair {
        self.grid.get(position, metric)
    }
}

/// Chart presentation mode chosen by the clinician.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Scatter,
    Bar,
}

impl ViewMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "scatter" => Some(ViewMode::Scatter),
            "bar" => Some(ViewMode::Bar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Scatter => "scatter",
            ViewMode::Bar => "bar",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_keeps_present_values() {
        let mut pair = SidePair::new(Some(100.0), None);
        pair.coalesce(None, Some(90.0));
        assert_eq!(pair, SidePair::new(Some(100.0), Some(90.0)));

        pair.coalesce(Some(0.0), None);
        assert_eq!(pair.left, Some(0.0));
        assert_eq!(pair.right, Some(90.0));
    }

    #[test]
    fn test_grid_cells_are_independent() {
        let mut grid = MeasurementGrid::default();
        grid.cell_mut(Position::Y, Metric::Rfd).left = Some(500.0);

        assert_eq!(grid.value(Position::Y, Metric::Rfd, Side::Left), Some(500.0));
        assert!(grid.get(Position::I, Metric::Rfd).is_empty());
        assert!(grid.get(Position::Y, Metric::MaxForce).is_empty());
    }

    #[test]
    fn test_view_mode_serde() {
        assert_eq!(serde_json::to_string(&ViewMode::Bar).unwrap(), "\"bar\"");
        assert_eq!(ViewMode::parse("Scatter"), Some(ViewMode::Scatter));
        assert_eq!(ViewMode::default(), ViewMode::Scatter);
    }
}
