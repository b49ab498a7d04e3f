//! Read-only views for the renderer: summary table and chart series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::axis::{axis_range, AxisRange, AxisRequest};
use super::change::{compare_visits, AsymmetryStatus, CellComparison};
use super::norms::NormZone;
use crate::config::PipelineConfig;
use crate::models::{Metric, Position, Side, ViewMode, VisitAggregate};

/// Column header for one visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitHeader {
    pub test_date: NaiveDate,
    pub weeks_since_first: i64,
}

/// One visit's figures for a position/metric row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SummaryCell {
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub change_left: Option<f64>,
    pub change_right: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRow {
    pub metric: Metric,
    pub cells: Vec<SummaryCell>,
}

/// Summary table block for one position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSummary {
    pub position: Position,
    pub visits: Vec<VisitHeader>,
    pub rows: Vec<MetricRow>,
}

/// Build the detailed summary: every position, every metric, every visit,
/// with change against the previous visible visit.
pub fn summary_table(visits: &[VisitAggregate]) -> Vec<PositionSummary> {
    let headers: Vec<VisitHeader> = visits
        .iter()
        .map(|v| VisitHeader {
            test_date: v.test_date,
            weeks_since_first: v.weeks_since_first,
        })
        .collect();

    Position::ALL
        .iter()
        .map(|&position| PositionSummary {
            position,
            visits: headers.clone(),
            rows: Metric::ALL
                .iter()
                .map(|&metric| {
                    // injured side only affects asymmetry, which the table omits
                    let comparisons = compare_visits(visits, position, metric, Side::Left);
                    let cells = visits
                        .iter()
                        .zip(comparisons)
                        .map(|(visit, cmp)| {
                            let pair = visit.measurement(position, metric);
                            SummaryCell {
                                left: pair.left,
                                right: pair.right,
                                change_left: cmp.change_left,
                                change_right: cmp.change_right,
                            }
                        })
                        .collect();
                    MetricRow { metric, cells }
                })
                .collect(),
        })
        .collect()
}

/// Series for one chart (position × metric) in the current view mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendSeries {
    pub position: Position,
    pub metric: Metric,
    pub mode: ViewMode,
    /// "First Test", "Week 2", ...
    pub tick_labels: Vec<String>,
    pub left: Vec<Option<f64>>,
    pub right: Vec<Option<f64>>,
    pub comparisons: Vec<CellComparison>,
    pub asymmetry_status: Vec<AsymmetryStatus>,
    pub axis: AxisRange,
    /// Normative background, scatter charts of normalized force only
    pub zones: Vec<NormZone>,
}

/// Prepare one chart's series and its axis range.
pub fn trend_series(
    visits: &[VisitAggregate],
    position: Position,
    metric: Metric,
    mode: ViewMode,
    injured_side: Side,
    config: &PipelineConfig,
) -> TrendSeries {
    let pairs: Vec<_> = visits.iter().map(|v| v.measurement(position, metric)).collect();
    let left: Vec<Option<f64>> = pairs.iter().map(|p| p.left).collect();
    let right: Vec<Option<f64>> = pairs.iter().map(|p| p.right).collect();
    let values: Vec<f64> = left.iter().chain(right.iter()).flatten().copied().collect();

    let comparisons = compare_visits(visits, position, metric, injured_side);
    let asymmetry_status = comparisons
        .iter()
        .map(|c| AsymmetryStatus::classify(c.asymmetry, config.asymmetry_alert_percent))
        .collect();

    let norms = config.norms.for_position(position);
    let with_norms = mode == ViewMode::Scatter && metric == Metric::NormalizedForce;

    let (axis, zones) = match mode {
        ViewMode::Scatter => {
            let thresholds = if with_norms { norms.values().to_vec() } else { Vec::new() };
            let axis = axis_range(
                AxisRequest::new(&values, config.scatter_top_padding).with_thresholds(&thresholds),
            );
            let zones = if with_norms { norms.zones(axis) } else { Vec::new() };
            (axis, zones)
        }
        ViewMode::Bar => {
            // Label anchors: the top of each visit's taller bar (never below
            // zero). Room for the label text comes from `bar_top_padding`.
            let label_extents: Vec<f64> = pairs
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| {
                    p.left
                        .into_iter()
                        .chain(p.right)
                        .fold(0.0_f64, f64::max)
                })
                .collect();
            let axis = axis_range(
                AxisRequest::new(&values, config.bar_top_padding)
                    .with_label_extents(&label_extents),
            );
            (axis, Vec::new())
        }
    };

    TrendSeries {
        position,
        metric,
        mode,
        tick_labels: visits.iter().map(|v| week_label(v.weeks_since_first)).collect(),
        left,
        right,
        comparisons,
        asymmetry_status,
        axis,
        zones,
    }
}

/// Tick label for a visit.
pub fn week_label(weeks_since_first: i64) -> String {
    if weeks_since_first == 0 {
        "First Test".to_string()
    } else {
        format!("Week {}", weeks_since_first)
    }
}

/// Two decimals for normalized force, one otherwise.
pub fn format_value(value: Option<f64>, metric: Metric) -> String {
    match value {
        None => "N/A".to_string(),
        Some(v) if metric == Metric::NormalizedForce => format!("{:.2}", v),
        Some(v) => format!("{:.1}", v),
    }
}

/// Signed whole percent, e.g. `+20%`.
pub fn format_change(change: Option<f64>) -> String {
    match change {
        None => "N/A".to_string(),
        Some(c) => {
            let rounded = c.round();
            let rounded = if rounded == 0.0 { 0.0 } else { rounded };
            let sign = if rounded >= 0.0 { "+" } else { "" };
            format!("{}{:.0}%", sign, rounded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate_visits;
    use crate::models::{Demographics, VisitRecord};

    fn record(date: &str, position: Position, left: f64, right: f64) -> VisitRecord {
        VisitRecord {
            metric: Metric::MaxForce,
            position,
            left_value: Some(left),
            right_value: Some(right),
            bodyweight_kg: Some(50.0),
            test_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            source_file: String::new(),
            demographics: Demographics::default(),
        }
    }

    fn visits() -> Vec<VisitAggregate> {
        aggregate_visits(&[
            record("2024-01-01", Position::I, 100.0, 80.0),
            record("2024-01-15", Position::I, 120.0, 100.0),
        ])
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_value(Some(2.0), Metric::NormalizedForce), "2.00");
        assert_eq!(format_value(Some(101.26), Metric::MaxForce), "101.3");
        assert_eq!(format_value(None, Metric::Rfd), "N/A");
        assert_eq!(format_change(Some(19.999999999999996)), "+20%");
        assert_eq!(format_change(Some(-20.4)), "-20%");
        assert_eq!(format_change(Some(-0.2)), "+0%");
        assert_eq!(format_change(None), "N/A");
        assert_eq!(week_label(0), "First Test");
        assert_eq!(week_label(2), "Week 2");
    }

    #[test]
    fn test_summary_table_shape() {
        let table = summary_table(&visits());
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].position, Position::I);
        assert_eq!(table[0].visits.len(), 2);
        assert_eq!(table[0].rows.len(), 3);

        let max_force = &table[0].rows[0];
        assert_eq!(max_force.metric, Metric::MaxForce);
        assert_eq!(max_force.cells[0].change_left, None);
        assert_eq!(max_force.cells[1].change_left, Some(20.0));
        assert_eq!(max_force.cells[1].change_right, Some(25.0));

        let empty_position = &table[1].rows[0];
        assert!(empty_position.cells.iter().all(|c| c.left.is_none()));
    }

    #[test]
    fn test_scatter_series_normalized_has_zones() {
        let config = PipelineConfig::default();
        let series = trend_series(
            &visits(),
            Position::I,
            Metric::NormalizedForce,
            ViewMode::Scatter,
            Side::Left,
            &config,
        );
        assert_eq!(series.tick_labels, vec!["First Test", "Week 2"]);
        assert_eq!(series.left, vec![Some(2.0), Some(2.4)]);
        assert!(series.axis.contains(2.1));
        assert!(!series.zones.is_empty());
    }

    #[test]
    fn test_bar_series_asymmetry() {
        let config = PipelineConfig::default();
        let series = trend_series(
            &visits(),
            Position::I,
            Metric::MaxForce,
            ViewMode::Bar,
            Side::Right,
            &config,
        );
        assert!(series.zones.is_empty());
        assert_eq!(series.comparisons[0].asymmetry, Some(-20.0));
        assert_eq!(series.asymmetry_status[0], AsymmetryStatus::Deficit);
        assert!(series.axis.contains(120.0));
        assert_eq!(series.axis.min, 0.0);
        // headroom above the tallest bar: 25% of 120
        assert!((series.axis.max - 150.0).abs() < 1e-9);
    }
}
