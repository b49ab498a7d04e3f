//! Visit-to-visit change, left/right asymmetry and demographic resolution.

use serde::{Deserialize, Serialize};

use crate::models::{Metric, Position, Side, SidePair, VisitAggregate, VisitRecord};

/// Percent change from `previous` to `latest`.
///
/// Not applicable when either value is absent or `previous` is zero.
pub fn percent_change(latest: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (latest, previous) {
        (Some(latest), Some(previous)) if previous != 0.0 => {
            Some((latest - previous) / previous.abs() * 100.0)
        }
        _ => None,
    }
}

/// Injured side relative to healthy side, in percent (negative = deficit).
///
/// Both sides at zero is no asymmetry rather than not applicable.
pub fn asymmetry(pair: SidePair, injured_side: Side) -> Option<f64> {
    let injured = pair.get(injured_side)?;
    let healthy = pair.get(injured_side.opposite())?;

    if healthy != 0.0 {
        Some(injured / healthy * 100.0 - 100.0)
    } else if injured == 0.0 {
        Some(0.0)
    } else {
        None
    }
}

/// Direction of a percent change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeDirection {
    Gain,
    Loss,
    Unchanged,
    NotApplicable,
}

impl ChangeDirection {
    pub fn of(change: Option<f64>) -> Self {
        match change {
            None => ChangeDirection::NotApplicable,
            Some(c) if c > 0.0 => ChangeDirection::Gain,
            Some(c) if c < 0.0 => ChangeDirection::Loss,
            Some(_) => ChangeDirection::Unchanged,
        }
    }
}

/// Asymmetry relative to the clinical alert threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AsymmetryStatus {
    /// At or above the alert threshold
    Acceptable,
    /// Injured side lagging beyond the threshold
    Deficit,
    NotApplicable,
}

impl AsymmetryStatus {
    pub fn classify(asymmetry: Option<f64>, alert_percent: f64) -> Self {
        match asymmetry {
            None => AsymmetryStatus::NotApplicable,
            Some(a) if a >= alert_percent => AsymmetryStatus::Acceptable,
            Some(_) => AsymmetryStatus::Deficit,
        }
    }
}

/// Change and asymmetry figures for one position/metric at one visit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CellComparison {
    pub change_left: Option<f64>,
    pub change_right: Option<f64>,
    pub asymmetry: Option<f64>,
}

/// Compare every visit with its predecessor.
///
/// The first visit has no change figures; asymmetry is computed for all.
pub fn compare_visits(
    visits: &[VisitAggregate],
    position: Position,
    metric: Metric,
    injured_side: Side,
) -> Vec<CellComparison> {
    visits
        .iter()
        .enumerate()
        .map(|(i, visit)| {
            let current = visit.measurement(position, metric);
            let previous = i
                .checked_sub(1)
                .map(|p| visits[p].measurement(position, metric))
                .unwrap_or_default();
            let has_previous = i > 0;

            CellComparison {
                change_left: has_previous
                    .then(|| percent_change(current.left, previous.left))
                    .flatten(),
                change_right: has_previous
                    .then(|| percent_change(current.right, previous.right))
                    .flatten(),
                asymmetry: asymmetry(current, injured_side),
            }
        })
        .collect()
}

/// Most recent known demographics for a patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DemographicSummary {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub sport: Option<String>,
    /// Last recorded bodyweight, kg
    pub bodyweight_kg: Option<f64>,
    /// Reported injured side, if any record carried one
    pub reported_injured_side: Option<Side>,
}

impl DemographicSummary {
    /// Injured side used for asymmetry; left when never reported.
    pub fn injured_side(&self) -> Side {
        self.reported_injured_side.unwrap_or(Side::Left)
    }

    fn is_complete(&self) -> bool {
        self.age.is_some()
            && self.gender.is_some()
            && self.sport.is_some()
            && self.bodyweight_kg.is_some()
            && self.reported_injured_side.is_some()
    }
}

/// Scan the full history newest to oldest, filling each field independently
/// from the first record that has it. Visibility is not applied.
pub fn resolve_demographics(records: &[VisitRecord]) -> DemographicSummary {
    let mut summary = DemographicSummary::default();

    for record in records.iter().rev() {
        let demo = &record.demographics;
        if summary.age.is_none() {
            summary.age = demo.age;
        }
        if summary.gender.is_none() {
            summary.gender = demo.gender.clone();
        }
        if summary.sport.is_none() {
            summary.sport = demo.sport.clone();
        }
        if summary.bodyweight_kg.is_none() {
            summary.bodyweight_kg = record.bodyweight_kg;
        }
        if summary.reported_injured_side.is_none() {
            summary.reported_injured_side = demo.injured_side;
        }
        if summary.is_complete() {
            break;
        }
    }
    summary
}
