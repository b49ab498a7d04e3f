//! Groups visible records into one aggregate per visit date.
//!
//! Two phases per call:
//! 1. merge raw writes (coalescing, last non-null bodyweight wins)
//! 2. derive normalized force once per date from the final max force and
//!    bodyweight
//!
//! The result does not depend on the order rows arrive in within a date.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{Metric, Position, SidePair, VisitAggregate, VisitRecord};

/// Aggregate visibility-filtered records, ascending by date.
pub fn aggregate_visits<'r, I>(records: I) -> Vec<VisitAggregate>
where
    I: IntoIterator<Item = &'r VisitRecord>,
{
    let mut by_date: BTreeMap<NaiveDate, VisitAggregate> = BTreeMap::new();

    for record in records {
        let visit = by_date
            .entry(record.test_date)
            .or_insert_with(|| VisitAggregate::new(record.test_date));
        apply_record(visit, record);
    }

    let first = by_date.keys().next().copied();
    let mut visits: Vec<VisitAggregate> = by_date.into_values().collect();

    for visit in &mut visits {
        finalize(visit);
        if let Some(first) = first {
            visit.weeks_since_first = weeks_between(first, visit.test_date);
        }
    }
    visits
}

/// Max force over bodyweight; absent unless bodyweight is positive.
pub fn normalized_force(max_force: Option<f64>, bodyweight_kg: Option<f64>) -> Option<f64> {
    match (max_force, bodyweight_kg) {
        (Some(force), Some(bw)) if bw > 0.0 => Some(force / bw),
        _ => None,
    }
}

/// Whole weeks from `first` to `date`, rounded to nearest.
pub fn weeks_between(first: NaiveDate, date: NaiveDate) -> i64 {
    let days = (date - first).num_days() as f64;
    (days / 7.0).round() as i64
}

fn apply_record(visit: &mut VisitAggregate, record: &VisitRecord) {
    // Normalized force rows are ignored: the cell is always derived.
    if record.metric != Metric::NormalizedForce {
        visit
            .grid
            .cell_mut(record.position, record.metric)
            .coalesce(record.left_value, record.right_value);
    }
    if record.bodyweight_kg.is_some() {
        visit.bodyweight_kg = record.bodyweight_kg;
    }
}

fn finalize(visit: &mut VisitAggregate) {
    let bw = visit.bodyweight_kg;
    for position in Position::ALL {
        let force = visit.grid.get(position, Metric::MaxForce);
        *visit.grid.cell_mut(position, Metric::NormalizedForce) = SidePair::new(
            normalized_force(force.left, bw),
            normalized_force(force.right, bw),
        );
    }
}
