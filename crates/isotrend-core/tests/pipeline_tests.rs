//! End-to-end pipeline tests: upload → store → visibility → aggregation → change.

use chrono::NaiveDate;
use isotrend_core::analysis::{
    aggregate_visits, asymmetry, axis_range, format_change, format_value, AxisRequest,
};
use isotrend_core::db::Database;
use isotrend_core::ingest::{FilenameParser, RowValidator};
use isotrend_core::models::{Demographics, Metric, Position, Side, SidePair, VisitRecord};
use isotrend_core::{AnalysisSession, PatientStore, PipelineConfig, UploadedFile};
use proptest::prelude::*;

const HEADER: &str = "Metric,Position,Left Value,Right Value,Bodyweight (kg),Injured Side\n";

fn csv(rows: &[&str]) -> String {
    let mut out = HEADER.to_string();
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}

fn session() -> AnalysisSession {
    AnalysisSession::new(Database::open_in_memory().unwrap(), PipelineConfig::default())
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_normalized_force_and_change_example() {
    let mut session = session();
    session.admit_files(vec![
        UploadedFile::new(
            "ASH_P1_2024-01-01.csv",
            csv(&["Max Force (N),ASH Test Position I,100,100,50,Left"]),
        ),
        UploadedFile::new(
            "ASH_P1_2024-01-15.csv",
            csv(&["Max Force (N),ASH Test Position I,120,100,50,Left"]),
        ),
    ]);

    let view = session.patient_view("P1").unwrap();
    assert_eq!(view.aggregates.len(), 2);

    let first = view.aggregates[0].measurement(Position::I, Metric::NormalizedForce);
    let second = view.aggregates[1].measurement(Position::I, Metric::NormalizedForce);
    assert_eq!(format_value(first.left, Metric::NormalizedForce), "2.00");
    assert_eq!(format_value(second.left, Metric::NormalizedForce), "2.40");
    assert_eq!(view.aggregates[1].weeks_since_first, 2);

    let series = session
        .trend_series("P1", Position::I, Metric::NormalizedForce)
        .unwrap();
    assert_eq!(format_change(series.comparisons[1].change_left), "+20%");
    assert_eq!(format_change(series.comparisons[1].change_right), "+0%");
}

#[test]
fn test_asymmetry_examples() {
    let left_80 = asymmetry(SidePair::new(Some(80.0), Some(100.0)), Side::Left).unwrap();
    assert!(approx(left_80, -20.0));
    assert_eq!(asymmetry(SidePair::new(Some(0.0), Some(0.0)), Side::Left), Some(0.0));
    assert_eq!(asymmetry(SidePair::new(Some(80.0), Some(0.0)), Side::Left), None);
    assert_eq!(asymmetry(SidePair::new(None, Some(100.0)), Side::Left), None);
}

#[test]
fn test_absent_values_are_not_zero() {
    let mut session = session();
    session.admit_files(vec![UploadedFile::new(
        "ASH_P1_2024-01-01.csv",
        csv(&[
            "Max Force (N),ASH Test Position Y,0,n/a,,",
            "Max Force (N),ASH Test Position Y,,95,,",
        ]),
    )]);

    let view = session.patient_view("P1").unwrap();
    let cell = view.aggregates[0].measurement(Position::Y, Metric::MaxForce);
    assert_eq!(cell.left, Some(0.0));
    assert_eq!(cell.right, Some(95.0));

    // no bodyweight anywhere → no normalized force
    let normalized = view.aggregates[0].measurement(Position::Y, Metric::NormalizedForce);
    assert!(normalized.is_empty());
}

#[test]
fn test_later_bodyweight_revises_normalized_force() {
    let mut session = session();
    session.admit_files(vec![UploadedFile::new(
        "ASH_P1_2024-01-01.csv",
        csv(&[
            "Max Force (N),ASH Test Position T,100,90,40,",
            "RFD 100ms (N/s),ASH Test Position T,500,450,50,",
        ]),
    )]);

    let view = session.patient_view("P1").unwrap();
    let visit = &view.aggregates[0];
    assert_eq!(visit.bodyweight_kg, Some(50.0));
    let normalized = visit.measurement(Position::T, Metric::NormalizedForce);
    assert!(approx(normalized.left.unwrap(), 2.0));
    assert!(approx(normalized.right.unwrap(), 1.8));
}

#[test]
fn test_duplicate_visit_leaves_store_unchanged() {
    let mut session = session();
    let file = csv(&["Max Force (N),ASH Test Position I,100,100,50,"]);

    session.admit_files(vec![UploadedFile::new("ASH_P1_2024-01-01.csv", file.clone())]);
    let before = session.store().record_count("P1");

    let report = session.admit_files(vec![UploadedFile::new(
        "ASH_P1_2024-01-01.CSV",
        csv(&[
            "Max Force (N),ASH Test Position I,1,1,50,",
            "Max Force (N),ASH Test Position Y,1,1,50,",
        ]),
    )]);

    assert_eq!(report.skipped.duplicate_visit, 1);
    assert_eq!(report.files_processed, 0);
    assert_eq!(session.store().record_count("P1"), before);
}

#[test]
fn test_all_hidden_yields_empty_not_absent() {
    let mut session = session();
    session.admit_files(vec![
        UploadedFile::new(
            "ASH_P1_2024-01-01.csv",
            csv(&["Max Force (N),ASH Test Position I,100,100,50,"]),
        ),
        UploadedFile::new(
            "ASH_P1_2024-01-08.csv",
            csv(&["Max Force (N),ASH Test Position I,110,100,50,"]),
        ),
    ]);

    for entry in session.visit_dates("P1").unwrap() {
        session.set_visibility("P1", &entry.key, false).unwrap();
    }

    let view = session.patient_view("P1").unwrap();
    assert!(view.aggregates.is_empty());
    assert_eq!(session.store().record_count("P1"), 2);
    assert!(session.patient_view("P2").is_none());
}

#[test]
fn test_demographics_use_hidden_visits() {
    let mut session = session();
    session.admit_files(vec![
        UploadedFile::new(
            "ASH_P1_2024-01-01.csv",
            csv(&["Max Force (N),ASH Test Position I,100,80,60,Right"]),
        ),
        UploadedFile::new(
            "ASH_P1_2024-01-15.csv",
            csv(&["Max Force (N),ASH Test Position I,100,90,,"]),
        ),
    ]);
    session.set_visibility("P1", "2024-01-01", false).unwrap();

    let view = session.patient_view("P1").unwrap();
    assert_eq!(view.aggregates.len(), 1);
    assert_eq!(view.demographics.reported_injured_side, Some(Side::Right));
    assert_eq!(view.injured_side, Side::Right);
    assert_eq!(view.demographics.bodyweight_kg, Some(60.0));

    // 90 / 100 with the right side injured
    let series = session
        .trend_series("P1", Position::I, Metric::MaxForce)
        .unwrap();
    assert!(approx(series.comparisons[0].asymmetry.unwrap(), -10.0));
}

#[test]
fn test_sibling_failures_are_counted() {
    let mut session = session();
    let good = csv(&["Max Force (N),ASH Test Position I,100,100,50,"]);

    let report = session.admit_files(vec![
        UploadedFile::new("ASH_P1_2024-01-01.csv", good.clone()),
        UploadedFile::new("ASH_P1_2024-13-01.csv", good.clone()),
        UploadedFile::new("P1_2024-01-02.csv", good.clone()),
        UploadedFile::new("ASH_P2_2024-01-01.csv", "Left Value,Right Value\n1,2\n"),
        UploadedFile::new("ASH_P3_2024-01-01.csv", good),
    ]);

    assert_eq!(report.files_received, 5);
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.skipped.invalid_date, 1);
    assert_eq!(report.skipped.malformed_filename, 1);
    assert_eq!(report.skipped.parse_failure, 1);
    assert_eq!(session.patient_ids(), &["P1", "P3"]);
}

#[test]
fn test_required_prefix() {
    let config = PipelineConfig {
        required_prefix: Some("ASH".into()),
        ..PipelineConfig::default()
    };
    let mut session = AnalysisSession::new(Database::open_in_memory().unwrap(), config);
    let file = csv(&["Max Force (N),ASH Test Position I,100,100,50,"]);

    let report = session.admit_files(vec![
        UploadedFile::new("ash_P1_2024-01-01.csv", file.clone()),
        UploadedFile::new("KTW_P2_2024-01-01.csv", file),
    ]);
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.skipped.malformed_filename, 1);
}

fn record(date: NaiveDate, position: Position, max_force: Option<f64>, bw: Option<f64>) -> VisitRecord {
    VisitRecord {
        metric: Metric::MaxForce,
        position,
        left_value: max_force,
        right_value: max_force.map(|v| v * 0.9),
        bodyweight_kg: bw,
        test_date: date,
        source_file: String::new(),
        demographics: Demographics::default(),
    }
}

fn position_strategy() -> impl Strategy<Value = Position> {
    prop_oneof![Just(Position::I), Just(Position::Y), Just(Position::T)]
}

proptest! {
    #[test]
    fn prop_admitted_positions_are_valid(position in "[A-Za-z ]{0,24}") {
        let identity = FilenameParser::default().parse("ASH_P1_2024-01-01.csv").unwrap();
        let contents = format!("Metric,Position,Left Value\nMax Force (N),{},1\n", position);
        let parsed = RowValidator::default()
            .parse_csv(&identity, contents.as_bytes())
            .unwrap();

        for record in &parsed.records {
            prop_assert!(Position::ALL.contains(&record.position));
        }
        prop_assert_eq!(parsed.records.len() + parsed.rejected.len(), 1);
    }

    #[test]
    fn prop_store_sorted_after_merges(
        batches in prop::collection::vec(prop::collection::vec(0u32..400, 0..6), 1..6)
    ) {
        let base = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let mut store = PatientStore::new();

        for days in batches {
            let records = days
                .into_iter()
                .map(|d| record(base + chrono::Duration::days(d as i64), Position::I, Some(1.0), None))
                .collect();
            store.merge("P1", records);

            let dates: Vec<_> = store.records("P1").unwrap().iter().map(|r| r.test_date).collect();
            prop_assert!(dates.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn prop_normalized_force_idempotent(
        rows in prop::collection::vec(
            (0u32..60, position_strategy(), prop::option::of(0.0f64..500.0), prop::option::of(-10.0f64..120.0)),
            0..20,
        )
    ) {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut records: Vec<VisitRecord> = rows
            .into_iter()
            .map(|(d, p, f, bw)| record(base + chrono::Duration::days(d as i64), p, f, bw))
            .collect();
        records.sort_by_key(|r| r.test_date);

        let first = aggregate_visits(&records);
        let second = aggregate_visits(&records);
        prop_assert_eq!(&first, &second);

        for visit in &first {
            for position in Position::ALL {
                let normalized = visit.measurement(position, Metric::NormalizedForce);
                if visit.bodyweight_kg.map_or(true, |bw| bw <= 0.0) {
                    prop_assert!(normalized.is_empty());
                }
            }
        }
    }

    #[test]
    fn prop_axis_range_contains_data(
        values in prop::collection::vec(-1000.0f64..1000.0, 0..12),
        padding in 0.0f64..0.5,
    ) {
        let range = axis_range(AxisRequest::new(&values, padding));
        prop_assert!(range.min < range.max);
        for v in &values {
            prop_assert!(range.contains(*v));
        }
        if values.iter().all(|v| *v >= 0.0) {
            prop_assert!(range.min <= 0.0);
        }
        if !values.is_empty() && values.iter().all(|v| *v <= 0.0) {
            prop_assert!(range.max >= 0.0);
        }
    }
}
