//! Persisted analysis state (single JSON blob per key).
//!
//! Blob layout:
//!
//! ```text
//! { patients: {patientId: Record[]}, patientIds: string[],
//!   selectedPatientId: string|null, viewMode: "scatter"|"bar",
//!   visibility: {patientId: {dateStr: bool}} }
//! ```
//!
//! Record keys mirror the CSV columns. Dates are stored as `YYYY-MM-DD`;
//! RFC 3339 timestamps written by older exports are accepted on load.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{Database, DbError, DbResult};
use crate::models::{Demographics, Metric, Position, Side, ViewMode, VisitRecord};
use crate::store::{PatientStore, VisibilityMap};

/// The persisted blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default, alias = "allPatientData")]
    pub patients: BTreeMap<String, Vec<StoredRecord>>,
    #[serde(default, alias = "uniquePatientIds")]
    pub patient_ids: Vec<String>,
    #[serde(default)]
    pub selected_patient_id: Option<String>,
    #[serde(default, alias = "currentViewMode")]
    pub view_mode: ViewMode,
    #[serde(default, alias = "testDateVisibility")]
    pub visibility: VisibilityMap,
}

/// One record as stored in the blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    #[serde(rename = "Metric", default)]
    pub metric: Option<String>,
    /// Raw column text, kept only when loaded from an older blob
    #[serde(rename = "Position", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(rename = "Position Clean", default)]
    pub position_clean: Option<String>,
    #[serde(rename = "Left Value", default, deserialize_with = "lenient_number")]
    pub left_value: Option<f64>,
    #[serde(rename = "Right Value", default, deserialize_with = "lenient_number")]
    pub right_value: Option<f64>,
    #[serde(rename = "Bodyweight (kg)", default, deserialize_with = "lenient_number")]
    pub bodyweight_kg: Option<f64>,
    #[serde(rename = "Test Date", default)]
    pub test_date: Option<String>,
    #[serde(rename = "Filename", default)]
    pub source_file: Option<String>,
    #[serde(rename = "Age", default, deserialize_with = "lenient_number")]
    pub age: Option<f64>,
    #[serde(rename = "Gender", default, deserialize_with = "lenient_text")]
    pub gender: Option<String>,
    #[serde(rename = "Sport", default, deserialize_with = "lenient_text")]
    pub sport: Option<String>,
    #[serde(rename = "Injured Side", default, deserialize_with = "lenient_text")]
    pub injured_side: Option<String>,
}

impl From<&VisitRecord> for StoredRecord {
    fn from(record: &VisitRecord) -> Self {
        Self {
            metric: Some(record.metric.label().to_string()),
            position: None,
            position_clean: Some(record.position.code().to_string()),
            left_value: record.left_value,
            right_value: record.right_value,
            bodyweight_kg: record.bodyweight_kg,
            test_date: Some(record.date_key()),
            source_file: Some(record.source_file.clone()),
            age: record.demographics.age.map(f64::from),
            gender: record.demographics.gender.clone(),
            sport: record.demographics.sport.clone(),
            injured_side: record.demographics.injured_side.map(|s| s.as_str().to_string()),
        }
    }
}

impl StoredRecord {
    /// Convert back, `None` when the date, metric or position is unusable.
    pub fn into_record(self) -> Option<VisitRecord> {
        let test_date = parse_stored_date(self.test_date.as_deref()?)?;
        let metric = Metric::from_label(self.metric.as_deref()?)?;
        let position = self
            .position_clean
            .as_deref()
            .and_then(Position::from_code)
            .or_else(|| {
                self.position
                    .as_deref()
                    .and_then(|raw| raw.split_whitespace().last())
                    .and_then(Position::from_code)
            })?;

        Some(VisitRecord {
            metric,
            position,
            left_value: self.left_value,
            right_value: self.right_value,
            bodyweight_kg: self.bodyweight_kg,
            test_date,
            source_file: self.source_file.unwrap_or_default(),
            demographics: Demographics {
                age: self.age.filter(|a| *a >= 0.0).map(|a| a.round() as u32),
                gender: self.gender,
                sport: self.sport,
                injured_side: self.injured_side.as_deref().and_then(Side::parse),
            },
        })
    }
}

/// Accept `YYYY-MM-DD` or an RFC 3339 timestamp (calendar date kept).
pub fn parse_stored_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// State rebuilt from a blob.
#[derive(Debug, Clone, Default)]
pub struct RestoredState {
    pub store: PatientStore,
    pub visibility: VisibilityMap,
    pub selected_patient_id: Option<String>,
    pub view_mode: ViewMode,
    /// Records dropped for an unusable date, metric or position
    pub dropped_records: usize,
}

impl PersistedState {
    /// Snapshot in-memory state.
    pub fn capture(
        store: &PatientStore,
        visibility: &VisibilityMap,
        selected_patient_id: Option<&str>,
        view_mode: ViewMode,
    ) -> Self {
        Self {
            patients: store
                .iter()
                .map(|(id, records)| (id.clone(), records.iter().map(StoredRecord::from).collect()))
                .collect(),
            patient_ids: store.patient_ids().to_vec(),
            selected_patient_id: selected_patient_id.map(str::to_string),
            view_mode,
            visibility: visibility.clone(),
        }
    }

    /// Rebuild in-memory state. A patient whose records all drop keeps its id
    /// with an empty record set.
    pub fn restore(self) -> RestoredState {
        let mut store = PatientStore::new();
        let mut visibility = self.visibility;
        let mut dropped_records = 0;

        for (patient_id, stored) in self.patients {
            let total = stored.len();
            let records: Vec<VisitRecord> =
                stored.into_iter().filter_map(StoredRecord::into_record).collect();
            if records.len() < total {
                warn!(
                    patient_id = %patient_id,
                    dropped = total - records.len(),
                    "dropping unreadable stored records"
                );
            }
            dropped_records += total - records.len();
            store.merge(&patient_id, records);
            visibility.observe(&patient_id, store.visit_dates(&patient_id));
        }

        let selected_patient_id = self.selected_patient_id.filter(|id| store.contains(id));

        RestoredState {
            store,
            visibility,
            selected_patient_id,
            view_mode: self.view_mode,
            dropped_records,
        }
    }
}

/// Hex SHA-256 of a payload.
pub fn checksum(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

impl Database {
    /// Write (or replace) the state blob under `key`.
    pub fn save_state(&self, key: &str, state: &PersistedState) -> DbResult<()> {
        let payload = serde_json::to_string(state)?;
        let sum = checksum(&payload);

        self.conn.execute(
            r#"
            INSERT INTO analysis_state (state_key, payload, checksum, saved_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(state_key) DO UPDATE SET
                payload = excluded.payload,
                checksum = excluded.checksum,
                saved_at = excluded.saved_at
            "#,
            params![key, payload, sum, chrono::Utc::now().to_rfc3339()],
        )?;
        debug!(key, bytes = payload.len(), "saved analysis state");
        Ok(())
    }

    /// Read the state blob under `key`, verifying its checksum.
    pub fn load_state(&self, key: &str) -> DbResult<Option<PersistedState>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT payload, checksum FROM analysis_state WHERE state_key = ?",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, stored_sum)) = row else {
            return Ok(None);
        };

        if checksum(&payload) != stored_sum {
            return Err(DbError::ChecksumMismatch(key.to_string()));
        }
        Ok(Some(serde_json::from_str(&payload)?))
    }

    /// Remove the state blob. Returns whether one existed.
    pub fn delete_state(&self, key: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM analysis_state WHERE state_key = ?", [key])?;
        Ok(rows_affected > 0)
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
    .filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str) -> VisitRecord {
        VisitRecord {
            metric: Metric::MaxForce,
            position: Position::Y,
            left_value: Some(0.0),
            right_value: None,
            bodyweight_kg: Some(61.5),
            test_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            source_file: format!("ASH_P1_{}.csv", date),
            demographics: Demographics {
                age: Some(19),
                gender: Some("F".into()),
                sport: None,
                injured_side: Some(Side::Right),
            },
        }
    }

    #[test]
    fn test_parse_stored_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(parse_stored_date("2024-03-01"), expected);
        assert_eq!(parse_stored_date("2024-03-01T00:00:00.000Z"), expected);
        assert_eq!(parse_stored_date("yesterday"), None);
    }

    #[test]
    fn test_stored_record_round_trip() {
        let original = record("2024-03-01");
        let stored = StoredRecord::from(&original);
        assert_eq!(stored.test_date.as_deref(), Some("2024-03-01"));
        assert_eq!(stored.into_record(), Some(original));
    }

    #[test]
    fn test_legacy_blob_keys() {
        let json = r#"{
            "allPatientData": {
                "P1": [
                    {"Metric": "Max Force (N)", "Position": "ASH Test Position I",
                     "Position Clean": "I", "Left Value": 100, "Right Value": null,
                     "Bodyweight (kg)": "50", "Test Date": "2024-03-01T00:00:00.000Z",
                     "Filename": "ASH_P1_2024-03-01.csv", "Age": 24, "Gender": "M"}
                ]
            },
            "uniquePatientIds": ["P1"],
            "selectedPatientId": "P1",
            "currentViewMode": "bar",
            "testDateVisibility": {"P1": {"2024-03-01": false}}
        }"#;

        let state: PersistedState = serde_json::from_str(json).unwrap();
        let restored = state.restore();

        let records = restored.store.records("P1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].position, Position::I);
        assert_eq!(records[0].bodyweight_kg, Some(50.0));
        assert_eq!(records[0].demographics.age, Some(24));
        assert_eq!(restored.view_mode, ViewMode::Bar);
        assert_eq!(restored.selected_patient_id.as_deref(), Some("P1"));
        assert_eq!(restored.visibility.get("P1", "2024-03-01"), Some(false));
    }

    #[test]
    fn test_restore_drops_bad_dates_keeps_patient() {
        let mut state = PersistedState::default();
        let mut bad = StoredRecord::from(&record("2024-03-01"));
        bad.test_date = Some("not a date".into());
        let mut missing = StoredRecord::from(&record("2024-03-08"));
        missing.test_date = None;
        state.patients.insert("P7".into(), vec![bad, missing]);
        state.selected_patient_id = Some("P404".into());

        let restored = state.restore();
        assert_eq!(restored.dropped_records, 2);
        assert_eq!(restored.store.records("P7").map(|r| r.len()), Some(0));
        assert_eq!(restored.store.patient_ids(), &["P7"]);
        assert_eq!(restored.selected_patient_id, None);
    }

    #[test]
    fn test_save_load_delete() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_state("k").unwrap().is_none());

        let mut store = PatientStore::new();
        store.merge("P1", vec![record("2024-03-01")]);
        let mut visibility = VisibilityMap::new();
        visibility.observe("P1", store.visit_dates("P1"));

        let state = PersistedState::capture(&store, &visibility, Some("P1"), ViewMode::Bar);
        db.save_state("k", &state).unwrap();
        db.save_state("k", &state).unwrap();

        assert_eq!(db.load_state("k").unwrap(), Some(state));
        assert!(db.delete_state("k").unwrap());
        assert!(!db.delete_state("k").unwrap());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.save_state("k", &PersistedState::default()).unwrap();
        db.conn()
            .execute(
                "UPDATE analysis_state SET payload = '{\"patientIds\":[\"X\"]}' WHERE state_key = 'k'",
                [],
            )
            .unwrap();

        assert!(matches!(db.load_state("k"), Err(DbError::ChecksumMismatch(_))));
    }
}
