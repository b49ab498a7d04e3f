//! Isotrend Core Library
//!
//! Isometric strength test ingestion and visit-over-visit trend analysis.
//!
//! # Architecture
//!
//! ```text
//! ASH_<patient>_<YYYY-MM-DD>.csv  (one upload batch)
//!          │
//!    File Admission ── malformed / bad date / duplicate visit → skipped
//!          │
//!    concurrent CSV parse + Row Validator ── invalid rows → dropped
//!          │
//!   ═══════╪═══════  batch barrier
//!          │
//!    Patient Store merge ──► Visibility Map (new dates visible)
//!          │                         │
//!          └──────────┬──────────────┘
//!                     ▼
//!            visible records per patient
//!                     │
//!              Date Aggregator (merge writes → finalize N/kg)
//!                     │
//!           Change / Asymmetry Calculator
//!                     │
//!     ┌───────────────┼────────────────┐
//!     ▼               ▼                ▼
//! Summary table   Chart series     Axis ranges + norm bands
//! ```
//!
//! # Core Principle
//!
//! **Absent is not zero.** A missing or unparseable value stays absent through
//! every stage; zero is a real measurement.
//!
//! # Modules
//!
//! - [`ingest`]: filename admission, CSV row validation, upload batches
//! - [`models`]: Domain types (VisitRecord, VisitAggregate, Position, Metric, etc.)
//! - [`store`]: Patient store and visibility map
//! - [`analysis`]: Aggregation, change/asymmetry, axis ranges, norms, reports
//! - [`db`]: SQLite persistence of the analysis state
//! - [`session`]: The controller that owns and mutates all state

pub mod analysis;
pub mod config;
pub mod db;
pub mod ingest;
pub mod models;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use analysis::{AxisRange, DemographicSummary, PositionSummary, TrendSeries};
pub use config::PipelineConfig;
pub use db::Database;
pub use ingest::{IngestError, UploadedFile};
pub use models::{Metric, Position, Side, ViewMode, VisitAggregate, VisitRecord};
pub use session::{
    AnalysisSession, BatchReport, PatientView, PersistenceError, SessionError, SkipTally,
};
pub use store::{PatientStore, VisibilityMap};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum IsotrendError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for IsotrendError {
    fn from(e: db::DbError) -> Self {
        IsotrendError::DatabaseError(e.to_string())
    }
}

impl From<PersistenceError> for IsotrendError {
    fn from(e: PersistenceError) -> Self {
        IsotrendError::PersistenceError(e.to_string())
    }
}

impl From<SessionError> for IsotrendError {
    fn from(e: SessionError) -> Self {
        IsotrendError::NotFound(e.to_string())
    }
}

impl From<serde_json::Error> for IsotrendError {
    fn from(e: serde_json::Error) -> Self {
        IsotrendError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for IsotrendError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        IsotrendError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

fn parse_config(config_json: Option<String>) -> Result<PipelineConfig, IsotrendError> {
    match config_json {
        Some(json) => Ok(PipelineConfig::from_json(&json)?),
        None => Ok(PipelineConfig::default()),
    }
}

/// Open or create a session database at the given path.
///
/// Saved state is not read until [`IsotrendCore::load`] is called.
#[uniffi::export]
pub fn open_session(
    path: String,
    config_json: Option<String>,
) -> Result<Arc<IsotrendCore>, IsotrendError> {
    let config = parse_config(config_json)?;
    let db = Database::open(&path)?;
    Ok(Arc::new(IsotrendCore {
        session: Mutex::new(AnalysisSession::new(db, config)),
    }))
}

/// Create an in-memory session (for testing).
#[uniffi::export]
pub fn open_session_in_memory(
    config_json: Option<String>,
) -> Result<Arc<IsotrendCore>, IsotrendError> {
    let config = parse_config(config_json)?;
    let db = Database::open_in_memory()?;
    Ok(Arc::new(IsotrendCore {
        session: Mutex::new(AnalysisSession::new(db, config)),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe session wrapper for FFI.
///
/// The lock is held for a whole upload batch, so overlapping batches never
/// interleave their merges.
#[derive(uniffi::Object)]
pub struct IsotrendCore {
    session: Mutex<AnalysisSession>,
}

#[uniffi::export]
impl IsotrendCore {
    // =========================================================================
    // Persistence
    // =========================================================================

    /// Restore saved state. Returns the number of stored records dropped as
    /// unreadable. On failure the session is left empty.
    pub fn load(&self) -> Result<u32, IsotrendError> {
        let mut session = self.session.lock()?;
        Ok(session.load()? as u32)
    }

    /// Save the current state.
    pub fn save(&self) -> Result<(), IsotrendError> {
        let session = self.session.lock()?;
        session.save()?;
        Ok(())
    }

    /// Forget all patients and delete the saved state.
    pub fn clear_history(&self) -> Result<(), IsotrendError> {
        let mut session = self.session.lock()?;
        session.clear_history()?;
        Ok(())
    }

    /// Message from the last failed automatic save, if any.
    pub fn take_persistence_notice(&self) -> Result<Option<String>, IsotrendError> {
        let mut session = self.session.lock()?;
        Ok(session.take_persistence_notice().map(|e| e.to_string()))
    }

    // =========================================================================
    // Upload Operations
    // =========================================================================

    /// Ingest one batch of uploaded files.
    pub fn admit_files(&self, files: Vec<FfiUpload>) -> Result<FfiBatchReport, IsotrendError> {
        let mut session = self.session.lock()?;
        let files = files.into_iter().map(UploadedFile::from).collect();
        Ok(session.admit_files(files).into())
    }

    /// Ingest one batch of files read from disk.
    ///
    /// Unreadable paths are reported per file, like any other rejection.
    pub fn admit_paths(&self, paths: Vec<String>) -> Result<FfiBatchReport, IsotrendError> {
        let mut session = self.session.lock()?;
        Ok(session.admit_paths(&paths).into())
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Patient ids in natural order.
    pub fn patient_ids(&self) -> Result<Vec<String>, IsotrendError> {
        let session = self.session.lock()?;
        Ok(session.patient_ids().to_vec())
    }

    /// Case-insensitive substring search over patient ids.
    pub fn search_patients(&self, query: String) -> Result<Vec<String>, IsotrendError> {
        let session = self.session.lock()?;
        Ok(session.search_patients(&query))
    }

    pub fn select_patient(&self, patient_id: String) -> Result<(), IsotrendError> {
        let mut session = self.session.lock()?;
        session.select_patient(&patient_id)?;
        Ok(())
    }

    pub fn selected_patient_id(&self) -> Result<Option<String>, IsotrendError> {
        let session = self.session.lock()?;
        Ok(session.selected_patient_id().map(str::to_string))
    }

    // =========================================================================
    // Visibility
    // =========================================================================

    /// Visit dates of a patient with their visibility flags.
    pub fn visit_dates(&self, patient_id: String) -> Result<Option<Vec<FfiVisitDate>>, IsotrendError> {
        let session = self.session.lock()?;
        Ok(session.visit_dates(&patient_id).map(|dates| {
            dates
                .into_iter()
                .map(|d| FfiVisitDate {
                    date: d.key,
                    visible: d.visible,
                })
                .collect()
        }))
    }

    /// Flip one visit's visibility, returning the new flag.
    pub fn toggle_visibility(&self, patient_id: String, date: String) -> Result<bool, IsotrendError> {
        let mut session = self.session.lock()?;
        Ok(session.toggle_visibility(&patient_id, &date)?)
    }

    pub fn set_visibility(
        &self,
        patient_id: String,
        date: String,
        visible: bool,
    ) -> Result<(), IsotrendError> {
        let mut session = self.session.lock()?;
        session.set_visibility(&patient_id, &date, visible)?;
        Ok(())
    }

    // =========================================================================
    // Analysis Views
    // =========================================================================

    /// `"scatter"` or `"bar"`.
    pub fn set_view_mode(&self, mode: String) -> Result<(), IsotrendError> {
        let mode = ViewMode::parse(&mode)
            .ok_or_else(|| IsotrendError::InvalidInput(format!("Unknown view mode: {}", mode)))?;
        let mut session = self.session.lock()?;
        session.set_view_mode(mode);
        Ok(())
    }

    pub fn view_mode(&self) -> Result<String, IsotrendError> {
        let session = self.session.lock()?;
        Ok(session.view_mode().as_str().to_string())
    }

    /// Aggregated visible visits and demographics; `None` for an unknown patient.
    pub fn patient_view(&self, patient_id: String) -> Result<Option<FfiPatientView>, IsotrendError> {
        let session = self.session.lock()?;
        Ok(session.patient_view(&patient_id).map(Into::into))
    }

    /// Summary table for a patient as JSON.
    pub fn summary_table_json(&self, patient_id: String) -> Result<Option<String>, IsotrendError> {
        let session = self.session.lock()?;
        session
            .summary_table(&patient_id)
            .map(|table| serde_json::to_string(&table))
            .transpose()
            .map_err(Into::into)
    }

    /// One chart's series (current view mode) as JSON.
    pub fn trend_series_json(
        &self,
        patient_id: String,
        position: String,
        metric: String,
    ) -> Result<Option<String>, IsotrendError> {
        let position = Position::from_code(&position)
            .ok_or_else(|| IsotrendError::InvalidInput(format!("Unknown position: {}", position)))?;
        let metric = Metric::from_label(&metric)
            .ok_or_else(|| IsotrendError::InvalidInput(format!("Unknown metric: {}", metric)))?;

        let session = self.session.lock()?;
        session
            .trend_series(&patient_id, position, metric)
            .map(|series| serde_json::to_string(&series))
            .transpose()
            .map_err(Into::into)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe uploaded file.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUpload {
    pub file_name: String,
    pub contents: Vec<u8>,
}

impl From<FfiUpload> for UploadedFile {
    fn from(upload: FfiUpload) -> Self {
        UploadedFile::new(upload.file_name, upload.contents)
    }
}

/// FFI-safe skipped file or row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRejection {
    pub file_name: String,
    /// Row line number, absent for whole-file rejections
    pub line: Option<u64>,
    pub reason: String,
}

/// FFI-safe skip counts.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSkipTally {
    pub malformed_filename: u32,
    pub invalid_date: u32,
    pub duplicate_visit: u32,
    pub parse_failure: u32,
    pub invalid_row: u32,
}

impl From<SkipTally> for FfiSkipTally {
    fn from(tally: SkipTally) -> Self {
        Self {
            malformed_filename: tally.malformed_filename as u32,
            invalid_date: tally.invalid_date as u32,
            duplicate_visit: tally.duplicate_visit as u32,
            parse_failure: tally.parse_failure as u32,
            invalid_row: tally.invalid_row as u32,
        }
    }
}

/// FFI-safe batch report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBatchReport {
    pub batch_id: String,
    pub files_received: u32,
    pub files_processed: u32,
    pub patients_added: Vec<String>,
    pub patients_updated: Vec<String>,
    pub skipped: FfiSkipTally,
    pub rejections: Vec<FfiRejection>,
    pub total_patients: u32,
    pub persistence_notice: Option<String>,
}

impl From<BatchReport> for FfiBatchReport {
    fn from(report: BatchReport) -> Self {
        let files = report.rejections.into_iter().map(|e| FfiRejection {
            file_name: e.file_name().to_string(),
            line: None,
            reason: e.to_string(),
        });
        let rows = report.row_rejections.into_iter().map(|r| FfiRejection {
            file_name: r.file_name,
            line: Some(r.line),
            reason: r.reason.to_string(),
        });

        Self {
            batch_id: report.batch_id.to_string(),
            files_received: report.files_received as u32,
            files_processed: report.files_processed as u32,
            patients_added: report.patients_added,
            patients_updated: report.patients_updated,
            skipped: report.skipped.into(),
            rejections: files.chain(rows).collect(),
            total_patients: report.total_patients as u32,
            persistence_notice: report.persistence.map(|e| e.to_string()),
        }
    }
}

/// FFI-safe visit date flag.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitDate {
    pub date: String,
    pub visible: bool,
}

/// FFI-safe grid cell.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMeasurement {
    pub position: String,
    pub metric: String,
    pub left: Option<f64>,
    pub right: Option<f64>,
}

/// FFI-safe visit aggregate.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitAggregate {
    pub test_date: String,
    pub weeks_since_first: i64,
    pub bodyweight_kg: Option<f64>,
    pub measurements: Vec<FfiMeasurement>,
}

impl From<VisitAggregate> for FfiVisitAggregate {
    fn from(visit: VisitAggregate) -> Self {
        let measurements = Position::ALL
            .iter()
            .flat_map(|&position| Metric::ALL.iter().map(move |&metric| (position, metric)))
            .map(|(position, metric)| {
                let pair = visit.measurement(position, metric);
                FfiMeasurement {
                    position: position.code().to_string(),
                    metric: metric.label().to_string(),
                    left: pair.left,
                    right: pair.right,
                }
            })
            .collect();

        Self {
            test_date: models::date_key(visit.test_date),
            weeks_since_first: visit.weeks_since_first,
            bodyweight_kg: visit.bodyweight_kg,
            measurements,
        }
    }
}

/// FFI-safe demographic summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDemographics {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub sport: Option<String>,
    pub bodyweight_kg: Option<f64>,
    pub injured_side: String,
}

/// FFI-safe patient view.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientView {
    pub patient_id: String,
    pub visits: Vec<FfiVisitAggregate>,
    pub demographics: FfiDemographics,
}

impl From<PatientView> for FfiPatientView {
    fn from(view: PatientView) -> Self {
        Self {
            patient_id: view.patient_id,
            visits: view.aggregates.into_iter().map(Into::into).collect(),
            demographics: FfiDemographics {
                age: view.demographics.age,
                gender: view.demographics.gender,
                sport: view.demographics.sport,
                bodyweight_kg: view.demographics.bodyweight_kg,
                injured_side: view.injured_side.as_str().to_string(),
            },
        }
    }
}
