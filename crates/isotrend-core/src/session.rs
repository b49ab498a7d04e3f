//! Analysis session: the single owner of mutable application state.
//!
//! All mutations go through named operations (`admit_files`,
//! `toggle_visibility`, `select_patient`, `set_view_mode`, `clear_history`)
//! and each one is followed by a save. Reads are pure views over the store and
//! visibility map.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::{
    aggregate_visits, resolve_demographics, summary_table, trend_series, DemographicSummary,
    PositionSummary, TrendSeries,
};
use crate::config::PipelineConfig;
use crate::db::{Database, PersistedState};
use crate::ingest::{
    BatchParser, FilenameParser, IngestError, RowRejection, RowValidator, UploadedFile,
};
use crate::models::{date_key, Metric, Position, Side, ViewMode, VisitAggregate, VisitRecord};
use crate::store::{MergeOutcome, PatientStore, VisibilityMap};

/// State store problems. Never fatal; surfaced to the user as a notice.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Could not load saved analysis: {0}")]
    ReadFailure(String),

    #[error("Could not save analysis: {0}")]
    WriteFailure(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Unknown patient: {0}")]
    UnknownPatient(String),

    #[error("Patient {patient_id} has no visit on {date}")]
    UnknownVisitDate { patient_id: String, date: String },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Running count of what was skipped and why.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkipTally {
    pub malformed_filename: usize,
    pub invalid_date: usize,
    pub duplicate_visit: usize,
    pub parse_failure: usize,
    pub invalid_row: usize,
}

impl SkipTally {
    pub fn record(&mut self, error: &IngestError) {
        match error {
            IngestError::MalformedFilename { .. } => self.malformed_filename += 1,
            IngestError::InvalidDate { .. } => self.invalid_date += 1,
            IngestError::DuplicateVisit { .. } => self.duplicate_visit += 1,
            IngestError::ParseFailure { .. } => self.parse_failure += 1,
        }
    }

    /// Files skipped, excluding dropped rows.
    pub fn files(&self) -> usize {
        self.malformed_filename + self.invalid_date + self.duplicate_visit + self.parse_failure
    }
}

/// What one upload batch did.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub files_received: usize,
    /// Files merged into the store
    pub files_processed: usize,
    pub patients_added: Vec<String>,
    pub patients_updated: Vec<String>,
    pub skipped: SkipTally,
    pub rejections: Vec<IngestError>,
    pub row_rejections: Vec<RowRejection>,
    pub total_patients: usize,
    /// Set when the post-merge save failed
    pub persistence: Option<PersistenceError>,
}

/// One visit date of a patient with its visibility flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitDateEntry {
    pub date: NaiveDate,
    pub key: String,
    pub visible: bool,
}

/// Everything the renderer needs for one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientView {
    pub patient_id: String,
    /// Visible visits, oldest first; empty when every visit is hidden
    pub aggregates: Vec<VisitAggregate>,
    pub demographics: DemographicSummary,
    pub injured_side: Side,
}

pub struct AnalysisSession {
    config: PipelineConfig,
    filenames: FilenameParser,
    validator: RowValidator,
    store: PatientStore,
    visibility: VisibilityMap,
    selected_patient_id: Option<String>,
    view_mode: ViewMode,
    db: Database,
    notice: Option<PersistenceError>,
}

impl AnalysisSession {
    /// Empty session backed by `db`. Call [`AnalysisSession::load`] to restore
    /// saved state.
    pub fn new(db: Database, config: PipelineConfig) -> Self {
        Self {
            filenames: FilenameParser::new(config.required_prefix.as_deref()),
            validator: RowValidator::new(&config.position_prefixes),
            config,
            store: PatientStore::new(),
            visibility: VisibilityMap::new(),
            selected_patient_id: None,
            view_mode: ViewMode::default(),
            db,
            notice: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &PatientStore {
        &self.store
    }

    pub fn visibility(&self) -> &VisibilityMap {
        &self.visibility
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Restore saved state, returning how many stored records were dropped.
    ///
    /// On a read failure the in-memory state is reset to empty.
    pub fn load(&mut self) -> Result<usize, PersistenceError> {
        match self.db.load_state(&self.config.state_key) {
            Ok(Some(state)) => {
                let restored = state.restore();
                self.store = restored.store;
                self.visibility = restored.visibility;
                self.selected_patient_id = restored.selected_patient_id;
                self.view_mode = restored.view_mode;
                info!(
                    patients = self.store.patient_count(),
                    dropped = restored.dropped_records,
                    "restored analysis state"
                );
                Ok(restored.dropped_records)
            }
            Ok(None) => {
                self.reset();
                debug!("no saved analysis state");
                Ok(0)
            }
            Err(e) => {
                self.reset();
                warn!(error = %e, "saved analysis state unreadable, starting empty");
                Err(PersistenceError::ReadFailure(e.to_string()))
            }
        }
    }

    /// Write the current state.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let state = PersistedState::capture(
            &self.store,
            &self.visibility,
            self.selected_patient_id.as_deref(),
            self.view_mode,
        );
        self.db
            .save_state(&self.config.state_key, &state)
            .map_err(|e| PersistenceError::WriteFailure(e.to_string()))
    }

    /// Notice left by the last failed save, if any.
    pub fn take_persistence_notice(&mut self) -> Option<PersistenceError> {
        self.notice.take()
    }

    fn persist(&mut self) -> Option<PersistenceError> {
        match self.save() {
            Ok(()) => {
                self.notice = None;
                None
            }
            Err(e) => {
                warn!(error = %e, "keeping in-memory state after failed save");
                self.notice = Some(e.clone());
                Some(e)
            }
        }
    }

    fn reset(&mut self) {
        self.store.clear();
        self.visibility.clear();
        self.selected_patient_id = None;
        self.view_mode = ViewMode::default();
    }

    /// Forget every patient and remove the saved state.
    pub fn clear_history(&mut self) -> Result<(), PersistenceError> {
        self.reset();
        self.notice = None;
        info!("analysis history cleared");
        self.db
            .delete_state(&self.config.state_key)
            .map(|_| ())
            .map_err(|e| PersistenceError::WriteFailure(e.to_string()))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Ingest one upload batch.
    ///
    /// Every file is admitted and parsed before anything is merged; files are
    /// then merged in upload order and the state is saved once.
    pub fn admit_files(&mut self, files: Vec<UploadedFile>) -> BatchReport {
        let store = &self.store;
        let outcome = BatchParser::new(&self.filenames, &self.validator)
            .run(files, |patient_id, date| store.has_visit(patient_id, date));

        let mut skipped = SkipTally::default();
        for error in &outcome.rejected {
            skipped.record(error);
        }

        let mut patients_added = Vec::new();
        let mut patients_updated = Vec::new();
        let mut row_rejections = Vec::new();
        let files_processed = outcome.parsed.len();

        for upload in outcome.parsed {
            let patient_id = upload.identity.patient_id;
            skipped.invalid_row += upload.rows.rejected.len();
            row_rejections.extend(upload.rows.rejected);

            match self.store.merge(&patient_id, upload.rows.records) {
                MergeOutcome::NewPatient => patients_added.push(patient_id.clone()),
                MergeOutcome::ExistingPatient => {
                    if !patients_updated.contains(&patient_id) && !patients_added.contains(&patient_id)
                    {
                        patients_updated.push(patient_id.clone());
                    }
                }
            }
            self.visibility
                .observe(&patient_id, self.store.visit_dates(&patient_id));
        }

        info!(
            batch_id = %outcome.batch_id,
            processed = files_processed,
            added = patients_added.len(),
            updated = patients_updated.len(),
            skipped_files = skipped.files(),
            dropped_rows = skipped.invalid_row,
            "batch merged"
        );

        let persistence = if files_processed > 0 { self.persist() } else { None };

        BatchReport {
            batch_id: outcome.batch_id,
            files_received: outcome.files_received,
            files_processed,
            patients_added,
            patients_updated,
            skipped,
            rejections: outcome.rejected,
            row_rejections,
            total_patients: self.store.patient_count(),
            persistence,
        }
    }

    /// Ingest one batch of files read from disk.
    ///
    /// An unreadable path is reported as a `ParseFailure` for that file; the
    /// rest of the batch is admitted as usual.
    pub fn admit_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> BatchReport {
        let mut files = Vec::new();
        let mut unreadable = Vec::new();

        for path in paths {
            let path = path.as_ref();
            match UploadedFile::from_path(path) {
                Ok(file) => files.push(file),
                Err(e) => {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    warn!(file = %file_name, error = %e, "could not read upload");
                    unreadable.push(IngestError::ParseFailure {
                        file_name,
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut report = self.admit_files(files);
        report.files_received += unreadable.len();
        for error in &unreadable {
            report.skipped.record(error);
        }
        unreadable.append(&mut report.rejections);
        report.rejections = unreadable;
        report
    }

    /// Flip one visit's visibility, returning the new flag.
    pub fn toggle_visibility(&mut self, patient_id: &str, date: &str) -> SessionResult<bool> {
        self.require_patient(patient_id)?;
        let visible = self
            .visibility
            .toggle(patient_id, date)
            .ok_or_else(|| SessionError::UnknownVisitDate {
                patient_id: patient_id.to_string(),
                date: date.to_string(),
            })?;
        debug!(patient_id, date, visible, "visibility toggled");
        self.persist();
        Ok(visible)
    }

    /// Set one visit's visibility.
    pub fn set_visibility(&mut self, patient_id: &str, date: &str, visible: bool) -> SessionResult<()> {
        self.require_patient(patient_id)?;
        if !self.visibility.set_visible(patient_id, date, visible) {
            return Err(SessionError::UnknownVisitDate {
                patient_id: patient_id.to_string(),
                date: date.to_string(),
            });
        }
        debug!(patient_id, date, visible, "visibility set");
        self.persist();
        Ok(())
    }

    /// Make `patient_id` the selected patient.
    pub fn select_patient(&mut self, patient_id: &str) -> SessionResult<()> {
        self.require_patient(patient_id)?;
        self.visibility
            .observe(patient_id, self.store.visit_dates(patient_id));
        self.selected_patient_id = Some(patient_id.to_string());
        debug!(patient_id, "patient selected");
        self.persist();
        Ok(())
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        if self.view_mode != mode {
            self.view_mode = mode;
            self.persist();
        }
    }

    fn require_patient(&self, patient_id: &str) -> SessionResult<()> {
        if self.store.contains(patient_id) {
            Ok(())
        } else {
            Err(SessionError::UnknownPatient(patient_id.to_string()))
        }
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn selected_patient_id(&self) -> Option<&str> {
        self.selected_patient_id.as_deref()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    /// Patient ids in natural order.
    pub fn patient_ids(&self) -> &[String] {
        self.store.patient_ids()
    }

    pub fn search_patients(&self, query: &str) -> Vec<String> {
        self.store.search(query)
    }

    /// Unique visit dates with their flags; `None` for an unknown patient.
    pub fn visit_dates(&self, patient_id: &str) -> Option<Vec<VisitDateEntry>> {
        self.store.records(patient_id)?;
        Some(
            self.store
                .visit_dates(patient_id)
                .into_iter()
                .map(|date| {
                    let key = date_key(date);
                    let visible = self.visibility.get(patient_id, &key).unwrap_or(true);
                    VisitDateEntry { date, key, visible }
                })
                .collect(),
        )
    }

    /// Visible records in chronological order; `None` for an unknown patient,
    /// an empty list when every visit is hidden.
    pub fn filtered_records(&self, patient_id: &str) -> Option<Vec<&VisitRecord>> {
        let records = self.store.records(patient_id)?;
        Some(self.visibility.filter(patient_id, records))
    }

    /// Aggregates plus demographics for one patient.
    pub fn patient_view(&self, patient_id: &str) -> Option<PatientView> {
        let records = self.store.records(patient_id)?;
        let visible = self.visibility.filter(patient_id, records);
        let demographics = resolve_demographics(records);

        Some(PatientView {
            patient_id: patient_id.to_string(),
            aggregates: aggregate_visits(visible),
            injured_side: demographics.injured_side(),
            demographics,
        })
    }

    /// View of the selected patient, if one is selected.
    pub fn selected_view(&self) -> Option<PatientView> {
        self.patient_view(self.selected_patient_id.as_deref()?)
    }

    pub fn summary_table(&self, patient_id: &str) -> Option<Vec<PositionSummary>> {
        self.patient_view(patient_id)
            .map(|view| summary_table(&view.aggregates))
    }

    /// One chart's series in the current view mode.
    pub fn trend_series(
        &self,
        patient_id: &str,
        position: Position,
        metric: Metric,
    ) -> Option<TrendSeries> {
        let view = self.patient_view(patient_id)?;
        Some(trend_series(
            &view.aggregates,
            position,
            metric,
            self.view_mode,
            view.injured_side,
            &self.config,
        ))
    }
}
