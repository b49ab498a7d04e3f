//! Upload ingestion.
//!
//! Pipeline: filename admission → concurrent CSV parse → row validation →
//! batch barrier (merge happens in the session afterwards).

mod batch;
mod filename;
mod rows;

pub use batch::*;
pub use filename::*;
pub use rows::*;

use chrono::NaiveDate;
use thiserror::Error;

/// File-level ingestion errors. None of them stop the rest of a batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Malformed filename: {file_name}")]
    MalformedFilename { file_name: String },

    #[error("Invalid date '{date}' in filename: {file_name}")]
    InvalidDate { file_name: String, date: String },

    #[error("Duplicate visit for patient {patient_id} on {date}: {file_name}")]
    DuplicateVisit {
        file_name: String,
        patient_id: String,
        date: NaiveDate,
    },

    #[error("Could not parse {file_name}: {message}")]
    ParseFailure { file_name: String, message: String },
}

impl IngestError {
    /// Name of the file the error is about.
    pub fn file_name(&self) -> &str {
        match self {
            IngestError::MalformedFilename { file_name }
            | IngestError::InvalidDate { file_name, .. }
            | IngestError::DuplicateVisit { file_name, .. }
            | IngestError::ParseFailure { file_name, .. } => file_name,
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
