//! Upload batches: admission, concurrent parsing, and the merge barrier.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use futures::executor::block_on;
use futures::future::join_all;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use super::filename::{FileIdentity, FilenameParser};
use super::rows::{ParsedRows, RowValidator};
use super::IngestError;

/// A file handed over by the host (file picker, drag and drop, disk).
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }

    /// Read a file from disk, keeping its base name.
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            file_name,
            contents,
        })
    }
}

/// A file that passed admission and was parsed.
#[derive(Debug, Clone)]
pub struct ParsedUpload {
    pub identity: FileIdentity,
    pub rows: ParsedRows,
}

/// Everything a batch produced, available only once every file settled.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub files_received: usize,
    /// Parsed files in upload order
    pub parsed: Vec<ParsedUpload>,
    /// Files excluded from the merge
    pub rejected: Vec<IngestError>,
}

/// Runs one upload batch against a view of the existing store.
pub struct BatchParser<'a> {
    filenames: &'a FilenameParser,
    validator: &'a RowValidator,
}

impl<'a> BatchParser<'a> {
    pub fn new(filenames: &'a FilenameParser, validator: &'a RowValidator) -> Self {
        Self {
            filenames,
            validator,
        }
    }

    /// Admit, parse and collect a batch.
    ///
    /// `has_visit` reports whether the store already holds a visit for a
    /// patient and date. Duplicates are detected from the filename before any
    /// parsing; within a batch the first file for a visit wins.
    pub fn run<F>(&self, files: Vec<UploadedFile>, has_visit: F) -> BatchOutcome
    where
        F: Fn(&str, NaiveDate) -> bool,
    {
        let batch_id = Uuid::new_v4();
        let span = info_span!("upload_batch", %batch_id);
        let _guard = span.enter();

        let files_received = files.len();
        let mut rejected = Vec::new();
        let mut claimed: HashSet<(String, NaiveDate)> = HashSet::new();
        let mut admitted = Vec::new();

        for file in files {
            match self.admit(&file, &has_visit, &claimed) {
                Ok(identity) => {
                    claimed.insert((identity.patient_id.clone(), identity.test_date));
                    admitted.push((identity, file));
                }
                Err(err) => {
                    warn!(file = %file.file_name, error = %err, "skipping file");
                    rejected.push(err);
                }
            }
        }

        let validator = self.validator;
        let tasks = admitted.into_iter().map(|(identity, file)| async move {
            let rows = validator.parse_csv(&identity, &file.contents);
            (identity, rows)
        });

        // Barrier: nothing is returned for merging until every task settled.
        let settled = block_on(join_all(tasks));

        let mut parsed = Vec::new();
        for (identity, result) in settled {
            match result {
                Ok(rows) => parsed.push(ParsedUpload { identity, rows }),
                Err(err) => {
                    warn!(error = %err, "file excluded from merge");
                    rejected.push(err);
                }
            }
        }

        info!(
            files_received,
            parsed = parsed.len(),
            rejected = rejected.len(),
            "batch settled"
        );

        BatchOutcome {
            batch_id,
            files_received,
            parsed,
            rejected,
        }
    }

    fn admit<F>(
        &self,
        file: &UploadedFile,
        has_visit: &F,
        claimed: &HashSet<(String, NaiveDate)>,
    ) -> Result<FileIdentity, IngestError>
    where
        F: Fn(&str, NaiveDate) -> bool,
    {
        let identity = self.filenames.parse(&file.file_name)?;
        let key = (identity.patient_id.clone(), identity.test_date);

        if has_visit(&identity.patient_id, identity.test_date) || claimed.contains(&key) {
            return Err(IngestError::DuplicateVisit {
                file_name: identity.file_name,
                patient_id: identity.patient_id,
                date: identity.test_date,
            });
        }
        Ok(identity)
    }
}
