//! Upload filename admission.
//!
//! Filenames follow `<Prefix>_<PatientId>_<YYYY-MM-DD>.csv`. The visit date in
//! the name is authoritative for every row in the file.

use std::path::Path;

use chrono::NaiveDate;

use super::{IngestError, IngestResult};

/// Identity of an upload derived from its filename alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub file_name: String,
    pub prefix: String,
    pub patient_id: String,
    pub test_date: NaiveDate,
}

/// Parses upload filenames.
#[derive(Debug, Clone, Default)]
pub struct FilenameParser {
    required_prefix: Option<String>,
}

impl FilenameParser {
    /// Create a parser. With a required prefix, other programs' exports are
    /// rejected as malformed.
    pub fn new(required_prefix: Option<&str>) -> Self {
        Self {
            required_prefix: required_prefix.map(str::to_lowercase),
        }
    }

    /// Derive patient id and visit date from a filename.
    pub fn parse(&self, file_name: &str) -> IngestResult<FileIdentity> {
        let malformed = || IngestError::MalformedFilename {
            file_name: file_name.to_string(),
        };

        let base = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(malformed)?;

        let stem = strip_csv_extension(base).ok_or_else(malformed)?;

        let (rest, date_part) = stem.rsplit_once('_').ok_or_else(malformed)?;
        let (prefix, patient_id) = rest.rsplit_once('_').ok_or_else(malformed)?;

        if prefix.is_empty() || patient_id.trim().is_empty() || !is_date_shaped(date_part) {
            return Err(malformed());
        }

        if let Some(required) = &self.required_prefix {
            let actual = prefix.rsplit('_').next().unwrap_or(prefix);
            if actual.to_lowercase() != *required {
                return Err(malformed());
            }
        }

        let test_date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| {
            IngestError::InvalidDate {
                file_name: file_name.to_string(),
                date: date_part.to_string(),
            }
        })?;

        Ok(FileIdentity {
            file_name: base.to_string(),
            prefix: prefix.to_string(),
            patient_id: patient_id.to_string(),
            test_date,
        })
    }
}

fn strip_csv_extension(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    ext.eq_ignore_ascii_case("csv").then_some(stem)
}

/// `NNNN-NN-NN`, without checking the calendar.
fn is_date_shaped(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}
