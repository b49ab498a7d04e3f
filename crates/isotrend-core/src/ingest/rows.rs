//! CSV decoding and per-row validation.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::filename::FileIdentity;
use super::{IngestError, IngestResult};
use crate::models::{Demographics, Metric, Position, Side, VisitRecord};

/// Why a row was dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("missing Metric")]
    MissingMetric,

    #[error("missing Position")]
    MissingPosition,

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("invalid position '{0}'")]
    InvalidPosition(String),

    #[error("unreadable row: {0}")]
    Unreadable(String),
}

/// A dropped row, reported alongside the admitted file.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRejection {
    pub file_name: String,
    /// 1-based line number in the file (header is line 1)
    pub line: u64,
    pub reason: RowError,
}

/// Raw row as exported by the force plate software. Everything is text until
/// validated; unknown columns (including any date column) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    #[serde(rename = "Metric", default)]
    pub metric: Option<String>,
    #[serde(rename = "Position", default)]
    pub position: Option<String>,
    #[serde(rename = "Left Value", default)]
    pub left_value: Option<String>,
    #[serde(rename = "Right Value", default)]
    pub right_value: Option<String>,
    #[serde(rename = "Bodyweight (kg)", default)]
    pub bodyweight: Option<String>,
    #[serde(rename = "Age", default)]
    pub age: Option<String>,
    #[serde(rename = "Gender", default)]
    pub gender: Option<String>,
    #[serde(rename = "Sport", default)]
    pub sport: Option<String>,
    #[serde(rename = "Injured Side", default)]
    pub injured_side: Option<String>,
}

/// Rows surviving validation for one file.
#[derive(Debug, Clone, Default)]
pub struct ParsedRows {
    pub records: Vec<VisitRecord>,
    pub rejected: Vec<RowRejection>,
}

const REQUIRED_COLUMNS: [&str; 2] = ["Metric", "Position"];

/// Turns raw rows into [`VisitRecord`]s.
#[derive(Debug, Clone)]
pub struct RowValidator {
    /// Lowercased decorative prefixes for the Position column
    position_prefixes: Vec<String>,
}

impl Default for RowValidator {
    fn default() -> Self {
        Self::new(&["ASH Test Position".to_string()])
    }
}

impl RowValidator {
    pub fn new(position_prefixes: &[String]) -> Self {
        Self {
            position_prefixes: position_prefixes.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Decode a whole CSV file. Header problems fail the file; bad rows are
    /// dropped individually.
    pub fn parse_csv(&self, identity: &FileIdentity, contents: &[u8]) -> IngestResult<ParsedRows> {
        let parse_failure = |message: String| IngestError::ParseFailure {
            file_name: identity.file_name.clone(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(contents);

        let headers = reader
            .headers()
            .map_err(|e| parse_failure(e.to_string()))?
            .clone();

        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(parse_failure(format!("missing '{}' column", column)));
            }
        }

        let mut parsed = ParsedRows::default();
        // Rows are decoded lossily: non-UTF-8 bytes become U+FFFD.
        for result in reader.byte_records() {
            let bytes = result.map_err(|e| parse_failure(e.to_string()))?;
            let line = bytes.position().map(|p| p.line()).unwrap_or_default();
            let record = csv::StringRecord::from_byte_record_lossy(bytes);

            let outcome = record
                .deserialize::<RawRow>(Some(&headers))
                .map_err(|e| RowError::Unreadable(e.to_string()))
                .and_then(|raw| self.validate(raw, identity));

            match outcome {
                Ok(visit) => parsed.records.push(visit),
                Err(reason) => {
                    warn!(file = %identity.file_name, line, %reason, "dropping row");
                    parsed.rejected.push(RowRejection {
                        file_name: identity.file_name.clone(),
                        line,
                        reason,
                    });
                }
            }
        }

        debug!(
            file = %identity.file_name,
            admitted = parsed.records.len(),
            dropped = parsed.rejected.len(),
            "parsed upload"
        );
        Ok(parsed)
    }

    /// Validate one raw row against the file-derived identity.
    pub fn validate(&self, raw: RawRow, identity: &FileIdentity) -> Result<VisitRecord, RowError> {
        let metric_text = non_empty(raw.metric).ok_or(RowError::MissingMetric)?;
        let position_text = non_empty(raw.position).ok_or(RowError::MissingPosition)?;

        let metric =
            Metric::from_label(&metric_text).ok_or(RowError::UnknownMetric(metric_text))?;
        let position = self
            .clean_position(&position_text)
            .ok_or(RowError::InvalidPosition(position_text))?;

        Ok(VisitRecord {
            metric,
            position,
            left_value: coerce_number(raw.left_value.as_deref()),
            right_value: coerce_number(raw.right_value.as_deref()),
            bodyweight_kg: coerce_number(raw.bodyweight.as_deref()),
            test_date: identity.test_date,
            source_file: identity.file_name.clone(),
            demographics: Demographics {
                age: coerce_number(raw.age.as_deref())
                    .filter(|age| *age >= 0.0)
                    .map(|age| age.round() as u32),
                gender: non_empty(raw.gender),
                sport: non_empty(raw.sport),
                injured_side: raw.injured_side.as_deref().and_then(Side::parse),
            },
        })
    }

    /// Strip decorative text (e.g. "ASH Test Position I") down to the code.
    pub fn clean_position(&self, text: &str) -> Option<Position> {
        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();

        let stripped = self
            .position_prefixes
            .iter()
            .find(|prefix| lower.starts_with(prefix.as_str()))
            .and_then(|prefix| trimmed.get(prefix.len()..))
            .unwrap_or(trimmed)
            .trim();

        Position::from_code(stripped).or_else(|| {
            stripped
                .split_whitespace()
                .last()
                .and_then(Position::from_code)
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Missing or unparseable numbers are absent, never zero.
pub fn coerce_number(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
