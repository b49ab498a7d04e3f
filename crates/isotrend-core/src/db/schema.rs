//! SQLite schema definition.

/// Complete database schema for isotrend.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Analysis State (one JSON blob per key)
-- ============================================================================

CREATE TABLE IF NOT EXISTS analysis_state (
    state_key TEXT PRIMARY KEY,
    payload TEXT NOT NULL,                       -- JSON: patients, patientIds, selectedPatientId, viewMode, visibility
    checksum TEXT NOT NULL,                      -- hex SHA-256 of payload
    saved_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
