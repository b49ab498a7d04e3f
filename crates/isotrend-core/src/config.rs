//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::analysis::NormativeTable;

/// Tunables for ingestion, analysis and persistence.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use isotrend_core::PipelineConfig;
///
/// let config = PipelineConfig::from_json(r#"{ "required_prefix": "ASH" }"#).unwrap();
/// assert_eq!(config.required_prefix.as_deref(), Some("ASH"));
/// assert_eq!(config.state_key, "analysisAppData");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Program prefix an upload filename must start with (any prefix when unset)
    pub required_prefix: Option<String>,
    /// Decorative text stripped from the front of the `Position` column
    pub position_prefixes: Vec<String>,
    /// Key of the persisted state blob
    pub state_key: String,
    /// Top padding factor for scatter chart axes
    pub scatter_top_padding: f64,
    /// Top padding factor for bar chart axes (leaves room for labels)
    pub bar_top_padding: f64,
    /// Asymmetry percent below which a visit is flagged
    pub asymmetry_alert_percent: f64,
    /// Normalized-force bands per position
    pub norms: NormativeTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            required_prefix: None,
            position_prefixes: vec!["ASH Test Position".into()],
            state_key: "analysisAppData".into(),
            scatter_top_padding: 0.1,
            bar_top_padding: 0.25,
            asymmetry_alert_percent: -10.0,
            norms: NormativeTable::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;

    #[test]
    fn test_empty_document_is_default() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = PipelineConfig::from_json(
            r#"{ "bar_top_padding": 0.4, "position_prefixes": ["Stance"] }"#,
        )
        .unwrap();
        assert_eq!(config.bar_top_padding, 0.4);
        assert_eq!(config.position_prefixes, vec!["Stance".to_string()]);
        assert_eq!(config.scatter_top_padding, 0.1);
        assert_eq!(config.norms.for_position(Position::I).poor_max, 1.47);
    }
}
