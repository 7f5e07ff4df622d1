//! Configuration types for the cycler pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::core::transforms::TimeUnit;
use crate::processors::sequences::{self, TimeMerge};
use crate::processors::statistics::StatisticsSpec;

/// Source file discovery and workbook assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// File extensions picked up when scanning a directory
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Field delimiter of delimited source files
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Substring identifying data sheets
    #[serde(default = "default_data_sheet_pattern")]
    pub data_sheet_pattern: String,

    /// Substring identifying temperature sheets
    #[serde(default = "default_temp_sheet_pattern")]
    pub temp_sheet_pattern: String,

    /// Substring identifying temperature columns inside temperature sheets
    #[serde(default = "default_temp_column_pattern")]
    pub temp_column_pattern: String,
}

fn default_extensions() -> Vec<String> {
    vec!["csv".to_string(), "xlsx".to_string(), "xls".to_string()]
}

fn default_delimiter() -> char {
    ','
}

fn default_data_sheet_pattern() -> String {
    "Detail_".to_string()
}

fn default_temp_sheet_pattern() -> String {
    "DetailTemp_".to_string()
}

fn default_temp_column_pattern() -> String {
    "T(°C)".to_string()
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            delimiter: default_delimiter(),
            data_sheet_pattern: default_data_sheet_pattern(),
            temp_sheet_pattern: default_temp_sheet_pattern(),
            temp_column_pattern: default_temp_column_pattern(),
        }
    }
}

/// Column renaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameConfig {
    /// Apply the built-in vendor renames
    #[serde(default = "default_true")]
    pub use_defaults: bool,

    /// Extra renames; entries override the built-in ones
    #[serde(default)]
    pub mapping: HashMap<String, String>,

    /// Rename the loaded table in place rather than working on a copy
    #[serde(default = "default_true")]
    pub in_place: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            use_defaults: true,
            mapping: HashMap::new(),
            in_place: true,
        }
    }
}

/// Time and datetime normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Duration column converted to elapsed seconds
    #[serde(default = "default_time_column")]
    pub time_column: Option<String>,

    /// Unit of a numeric duration column
    #[serde(default)]
    pub time_unit: TimeUnit,

    /// Timestamp column parsed to datetimes
    #[serde(default = "default_datetime_column")]
    pub datetime_column: Option<String>,

    /// Explicit chrono format for the timestamp column
    #[serde(default)]
    pub datetime_format: Option<String>,
}

fn default_time_column() -> Option<String> {
    Some("Time".to_string())
}

fn default_datetime_column() -> Option<String> {
    Some("Datetime".to_string())
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            time_column: default_time_column(),
            time_unit: TimeUnit::Seconds,
            datetime_column: default_datetime_column(),
            datetime_format: None,
        }
    }
}

/// Per-step aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Column whose values label the groups
    #[serde(default = "default_step_column")]
    pub group_column: String,

    /// Group by change count of this column instead of `group_column`
    #[serde(default)]
    pub change_column: Option<String>,

    /// Column -> method(s) to compute
    #[serde(default)]
    pub spec: StatisticsSpec,
}

fn default_step_column() -> String {
    "Step".to_string()
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            group_column: default_step_column(),
            change_column: None,
            spec: StatisticsSpec::default(),
        }
    }
}

/// Sign-pattern cycle detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Sign pattern over `'0'`, `'+'`, `'-'`; detection is skipped when unset
    #[serde(default)]
    pub pattern: Option<String>,

    /// Statistics column the pattern is matched against
    #[serde(default = "default_detection_column")]
    pub column: String,
}

fn default_detection_column() -> String {
    "I_mean".to_string()
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            pattern: None,
            column: default_detection_column(),
        }
    }
}

/// Sequence extraction and time stitching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Explicit step sequences; take precedence over detected windows
    #[serde(default)]
    pub sequences: Option<Vec<Vec<i64>>>,

    /// Gap in seconds, `remove_first`, `remove_last`, or null for no merging
    #[serde(default = "default_time_merge", deserialize_with = "sequences::deserialize_optional")]
    pub time_merge: Option<TimeMerge>,

    #[serde(default = "default_step_column")]
    pub group_column: String,

    #[serde(default = "default_extraction_time_column")]
    pub time_column: String,
}

fn default_time_merge() -> Option<TimeMerge> {
    Some(TimeMerge::RemoveFirst)
}

fn default_extraction_time_column() -> String {
    "Time".to_string()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sequences: None,
            time_merge: default_time_merge(),
            group_column: default_step_column(),
            time_column: default_extraction_time_column(),
        }
    }
}

/// State-of-health column appended to the exported statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Statistics column (e.g. `Q_max`) to normalize; disabled when unset
    #[serde(default)]
    pub column: Option<String>,

    /// Integer group key used as the reference; the first group when unset
    #[serde(default)]
    pub baseline: Option<i64>,
}

/// Delimited-file writer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Emit the row index as the first column
    #[serde(default = "default_true")]
    pub include_index: bool,

    #[serde(default = "default_index_label")]
    pub index_label: String,

    #[serde(default = "default_true")]
    pub include_header: bool,

    /// Column subset (and order) to write; all columns when unset
    #[serde(default)]
    pub columns: Option<Vec<String>>,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Output encoding; only UTF-8 is supported
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Fixed number of decimals for floats
    #[serde(default)]
    pub float_precision: Option<usize>,

    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
}

fn default_index_label() -> String {
    "Index".to_string()
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_datetime_format() -> String {
    crate::core::table::DATETIME_DISPLAY_FORMAT.to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include_index: true,
            index_label: default_index_label(),
            include_header: true,
            columns: None,
            delimiter: default_delimiter(),
            encoding: default_encoding(),
            float_precision: None,
            datetime_format: default_datetime_format(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub rename: RenameConfig,

    #[serde(default)]
    pub time: TimeConfig,

    #[serde(default)]
    pub statistics: StatisticsConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::statistics::StatMethod;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.statistics.group_column, "Step");
        assert_eq!(config.detection.column, "I_mean");
        assert_eq!(config.extraction.time_merge, Some(TimeMerge::RemoveFirst));
        assert!(config.export.include_index);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
statistics:
  change_column: Step Type
  spec:
    I: [mean, std]
    Index: min
detection:
  pattern: "0-0+0"
extraction:
  sequences: [[1, 2, 3]]
  time_merge: 0.5
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.statistics.group_column, "Step");
        assert_eq!(config.statistics.change_column.as_deref(), Some("Step Type"));
        let entries: Vec<_> = config.statistics.spec.entries().collect();
        assert_eq!(entries[0].0, "I");
        assert_eq!(entries[0].1, &[StatMethod::Mean, StatMethod::Std]);
        assert_eq!(entries[1].1, &[StatMethod::Min]);
        assert_eq!(config.detection.pattern.as_deref(), Some("0-0+0"));
        assert_eq!(config.extraction.time_merge, Some(TimeMerge::Gap(0.5)));
        assert_eq!(config.time.time_unit, TimeUnit::Seconds);
        assert!(config.health.column.is_none());
    }

    #[test]
    fn test_null_time_merge_disables_merging() {
        let config: PipelineConfig =
            serde_yaml::from_str("extraction:\n  time_merge: null\n").unwrap();
        assert_eq!(config.extraction.time_merge, None);
    }

    #[test]
    fn test_none_time_merge_matches_cli() {
        let config: PipelineConfig =
            serde_yaml::from_str("extraction:\n  time_merge: none\n").unwrap();
        assert_eq!(config.extraction.time_merge, None);

        let config: PipelineConfig =
            serde_yaml::from_str("extraction:\n  time_merge: remove_last\n").unwrap();
        assert_eq!(config.extraction.time_merge, Some(TimeMerge::RemoveLast));
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let result: Result<PipelineConfig, _> =
            serde_yaml::from_str("statistics:\n  spec:\n    I: median\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_yaml_round_trip_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.yaml");

        let mut config = PipelineConfig::default();
        config.detection.pattern = Some("0-+".to_string());
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.detection.pattern.as_deref(), Some("0-+"));
        assert_eq!(loaded.statistics.spec, config.statistics.spec);
    }
}
