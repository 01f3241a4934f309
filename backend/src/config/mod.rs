//! Run configuration.
//!
//! A [`RunConfig`] is built once at startup (defaults, then an optional JSON
//! file, then CLI overrides) and passed by reference to every stage.
//!
//! ```text
//! RunConfig
//! ├── month     auto | all | YYYY-MM
//! ├── layout    header row, sub-label row, identifier/date/description rules
//! ├── series    5 x SeriesDef (suffix, label, column rule)
//! ├── metadata  provider defaults for the META sheet
//! ├── dates     input formats, output format
//! ├── output    directory, prefix, archive, strict layout
//! └── fetch     index page, download/extract dirs, retries
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{MetricKind, MonthKey};

/// Environment variable pointing at a JSON config file.
pub const CONFIG_ENV: &str = "ITBI_CONFIG";

/// Environment variable overriding the output directory.
pub const OUTPUT_DIR_ENV: &str = "ITBI_OUTPUT_DIR";

pub const DEFAULT_INDEX_URL: &str =
    "https://www.bancaditalia.it/compiti/operazioni-mef/risultati-aste/index.html";

// =============================================================================
// Month Selection
// =============================================================================

/// Which month(s) of the source file to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonthSelection {
    /// Latest month present in the data.
    #[default]
    Auto,
    /// Exactly this month; absent months yield an empty result.
    Specific(MonthKey),
    /// Every month, independently.
    All,
}

impl FromStr for MonthSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(MonthSelection::Auto),
            "all" => Ok(MonthSelection::All),
            other => other
                .parse::<MonthKey>()
                .map(MonthSelection::Specific)
                .map_err(|_| ConfigError::InvalidMonth(s.to_string())),
        }
    }
}

impl fmt::Display for MonthSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonthSelection::Auto => f.write_str("auto"),
            MonthSelection::All => f.write_str("all"),
            MonthSelection::Specific(key) => write!(f, "{}", key),
        }
    }
}

impl Serialize for MonthSelection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthSelection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Column Rules
// =============================================================================

/// How to locate one canonical column in the header row.
///
/// Tried in order: `exact` (case-sensitive), then `contains` (case-insensitive
/// substring, rejected if any `excludes` word is present), then `position`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRule {
    pub exact: Vec<String>,
    pub contains: Vec<String>,
    pub excludes: Vec<String>,
    pub position: Option<usize>,
}

impl ColumnRule {
    fn new(exact: &[&str], contains: &[&str], excludes: &[&str], position: usize) -> Self {
        Self {
            exact: exact.iter().map(|s| s.to_string()).collect(),
            contains: contains.iter().map(|s| s.to_string()).collect(),
            excludes: excludes.iter().map(|s| s.to_string()).collect(),
            position: Some(position),
        }
    }
}

// =============================================================================
// Source Layout
// =============================================================================

/// Shape of the published spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceLayout {
    /// 0-based row holding column names.
    pub header_row: usize,
    /// 0-based row holding metric sub-labels, used for the layout cross-check.
    pub sublabel_row: Option<usize>,
    /// Rows between the header and the first data row.
    pub skip_after_header: usize,
    pub identifier: ColumnRule,
    pub date: ColumnRule,
    pub description: ColumnRule,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            header_row: 1,
            sublabel_row: Some(2),
            skip_after_header: 3,
            identifier: ColumnRule::new(&["ISIN"], &["isin"], &[], 2),
            date: ColumnRule::new(&["data asta"], &["data", "date"], &[], 0),
            description: ColumnRule::new(&["descrizione"], &["descrizione", "description"], &[], 5),
        }
    }
}

impl SourceLayout {
    /// 0-based index of the first data row.
    pub fn first_data_row(&self) -> usize {
        self.header_row + 1 + self.skip_after_header
    }
}

// =============================================================================
// Series Definitions
// =============================================================================

/// One published series: where its values come from and how it is named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDef {
    pub kind: MetricKind,
    /// Appended to the identifier to form the CODE, e.g. `OFR.ITBI.M`.
    pub suffix: String,
    /// Human label used in DESCRIPTION, e.g. `amounts: offered`.
    pub label: String,
    pub column: ColumnRule,
}

impl SeriesDef {
    fn new(kind: MetricKind, suffix: &str, label: &str, column: ColumnRule) -> Self {
        Self {
            kind,
            suffix: suffix.to_string(),
            label: label.to_string(),
            column,
        }
    }
}

pub fn default_series() -> Vec<SeriesDef> {
    const NOT_MIN_MAX: &[&str] = &["minim", "massim", "maximum"];
    vec![
        SeriesDef::new(
            MetricKind::Offered,
            "OFR.ITBI.M",
            "amounts: offered",
            ColumnRule::new(&["offerto"], &["offerto", "offered"], NOT_MIN_MAX, 9),
        ),
        SeriesDef::new(
            MetricKind::MinOffered,
            "MIN.ITBI.M",
            "amounts: minimum offered",
            ColumnRule::new(&["minimo offerto"], &["minimo offerto", "minimum offered"], &[], 10),
        ),
        SeriesDef::new(
            MetricKind::MaxOffered,
            "MAX.ITBI.M",
            "amounts: maximum offered",
            ColumnRule::new(&["massimo offerto"], &["massimo offerto", "maximum offered"], &[], 11),
        ),
        SeriesDef::new(
            MetricKind::Required,
            "REQ.ITBI.M",
            "amounts: required",
            ColumnRule::new(&["richiesto"], &["richiesto", "required"], &[], 12),
        ),
        SeriesDef::new(
            MetricKind::Assigned,
            "ASGN.ITBI.M",
            "amounts: assigned",
            ColumnRule::new(&["assegnato"], &["assegnato", "assigned"], &[], 13),
        ),
    ]
}

// =============================================================================
// Metadata Defaults
// =============================================================================

/// Fixed provider fields copied into every META row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataDefaults {
    pub frequency: String,
    pub multiplier: String,
    pub aggregation_type: String,
    pub unit_type: String,
    pub data_type: String,
    pub data_unit: String,
    pub seasonally_adjusted: String,
    pub annualized: String,
    pub provider_measure_url: String,
    pub provider: String,
    pub source: String,
    pub source_description: String,
    pub country: String,
    pub dataset: String,
}

impl Default for MetadataDefaults {
    fn default() -> Self {
        Self {
            frequency: "M".into(),
            multiplier: "6.0".into(),
            aggregation_type: "END_OF_PERIOD".into(),
            unit_type: "LEVEL".into(),
            data_type: "CURRENCY".into(),
            data_unit: "EUR".into(),
            seasonally_adjusted: "NSA".into(),
            annualized: String::new(),
            provider_measure_url: DEFAULT_INDEX_URL.into(),
            provider: "AfricaAI".into(),
            source: "BdIt".into(),
            source_description: "Banca d'Italia".into(),
            country: "ITA".into(),
            dataset: "ITBI".into(),
        }
    }
}

// =============================================================================
// Date Formats
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateFormats {
    /// chrono formats tried in order on text date cells (day-first).
    pub input: Vec<String>,
    /// Format of the date column in DATA sheets.
    pub output: String,
}

impl Default for DateFormats {
    fn default() -> Self {
        Self {
            input: ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output: "%Y-%m-%d".into(),
        }
    }
}

// =============================================================================
// Output / Fetch Options
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    pub dir: PathBuf,
    /// Leading token of every artifact name.
    pub prefix: String,
    /// Bundle DATA and META into a zip per identifier.
    pub archive: bool,
    /// Keep the two .xls files next to the archive.
    pub keep_loose_files: bool,
    /// Write into `dir/<YYYYMMDD_HHMMSS>` instead of `dir`.
    pub stamp_dir: bool,
    /// Fail when a positionally resolved metric has an unexpected sub-label.
    pub strict_layout: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./output"),
            prefix: "ITBI".into(),
            archive: true,
            keep_loose_files: true,
            stamp_dir: false,
            strict_layout: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub index_url: String,
    /// Regex for the preferred archive link.
    pub archive_pattern: String,
    pub download_dir: PathBuf,
    pub extract_dir: PathBuf,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.into(),
            archive_pattern: r"aste_corrente.*\.zip".into(),
            download_dir: PathBuf::from("./downloads"),
            extract_dir: PathBuf::from("./extracted"),
            timeout_secs: 60,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

// =============================================================================
// RunConfig
// =============================================================================

/// Immutable configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub month: MonthSelection,
    pub layout: SourceLayout,
    pub series: Vec<SeriesDef>,
    pub metadata: MetadataDefaults,
    pub dates: DateFormats,
    pub output: OutputOptions,
    pub fetch: FetchOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            month: MonthSelection::Auto,
            layout: SourceLayout::default(),
            series: default_series(),
            metadata: MetadataDefaults::default(),
            dates: DateFormats::default(),
            output: OutputOptions::default(),
            fetch: FetchOptions::default(),
        }
    }
}

impl RunConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Defaults, overlaid by `explicit` or else the file named in `ITBI_CONFIG`,
    /// then `ITBI_OUTPUT_DIR`.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let from_env = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        if let Ok(dir) = env::var(OUTPUT_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.output.dir = PathBuf::from(dir);
            }
        }
        Ok(config)
    }

    /// Every metric kind must be defined exactly once.
    pub fn validate(&self) -> ConfigResult<()> {
        for kind in MetricKind::ALL {
            let count = self.series.iter().filter(|s| s.kind == kind).count();
            if count != 1 {
                return Err(ConfigError::Invalid(format!(
                    "series '{}' defined {} times (expected once)",
                    kind, count
                )));
            }
        }
        if self.output.prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("output prefix is empty".into()));
        }
        if self.dates.output.trim().is_empty() {
            return Err(ConfigError::Invalid("output date format is empty".into()));
        }
        Ok(())
    }

    /// Series definition for `kind`. Validation guarantees presence.
    pub fn series_def(&self, kind: MetricKind) -> Option<&SeriesDef> {
        self.series.iter().find(|s| s.kind == kind)
    }

    /// Series definitions in output order, regardless of their order in the file.
    pub fn ordered_series(&self) -> Vec<&SeriesDef> {
        MetricKind::ALL
            .iter()
            .filter_map(|kind| self.series_def(*kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_selection_parse() {
        assert_eq!("auto".parse::<MonthSelection>().unwrap(), MonthSelection::Auto);
        assert_eq!("ALL".parse::<MonthSelection>().unwrap(), MonthSelection::All);
        assert_eq!(
            "2025-01".parse::<MonthSelection>().unwrap(),
            MonthSelection::Specific(MonthKey::new(2025, 1).unwrap())
        );
        assert!("january".parse::<MonthSelection>().is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        config.validate().unwrap();
        assert_eq!(config.layout.first_data_row(), 5);
        assert_eq!(config.metadata.frequency, "M");
        assert_eq!(config.metadata.multiplier, "6.0");

        let suffixes: Vec<&str> = config.ordered_series().iter().map(|s| s.suffix.as_str()).collect();
        assert_eq!(
            suffixes,
            vec!["OFR.ITBI.M", "MIN.ITBI.M", "MAX.ITBI.M", "REQ.ITBI.M", "ASGN.ITBI.M"]
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RunConfig::from_json(r#"{ "month": "2025-03", "output": { "prefix": "BTP" } }"#).unwrap();
        assert_eq!(config.month, MonthSelection::Specific(MonthKey::new(2025, 3).unwrap()));
        assert_eq!(config.output.prefix, "BTP");
        assert!(config.output.archive);
        assert_eq!(config.series.len(), 5);
    }

    #[test]
    fn test_duplicate_series_rejected() {
        let mut config = RunConfig::default();
        config.series[1].kind = MetricKind::Offered;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("offered"));
    }

    #[test]
    fn test_from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("itbi.json");
        let mut config = RunConfig::default();
        config.month = MonthSelection::All;
        config.output.strict_layout = true;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = RunConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = RunConfig::from_file(Path::new("/nonexistent/itbi.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/itbi.json"));
    }
}
