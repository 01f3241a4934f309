//! Error types for the ITBI extraction pipeline.
//!
//! One enum per stage, all convertible into [`PipelineError`]:
//!
//! - [`SheetError`] - opening and reading the source workbook
//! - [`ClassifyError`] - column detection on the raw table
//! - [`OutputError`] - encoding and writing DATA/META/zip artifacts
//! - [`FetchError`] - downloading and unpacking the published archive
//! - [`ConfigError`] - loading the run configuration
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Sheet Reading Errors
// =============================================================================

/// Errors while opening or reading the source spreadsheet.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// calamine could not parse the workbook.
    #[error("Failed to open workbook: {0}")]
    Workbook(#[from] calamine::Error),

    /// Workbook has no worksheet.
    #[error("Workbook has no worksheets")]
    NoSheets,

    /// Header row is beyond the end of the sheet.
    #[error("Header row {row} not found (sheet has {height} rows)")]
    MissingHeader { row: usize, height: usize },
}

// =============================================================================
// Classification Errors
// =============================================================================

/// Errors while resolving canonical columns.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// A required column could not be located, even positionally.
    #[error("No {field} column found ({columns} columns available)")]
    MissingColumn { field: String, columns: usize },

    /// A positionally resolved column carries an unexpected sub-label.
    #[error("Column {index} resolved as '{field}' but is labelled '{found}'")]
    LayoutMismatch {
        field: String,
        index: usize,
        found: String,
    },
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors while materializing output artifacts.
#[derive(Debug, Error)]
pub enum OutputError {
    /// IO error.
    #[error("Output IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// In-memory workbook container could not be built.
    #[error("Workbook encoding failed: {0}")]
    Encode(#[source] std::io::Error),

    /// Archive could not be written or read.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A cell string does not fit in a BIFF8 record.
    #[error("String of {0} characters is too long for a cell")]
    StringTooLong(usize),

    /// Grid is larger than the legacy format allows.
    #[error("Sheet too large: {rows} rows x {cols} columns")]
    SheetTooLarge { rows: usize, cols: usize },

    /// Distinct identifiers sanitize to the same artifact name.
    #[error("Identifiers {identifiers:?} would share artifact name {name}")]
    NameCollision {
        name: String,
        identifiers: Vec<String>,
    },
}

impl OutputError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// =============================================================================
// Fetch Errors
// =============================================================================

/// Errors from downloading or unpacking the source archive.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Index page has no archive link.
    #[error("No .zip link found on {0}")]
    NoArchiveLink(String),

    /// Archive contains no spreadsheet.
    #[error("No .xls/.xlsx file inside {0}")]
    NoSpreadsheet(PathBuf),

    /// Input file is missing.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Archive link pattern does not compile.
    #[error("Invalid archive pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// IO error.
    #[error("Fetch IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip error.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while building the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Month selection could not be parsed.
    #[error("Invalid month '{0}' (expected auto, all or YYYY-MM)")]
    InvalidMonth(String),

    /// Configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for [`crate::config::RunConfig`].
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally invalid configuration.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::pipeline::process_file`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("Schema detection failed: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type SheetResult<T> = Result<T, SheetError>;

pub type ClassifyResult<T> = Result<T, ClassifyError>;

pub type OutputResult<T> = Result<T, OutputError>;

pub type FetchResult<T> = Result<T, FetchError>;

pub type ConfigResult<T> = Result<T, ConfigError>;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ClassifyError -> PipelineError
        let err = ClassifyError::MissingColumn {
            field: "identifier".into(),
            columns: 2,
        };
        let pipeline_err: PipelineError = err.into();
        assert!(pipeline_err.to_string().contains("identifier"));

        // SheetError -> PipelineError
        let pipeline_err: PipelineError = SheetError::NoSheets.into();
        assert!(pipeline_err.to_string().contains("no worksheets"));
    }

    #[test]
    fn test_layout_mismatch_format() {
        let err = ClassifyError::LayoutMismatch {
            field: "offered".into(),
            index: 9,
            found: "richiesto".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Column 9"));
        assert!(msg.contains("richiesto"));
    }

    #[test]
    fn test_output_io_keeps_path() {
        let err = OutputError::io(
            "/tmp/out/ITBI_X_DATA_20250131.xls",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("ITBI_X_DATA_20250131.xls"));
    }

    #[test]
    fn test_name_collision_lists_identifiers() {
        let err: PipelineError = OutputError::NameCollision {
            name: "ITBI_BTP_IT1_DATA_20251031.xls".into(),
            identifiers: vec!["BTP IT1".into(), "BTP/IT1".into()],
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("BTP/IT1"));
        assert!(msg.contains("ITBI_BTP_IT1_DATA_20251031.xls"));
    }
}
