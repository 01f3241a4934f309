//! # ITBI - Italian government bond auction extraction
//!
//! Reads the auction results spreadsheet published by Banca d'Italia and
//! produces, for every ISIN of the processed month, a DATA workbook with five
//! aligned amount series, a META workbook describing them, and optionally a
//! zip bundling both.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  aste .xls  │────▶│  Classify   │────▶│  Partition  │────▶│  DATA/META  │
//! │ (published) │     │ (+ filter)  │     │ (by month)  │     │  .xls + zip │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use itbi::{process_file, RunConfig};
//!
//! let config = RunConfig::load(None)?;
//! let report = process_file("aste_corrente.xls".as_ref(), &config)?;
//! println!("Wrote {} bundles", report.bundles.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Run configuration
//! - [`models`] - Domain models (AuctionRecord, SeriesSet, MetadataRow)
//! - [`sheet`] - Source workbook reading
//! - [`classify`] - Column detection and row projection
//! - [`filter`] - Identifier tiers
//! - [`partition`] - Month buckets and selection
//! - [`series`] - Per-identifier series
//! - [`metadata`] - META rows
//! - [`output`] - Workbook encoding and file materialization
//! - [`verify`] - Artifact checks
//! - [`fetch`] - Archive download and unpacking
//! - [`pipeline`] - End-to-end processing

// Core modules
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logs;
pub mod models;

// Input
pub mod fetch;
pub mod sheet;

// Processing
pub mod classify;
pub mod filter;
pub mod metadata;
pub mod partition;
pub mod pipeline;
pub mod series;

// Output
pub mod output;
pub mod verify;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{
    ClassifyError, ConfigError, FetchError, OutputError, PipelineError, PipelineResult, SheetError,
};

// =============================================================================
// Re-exports - Configuration and models
// =============================================================================

pub use config::{MonthSelection, RunConfig};
pub use diagnostics::{DetectionPath, Diagnostic, Diagnostics, IdentifierTier};
pub use models::{
    AuctionRecord, MetadataRow, MetricKind, MonthKey, OutputBundle, Series, SeriesPoint, SeriesSet,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use classify::{detect_columns, project_rows, ColumnMap};
pub use filter::filter_identifiers;
pub use metadata::metadata_rows;
pub use partition::{into_records, partition, select, MonthScope};
pub use pipeline::{
    process_file, process_table, PipelineOutcome, PipelineReport, ProcessOutcome,
};
pub use series::build_series;
pub use sheet::{read_sheet, RawTable};

// =============================================================================
// Re-exports - Output and acquisition
// =============================================================================

pub use fetch::{Fetcher, HttpFetcher, LocalFetcher, Unpacker, ZipUnpacker};
pub use output::{check_unique_names, materialize, WorkbookWriter, XlsWriter};
pub use verify::{verify_bundle, verify_dir, VerifyReport};
