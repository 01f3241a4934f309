//! End-to-end processing of one auction spreadsheet.
//!
//! ```text
//! RawTable ─▶ detect_columns ─▶ project_rows ─▶ filter_identifiers
//!                                                     │
//!        select ◀── partition ◀── into_records ◀──────┘
//!          │
//!          ▼
//!    build_series ─▶ materialize ─▶ verify
//! ```
//!
//! [`process_table`] is pure and returns the series for every selected
//! month. [`process_file`] adds reading and writing around it.
//!
//! # Example
//!
//! ```rust,ignore
//! use itbi::{process_file, RunConfig};
//! use std::path::Path;
//!
//! let config = RunConfig::default();
//! let report = process_file(Path::new("aste.xls"), &config)?;
//! println!("{} bundles written", report.bundles.len());
//! ```

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::classify::{detect_columns, project_rows, ColumnMap};
use crate::config::RunConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::PipelineResult;
use crate::filter::filter_identifiers;
use crate::logs::{log_info, log_info_indent, log_success, log_warning, log_warning_indent};
use crate::models::{MonthKey, OutputBundle, SeriesSet};
use crate::output::{check_unique_names, materialize, WorkbookWriter, XlsWriter};
use crate::partition::{into_records, partition, select};
use crate::series::build_series;
use crate::sheet::{read_sheet, RawTable};
use crate::verify::{verify_bundle, VerifyReport};

/// Series built for one selected month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSeries {
    pub month: MonthKey,
    pub sets: Vec<SeriesSet>,
}

/// Whether the requested scope produced anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// No data for the requested scope. `month` is set when a specific month
    /// was asked for.
    Empty { month: Option<MonthKey> },
    Produced { months: Vec<MonthKey> },
}

impl PipelineOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, PipelineOutcome::Empty { .. })
    }
}

/// Result of [`process_table`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub columns: ColumnMap,
    pub rows_read: usize,
    /// Rows left after identifier filtering and date parsing.
    pub records_kept: usize,
    pub months: Vec<MonthSeries>,
    pub diagnostics: Diagnostics,
}

impl ProcessOutcome {
    pub fn outcome(&self) -> PipelineOutcome {
        let produced: Vec<MonthKey> = self
            .months
            .iter()
            .filter(|m| !m.sets.is_empty())
            .map(|m| m.month)
            .collect();

        if produced.is_empty() {
            PipelineOutcome::Empty {
                month: self.months.first().map(|m| m.month),
            }
        } else {
            PipelineOutcome::Produced { months: produced }
        }
    }

    /// Every series set, oldest month first.
    pub fn sets(&self) -> impl Iterator<Item = &SeriesSet> {
        self.months.iter().flat_map(|m| m.sets.iter())
    }
}

/// Result of [`process_file`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub rows_read: usize,
    pub records_kept: usize,
    pub outcome: PipelineOutcome,
    pub bundles: Vec<OutputBundle>,
    pub verification: Vec<VerifyReport>,
    pub diagnostics: Diagnostics,
}

// =============================================================================
// Processing
// =============================================================================

/// Classify, filter, partition and group a raw table.
pub fn process_table(table: &RawTable, config: &RunConfig) -> PipelineResult<ProcessOutcome> {
    let mut diags = Diagnostics::new();

    let columns = detect_columns(table, config, &mut diags)?;
    let candidates = project_rows(table, &columns);
    let filtered = filter_identifiers(candidates, &mut diags);
    let records = into_records(filtered, &config.dates, &mut diags);
    let records_kept = records.len();

    let scopes = select(partition(records), config.month);
    if scopes.is_empty() {
        diags.push(Diagnostic::EmptyScope { month: None });
    }

    let mut months = Vec::with_capacity(scopes.len());
    for scope in scopes {
        if scope.is_empty() {
            diags.push(Diagnostic::EmptyScope {
                month: Some(scope.month),
            });
        }
        months.push(MonthSeries {
            month: scope.month,
            sets: build_series(scope.month, &scope.records),
        });
    }

    Ok(ProcessOutcome {
        columns,
        rows_read: table.rows.len(),
        records_kept,
        months,
        diagnostics: diags,
    })
}

/// Read `path`, process it, and write every bundle with the `.xls` writer.
pub fn process_file(path: &Path, config: &RunConfig) -> PipelineResult<PipelineReport> {
    process_file_with(path, config, &XlsWriter)
}

pub fn process_file_with(
    path: &Path,
    config: &RunConfig,
    writer: &dyn WorkbookWriter,
) -> PipelineResult<PipelineReport> {
    log_config_summary(config);

    log_info(format!("Reading {}", path.display()));
    let table = read_sheet(path, &config.layout)?;
    log_info_indent(
        format!("{} data rows, {} columns", table.rows.len(), table.width()),
        1,
    );

    log_info("Detecting columns...");
    let processed = process_table(&table, config)?;
    let outcome = processed.outcome();
    let output_dir = output_dir(config);

    let mut bundles = Vec::new();
    let mut verification = Vec::new();

    match &outcome {
        PipelineOutcome::Empty { month } => match month {
            Some(m) => log_warning(format!("No data for requested scope {}", m)),
            None => log_warning("No data for requested scope"),
        },
        PipelineOutcome::Produced { months } => {
            log_info(format!(
                "Writing {} identifiers into {}",
                processed.sets().count(),
                output_dir.display()
            ));
            for month in months {
                log_info_indent(format!("Month {}", month), 1);
            }
            check_unique_names(processed.sets(), &config.output.prefix, writer.extension())?;

            for set in processed.sets() {
                let bundle = materialize(set, config, &output_dir, writer)?;
                let report = verify_bundle(&bundle);
                for issue in &report.issues {
                    log_warning_indent(issue.clone(), 2);
                }
                verification.push(report);
                bundles.push(bundle);
            }
        }
    }

    let report = PipelineReport {
        input: path.to_path_buf(),
        output_dir,
        rows_read: processed.rows_read,
        records_kept: processed.records_kept,
        outcome,
        bundles,
        verification,
        diagnostics: processed.diagnostics,
    };
    log_run_summary(&report);
    Ok(report)
}

/// `output.dir`, or a timestamped directory below it with `stamp_dir`.
pub fn output_dir(config: &RunConfig) -> PathBuf {
    if config.output.stamp_dir {
        config
            .output
            .dir
            .join(Local::now().format("%Y%m%d_%H%M%S").to_string())
    } else {
        config.output.dir.clone()
    }
}

// =============================================================================
// Summaries
// =============================================================================

pub fn log_config_summary(config: &RunConfig) {
    log_info("Configuration");
    log_info_indent(format!("Month: {}", config.month), 1);
    log_info_indent(format!("Output: {}", config.output.dir.display()), 1);
    log_info_indent(format!("Prefix: {}", config.output.prefix), 1);
    log_info_indent(
        format!(
            "Archive: {} (loose files: {})",
            config.output.archive, config.output.keep_loose_files
        ),
        1,
    );
    if config.output.strict_layout {
        log_info_indent("Strict layout: on", 1);
    }
}

fn log_run_summary(report: &PipelineReport) {
    let warnings = report.diagnostics.warnings().count();
    let failed = report.verification.iter().filter(|r| !r.is_ok()).count();

    log_info("Summary");
    log_info_indent(format!("Rows read: {}", report.rows_read), 1);
    log_info_indent(format!("Records kept: {}", report.records_kept), 1);
    if let Some(tier) = report.diagnostics.identifier_tier() {
        log_info_indent(format!("Identifier tier: {:?}", tier), 1);
    }
    log_info_indent(format!("Bundles: {}", report.bundles.len()), 1);
    if warnings > 0 {
        log_warning_indent(format!("{} warnings", warnings), 1);
    }
    if failed > 0 {
        log_warning_indent(format!("{} bundles failed verification", failed), 1);
    } else if !report.bundles.is_empty() {
        log_success(format!("{} bundles written and verified", report.bundles.len()));
    }
}
