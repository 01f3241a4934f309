//! Structural checks on written artifacts.
//!
//! Each artifact set (DATA, META, archive) is re-opened and checked:
//! - META carries all metadata headers, `CODE` and `DESCRIPTION` included
//! - DATA is at least 6 columns wide (date column + five series)
//! - the archive lists both workbook names
//!
//! Findings are collected as strings, never raised.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xls};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use zip::ZipArchive;

use crate::logs::{log_success_indent, log_warning_indent};
use crate::models::{OutputBundle, METADATA_COLUMNS};
use crate::output::archive::entry_names;

const MIN_DATA_COLUMNS: usize = 6;

static DATA_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)_DATA_(\d{8})\.xls$").expect("valid data name regex"));
static META_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)_META_(\d{8})\.xls$").expect("valid meta name regex"));
static ARCHIVE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)_(\d{8})\.zip$").expect("valid archive name regex"));

/// Files belonging to one identifier/month.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    /// `{prefix}_{identifier}_{YYYYMMDD}`
    pub stem: String,
    pub data: Option<PathBuf>,
    pub meta: Option<PathBuf>,
    pub archive: Option<PathBuf>,
}

impl ArtifactSet {
    fn data_name(&self) -> String {
        insert_kind(&self.stem, "DATA")
    }

    fn meta_name(&self) -> String {
        insert_kind(&self.stem, "META")
    }
}

/// `ITBI_X_20250131` + `DATA` -> `ITBI_X_DATA_20250131.xls`
fn insert_kind(stem: &str, kind: &str) -> String {
    match stem.rsplit_once('_') {
        Some((head, stamp)) => format!("{}_{}_{}.xls", head, kind, stamp),
        None => format!("{}_{}.xls", stem, kind),
    }
}

impl From<&OutputBundle> for ArtifactSet {
    fn from(bundle: &OutputBundle) -> Self {
        let stem = bundle
            .archive_path
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .or_else(|| {
                bundle
                    .data_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().replacen("_DATA_", "_", 1))
            })
            .unwrap_or_default();
        Self {
            stem,
            data: bundle.loose_files.then(|| bundle.data_path.clone()),
            meta: bundle.loose_files.then(|| bundle.meta_path.clone()),
            archive: bundle.archive_path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub stem: String,
    pub issues: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

// =============================================================================
// Entry points
// =============================================================================

pub fn verify_bundle(bundle: &OutputBundle) -> VerifyReport {
    verify_set(&ArtifactSet::from(bundle))
}

/// Verify one set, reading workbooks from disk or, when absent, from the
/// archive.
pub fn verify_set(set: &ArtifactSet) -> VerifyReport {
    let mut issues = Vec::new();
    let data_name = set.data_name();
    let meta_name = set.meta_name();

    let mut archived: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    if let Some(path) = &set.archive {
        match read_archive(path) {
            Ok((names, entries)) => {
                for expected in [&meta_name, &data_name] {
                    if !names.contains(expected) {
                        issues.push(format!("{}: missing entry {}", display(path), expected));
                    }
                }
                archived = entries;
            }
            Err(e) => issues.push(format!("{}: {}", display(path), e)),
        }
    }

    match workbook_bytes(set.meta.as_deref(), &archived, &meta_name) {
        Ok(bytes) => issues.extend(check_meta(&meta_name, bytes)),
        Err(e) => issues.push(e),
    }
    match workbook_bytes(set.data.as_deref(), &archived, &data_name) {
        Ok(bytes) => issues.extend(check_data(&data_name, bytes)),
        Err(e) => issues.push(e),
    }

    VerifyReport {
        stem: set.stem.clone(),
        issues,
    }
}

/// Group the artifacts found in `dir` and verify every set.
pub fn verify_dir(dir: &Path) -> std::io::Result<Vec<VerifyReport>> {
    let sets = scan_dir(dir)?;
    let reports: Vec<VerifyReport> = sets.values().map(verify_set).collect();

    for report in &reports {
        if report.is_ok() {
            log_success_indent(format!("{} ok", report.stem), 1);
        } else {
            for issue in &report.issues {
                log_warning_indent(issue.clone(), 1);
            }
        }
    }
    Ok(reports)
}

fn scan_dir(dir: &Path) -> std::io::Result<BTreeMap<String, ArtifactSet>> {
    let mut sets: BTreeMap<String, ArtifactSet> = BTreeMap::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };

        let (stem, slot) = if let Some(c) = DATA_NAME.captures(&name) {
            (format!("{}_{}", &c[1], &c[2]), 0)
        } else if let Some(c) = META_NAME.captures(&name) {
            (format!("{}_{}", &c[1], &c[2]), 1)
        } else if let Some(c) = ARCHIVE_NAME.captures(&name) {
            (format!("{}_{}", &c[1], &c[2]), 2)
        } else {
            continue;
        };

        let set = sets.entry(stem.clone()).or_insert_with(|| ArtifactSet {
            stem,
            ..ArtifactSet::default()
        });
        match slot {
            0 => set.data = Some(path),
            1 => set.meta = Some(path),
            _ => set.archive = Some(path),
        }
    }
    Ok(sets)
}

// =============================================================================
// Checks
// =============================================================================

fn check_meta(name: &str, bytes: Vec<u8>) -> Vec<String> {
    let range = match first_sheet(bytes) {
        Ok(range) => range,
        Err(e) => return vec![format!("{}: {}", name, e)],
    };

    let headers: Vec<String> = (0..range.width())
        .map(|c| match range.get((0, c)) {
            Some(Data::String(s)) => s.clone(),
            _ => String::new(),
        })
        .collect();

    METADATA_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .map(|col| format!("{}: missing header {}", name, col))
        .collect()
}

fn check_data(name: &str, bytes: Vec<u8>) -> Vec<String> {
    match first_sheet(bytes) {
        Ok(range) if range.width() >= MIN_DATA_COLUMNS => Vec::new(),
        Ok(range) => vec![format!(
            "{}: {} columns, expected at least {}",
            name,
            range.width(),
            MIN_DATA_COLUMNS
        )],
        Err(e) => vec![format!("{}: {}", name, e)],
    }
}

fn first_sheet(bytes: Vec<u8>) -> Result<Range<Data>, calamine::XlsError> {
    let mut workbook: Xls<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let names = workbook.sheet_names().to_owned();
    match names.first() {
        Some(first) => workbook.worksheet_range(first),
        None => Ok(Range::empty()),
    }
}

fn workbook_bytes(
    loose: Option<&Path>,
    archived: &BTreeMap<String, Vec<u8>>,
    name: &str,
) -> Result<Vec<u8>, String> {
    if let Some(path) = loose {
        return fs::read(path).map_err(|e| format!("{}: {}", display(path), e));
    }
    archived
        .get(name)
        .cloned()
        .ok_or_else(|| format!("{}: not found", name))
}

fn read_archive(path: &Path) -> Result<(Vec<String>, BTreeMap<String, Vec<u8>>), String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let names = entry_names(Cursor::new(bytes.as_slice())).map_err(|e| e.to_string())?;

    let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).map_err(|e| e.to_string())?;
    let mut entries = BTreeMap::new();
    for name in &names {
        let mut file = archive.by_name(name).map_err(|e| e.to_string())?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|e| e.to_string())?;
        entries.insert(name.clone(), buf);
    }
    Ok((names, entries))
}

fn display(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
