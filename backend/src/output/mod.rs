//! Materialization of per-identifier artifacts.
//!
//! For each [`SeriesSet`] the DATA and META workbooks are encoded in memory,
//! written under temporary names, and renamed into place together. The
//! archive, when enabled, is renamed last. A failure before that point
//! removes every temporary file of the bundle.
//!
//! ```text
//! SeriesSet ──▶ data_grid ──▶ XlsWriter ──▶ .ITBI_..._DATA_....xls.tmp ─┐
//!           └─▶ meta_grid ──▶ XlsWriter ──▶ .ITBI_..._META_....xls.tmp ─┼─▶ rename
//!                                   └────▶ zip ──▶ .ITBI_..._....zip.tmp ┘   (zip last)
//! ```

pub mod archive;
pub mod biff;
pub mod layout;
pub mod naming;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::error::{OutputError, OutputResult};
use crate::logs::log_success_indent;
use crate::metadata::metadata_rows;
use crate::models::{OutputBundle, SeriesSet};

pub use biff::{WorkbookWriter, XlsWriter};
pub use layout::{data_grid, meta_grid, OutCell, SheetGrid, DATA_SHEET, META_SHEET};
pub use naming::{artifact_names, file_token, ArtifactNames};

/// Encoded artifacts of one bundle, before touching the filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBundle {
    pub names: ArtifactNames,
    pub data: Vec<u8>,
    pub meta: Vec<u8>,
    pub archive: Option<Vec<u8>>,
}

/// Encode both workbooks (and the archive) for `set`.
pub fn encode_bundle(
    set: &SeriesSet,
    config: &RunConfig,
    writer: &dyn WorkbookWriter,
) -> OutputResult<EncodedBundle> {
    let names = artifact_names(&config.output.prefix, &set.identifier, set.month, writer.extension());

    let data = writer.encode(&data_grid(set, config))?;
    let meta = writer.encode(&meta_grid(&metadata_rows(&set.identifier, &set.description, config)))?;

    let archive = if config.output.archive {
        Some(archive::archive_bytes(&[
            (names.meta.as_str(), meta.as_slice()),
            (names.data.as_str(), data.as_slice()),
        ])?)
    } else {
        None
    };

    Ok(EncodedBundle {
        names,
        data,
        meta,
        archive,
    })
}

/// Fail before anything is written when two sets would land on the same
/// artifact names. Names are compared case-insensitively.
pub fn check_unique_names<'a>(
    sets: impl IntoIterator<Item = &'a SeriesSet>,
    prefix: &str,
    ext: &str,
) -> OutputResult<()> {
    let mut seen: HashMap<String, &'a str> = HashMap::new();
    for set in sets {
        let name = artifact_names(prefix, &set.identifier, set.month, ext).data;
        match seen.entry(name.to_ascii_lowercase()) {
            Entry::Occupied(e) if *e.get() != set.identifier => {
                return Err(OutputError::NameCollision {
                    name,
                    identifiers: vec![e.get().to_string(), set.identifier.clone()],
                });
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(e) => {
                e.insert(&set.identifier);
            }
        }
    }
    Ok(())
}

/// Write one bundle into `dir`.
pub fn materialize(
    set: &SeriesSet,
    config: &RunConfig,
    dir: &Path,
    writer: &dyn WorkbookWriter,
) -> OutputResult<OutputBundle> {
    let encoded = encode_bundle(set, config, writer)?;
    fs::create_dir_all(dir).map_err(|e| OutputError::io(dir, e))?;

    let loose_files = encoded.archive.is_none() || config.output.keep_loose_files;

    let mut files: Vec<(&str, &[u8])> = Vec::new();
    if loose_files {
        files.push((encoded.names.data.as_str(), encoded.data.as_slice()));
        files.push((encoded.names.meta.as_str(), encoded.meta.as_slice()));
    }
    if let Some(bytes) = &encoded.archive {
        files.push((encoded.names.archive.as_str(), bytes.as_slice()));
    }

    let mut staging = Staging::new(dir);
    for (name, bytes) in files {
        staging.stage(name, bytes)?;
    }
    staging.commit()?;

    let bundle = OutputBundle {
        identifier: set.identifier.clone(),
        month: set.month,
        data_path: dir.join(&encoded.names.data),
        meta_path: dir.join(&encoded.names.meta),
        archive_path: encoded.archive.as_ref().map(|_| dir.join(&encoded.names.archive)),
        loose_files,
    };

    match &bundle.archive_path {
        Some(path) => log_success_indent(format!("{} ({})", display_name(path), set.month), 1),
        None => log_success_indent(
            format!("{} + {}", encoded.names.data, encoded.names.meta),
            1,
        ),
    }
    Ok(bundle)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

// =============================================================================
// Staging
// =============================================================================

/// Temporary files awaiting rename. Dropping uncommitted staging removes them.
struct Staging {
    dir: PathBuf,
    staged: Vec<(PathBuf, PathBuf)>,
    committed: bool,
}

impl Staging {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            staged: Vec::new(),
            committed: false,
        }
    }

    fn stage(&mut self, name: &str, bytes: &[u8]) -> OutputResult<()> {
        let tmp = self.dir.join(format!(".{}.tmp", name));
        let dest = self.dir.join(name);
        fs::write(&tmp, bytes).map_err(|e| OutputError::io(&tmp, e))?;
        self.staged.push((tmp, dest));
        Ok(())
    }

    /// Rename in staging order; the last file staged is the last to appear.
    /// A failed rename removes the destinations this commit already renamed,
    /// so the bundle appears whole or not at all.
    fn commit(mut self) -> OutputResult<()> {
        for (i, (tmp, dest)) in self.staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, dest) {
                for (_, done) in &self.staged[..i] {
                    let _ = fs::remove_file(done);
                }
                return Err(OutputError::io(dest, e));
            }
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (tmp, _) in &self.staged {
            let _ = fs::remove_file(tmp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricKind, MonthKey, Series, SeriesPoint};
    use chrono::NaiveDate;

    fn set() -> SeriesSet {
        let d = NaiveDate::from_ymd_opt(2025, 10, 10).unwrap();
        SeriesSet {
            identifier: "IT0005580094".into(),
            month: MonthKey::new(2025, 10).unwrap(),
            description: "BTP".into(),
            series: MetricKind::ALL
                .iter()
                .map(|&kind| Series {
                    kind,
                    points: vec![SeriesPoint { date: d, value: Some(1.0) }],
                })
                .collect(),
        }
    }

    fn dir_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_materialize_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = materialize(&set(), &RunConfig::default(), dir.path(), &XlsWriter).unwrap();

        assert!(bundle.data_path.exists());
        assert!(bundle.meta_path.exists());
        assert!(bundle.archive_path.as_ref().unwrap().exists());
        assert_eq!(
            dir_names(dir.path()),
            vec![
                "ITBI_IT0005580094_20251031.zip",
                "ITBI_IT0005580094_DATA_20251031.xls",
                "ITBI_IT0005580094_META_20251031.xls",
            ]
        );
    }

    #[test]
    fn test_archive_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RunConfig::default();
        config.output.keep_loose_files = false;
        let bundle = materialize(&set(), &config, dir.path(), &XlsWriter).unwrap();
        assert!(!bundle.loose_files);
        assert_eq!(dir_names(dir.path()), vec!["ITBI_IT0005580094_20251031.zip"]);
    }

    #[test]
    fn test_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RunConfig::default();
        config.output.archive = false;
        config.output.keep_loose_files = false;
        let bundle = materialize(&set(), &config, dir.path(), &XlsWriter).unwrap();
        assert!(bundle.archive_path.is_none());
        assert!(bundle.loose_files);
        assert_eq!(dir_names(dir.path()).len(), 2);
    }

    #[test]
    fn test_archive_entry_order() {
        let encoded = encode_bundle(&set(), &RunConfig::default(), &XlsWriter).unwrap();
        let names = archive::entry_names(std::io::Cursor::new(encoded.archive.unwrap())).unwrap();
        assert_eq!(
            names,
            vec![
                "ITBI_IT0005580094_META_20251031.xls",
                "ITBI_IT0005580094_DATA_20251031.xls",
            ]
        );
    }

    struct FailingWriter;

    impl WorkbookWriter for FailingWriter {
        fn extension(&self) -> &'static str {
            "xls"
        }

        fn encode(&self, _sheet: &SheetGrid) -> OutputResult<Vec<u8>> {
            Err(OutputError::StringTooLong(9999))
        }
    }

    #[test]
    fn test_encode_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        assert!(materialize(&set(), &RunConfig::default(), &out, &FailingWriter).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_staging_rollback() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut staging = Staging::new(dir.path());
            staging.stage("a.xls", b"a").unwrap();
            staging.stage("b.xls", b"b").unwrap();
            // dropped without commit
        }
        assert!(dir_names(dir.path()).is_empty());
    }

    #[test]
    fn test_rerun_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::default();
        let first = materialize(&set(), &config, dir.path(), &XlsWriter).unwrap();
        let bytes = fs::read(&first.data_path).unwrap();
        let second = materialize(&set(), &config, dir.path(), &XlsWriter).unwrap();
        assert_eq!(first, second);
        assert_eq!(dir_names(dir.path()).len(), 3);
        assert_eq!(fs::read(&second.data_path).unwrap(), bytes);
    }

    #[test]
    fn test_commit_failure_removes_renamed_files() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the second destination makes its rename fail.
        fs::create_dir(dir.path().join("b.xls")).unwrap();
        fs::write(dir.path().join("b.xls").join("keep"), b"x").unwrap();

        let mut staging = Staging::new(dir.path());
        staging.stage("a.xls", b"a").unwrap();
        staging.stage("b.xls", b"b").unwrap();
        assert!(staging.commit().is_err());

        assert_eq!(dir_names(dir.path()), vec!["b.xls"]);
    }

    #[test]
    fn test_sanitized_names_collide() {
        let mut a = set();
        a.identifier = "BTP IT1".into();
        let mut b = set();
        b.identifier = "BTP/IT1".into();

        let err = check_unique_names([&a, &b], "ITBI", "xls").unwrap_err();
        match err {
            OutputError::NameCollision { name, identifiers } => {
                assert_eq!(name, "ITBI_BTP_IT1_DATA_20251031.xls");
                assert_eq!(identifiers, vec!["BTP IT1", "BTP/IT1"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_distinct_names_and_months_pass() {
        let a = set();
        let mut b = set();
        b.identifier = "IT0005580095".into();
        let mut c = set();
        c.month = MonthKey::new(2025, 11).unwrap();
        assert!(check_unique_names([&a, &b, &c], "ITBI", "xls").is_ok());
    }
}
