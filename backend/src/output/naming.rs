//! Artifact file names.
//!
//! `{prefix}_{identifier}_DATA_{YYYYMMDD}.xls`, `..._META_...` and
//! `{prefix}_{identifier}_{YYYYMMDD}.zip`, stamped with the last day of the
//! processed month.

use crate::models::MonthKey;

/// Identifier as it appears in file names: anything outside
/// `[A-Za-z0-9._-]` becomes `_`, so relaxed-tier values stay inside the
/// output directory.
pub fn file_token(identifier: &str) -> String {
    let token: String = identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match token.as_str() {
        "" | "." | ".." => "_".repeat(token.len().max(1)),
        _ => token,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub data: String,
    pub meta: String,
    pub archive: String,
}

pub fn artifact_names(prefix: &str, identifier: &str, month: MonthKey, ext: &str) -> ArtifactNames {
    let id = file_token(identifier);
    let stamp = month.stamp();
    ArtifactNames {
        data: format!("{}_{}_DATA_{}.{}", prefix, id, stamp, ext),
        meta: format!("{}_{}_META_{}.{}", prefix, id, stamp, ext),
        archive: format!("{}_{}_{}.zip", prefix, id, stamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        let names = artifact_names("ITBI", "IT0005580094", MonthKey::new(2025, 2).unwrap(), "xls");
        assert_eq!(names.data, "ITBI_IT0005580094_DATA_20250228.xls");
        assert_eq!(names.meta, "ITBI_IT0005580094_META_20250228.xls");
        assert_eq!(names.archive, "ITBI_IT0005580094_20250228.zip");
    }

    #[test]
    fn test_file_token_sanitizes() {
        assert_eq!(file_token("IT0005580094"), "IT0005580094");
        assert_eq!(file_token("BTP IT123/45"), "BTP_IT123_45");
        assert_eq!(file_token("../etc"), ".._etc");
        assert_eq!(file_token(".."), "__");
        assert_eq!(file_token(""), "_");
    }
}
