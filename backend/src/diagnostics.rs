//! Structured record of every fallback decision taken during a run.
//!
//! Stages push [`Diagnostic`] values into a [`Diagnostics`] collector that
//! travels with the pipeline result, so callers and tests can check which
//! detection path or filter tier fired. Each diagnostic is also logged.

use serde::Serialize;

use crate::logs::{log_info_indent, log_warning_indent};
use crate::models::MonthKey;

/// How a canonical column was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPath {
    Exact,
    Fuzzy,
    Positional,
}

/// Which identifier filter tier produced the retained rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierTier {
    /// `^IT\d{11}$`
    Strict,
    /// contains `IT` followed by digits
    Relaxed,
    /// any non-empty value other than `nan`
    NonEmpty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    ColumnResolved {
        field: String,
        path: DetectionPath,
        index: usize,
        header: String,
    },
    ColumnMissing {
        field: String,
    },
    LayoutMismatch {
        field: String,
        index: usize,
        found: String,
    },
    IdentifierTier {
        tier: IdentifierTier,
        matched: usize,
    },
    DatesDropped {
        count: usize,
    },
    EmptyScope {
        month: Option<MonthKey>,
    },
}

impl Diagnostic {
    /// Degraded-mode decisions worth a warning.
    pub fn is_warning(&self) -> bool {
        match self {
            Diagnostic::ColumnResolved { path, .. } => *path == DetectionPath::Positional,
            Diagnostic::IdentifierTier { tier, .. } => *tier != IdentifierTier::Strict,
            Diagnostic::DatesDropped { count } => *count > 0,
            Diagnostic::ColumnMissing { .. }
            | Diagnostic::LayoutMismatch { .. }
            | Diagnostic::EmptyScope { .. } => true,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Diagnostic::ColumnResolved { field, path, index, header } => format!(
                "{} -> column {} '{}' ({:?})",
                field, index, header, path
            ),
            Diagnostic::ColumnMissing { field } => {
                format!("{} column not found, values left empty", field)
            }
            Diagnostic::LayoutMismatch { field, index, found } => format!(
                "{} taken from column {} but its label reads '{}'",
                field, index, found
            ),
            Diagnostic::IdentifierTier { tier, matched } => {
                format!("identifier filter: {:?} tier kept {} rows", tier, matched)
            }
            Diagnostic::DatesDropped { count } => {
                format!("{} rows dropped for invalid auction date", count)
            }
            Diagnostic::EmptyScope { month: Some(m) } => format!("no data for {}", m),
            Diagnostic::EmptyScope { month: None } => "no data in input".to_string(),
        }
    }
}

/// Ordered collection of diagnostics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_warning() {
            log_warning_indent(diagnostic.message(), 1);
        } else {
            log_info_indent(diagnostic.message(), 1);
        }
        self.0.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.is_warning())
    }

    /// Tier reported by the identifier filter, if it ran.
    pub fn identifier_tier(&self) -> Option<IdentifierTier> {
        self.0.iter().find_map(|d| match d {
            Diagnostic::IdentifierTier { tier, .. } => Some(*tier),
            _ => None,
        })
    }

    /// Detection path of `field`, if it resolved.
    #[cfg(test)]
    pub fn path_of(&self, field: &str) -> Option<DetectionPath> {
        self.0.iter().find_map(|d| match d {
            Diagnostic::ColumnResolved { field: f, path, .. } if f == field => Some(*path),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_kind_tag() {
        let d = Diagnostic::IdentifierTier {
            tier: IdentifierTier::NonEmpty,
            matched: 1,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "identifier_tier");
        assert_eq!(json["tier"], "non_empty");
    }

    #[test]
    fn test_warning_classification() {
        assert!(!Diagnostic::DatesDropped { count: 0 }.is_warning());
        assert!(Diagnostic::DatesDropped { count: 2 }.is_warning());
        assert!(!Diagnostic::IdentifierTier { tier: IdentifierTier::Strict, matched: 4 }.is_warning());
        assert!(Diagnostic::ColumnResolved {
            field: "offered".into(),
            path: DetectionPath::Positional,
            index: 9,
            header: "Unnamed: 9".into(),
        }
        .is_warning());
    }

    #[test]
    fn test_lookups() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::ColumnResolved {
            field: "identifier".into(),
            path: DetectionPath::Exact,
            index: 2,
            header: "ISIN".into(),
        });
        diags.push(Diagnostic::IdentifierTier {
            tier: IdentifierTier::Relaxed,
            matched: 3,
        });
        assert_eq!(diags.path_of("identifier"), Some(DetectionPath::Exact));
        assert_eq!(diags.path_of("date"), None);
        assert_eq!(diags.identifier_tier(), Some(IdentifierTier::Relaxed));
        assert_eq!(diags.warnings().count(), 1);
    }
}
