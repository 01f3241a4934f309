//! Column detection and row projection.
//!
//! Each canonical field (identifier, date, description, five metrics) is
//! resolved by the same ordered chain of detectors; the first hit wins.
//!
//! ```text
//! ColumnRule ──▶ exact label ──▶ fuzzy substring ──▶ fixed position ──▶ index
//!                   (hit?)            (hit?)              (in range?)
//! ```
//!
//! Resolved columns are then used to project every raw row into a
//! [`CandidateRow`]. Identifier filtering and date parsing happen downstream.

use serde::Serialize;

use crate::config::{ColumnRule, RunConfig};
use crate::diagnostics::{DetectionPath, Diagnostic, Diagnostics};
use crate::error::{ClassifyError, ClassifyResult};
use crate::models::MetricKind;
use crate::sheet::{Cell, RawTable};

// =============================================================================
// Detector chain
// =============================================================================

type Detector = fn(&ColumnRule, &[String]) -> Option<usize>;

const CHAIN: [(DetectionPath, Detector); 3] = [
    (DetectionPath::Exact, detect_exact),
    (DetectionPath::Fuzzy, detect_fuzzy),
    (DetectionPath::Positional, detect_position),
];

fn detect_exact(rule: &ColumnRule, headers: &[String]) -> Option<usize> {
    headers
        .iter()
        .position(|h| rule.exact.iter().any(|label| h == label))
}

fn detect_fuzzy(rule: &ColumnRule, headers: &[String]) -> Option<usize> {
    headers.iter().position(|h| label_matches(rule, h))
}

fn detect_position(rule: &ColumnRule, headers: &[String]) -> Option<usize> {
    rule.position.filter(|&p| p < headers.len())
}

/// Case-insensitive substring match against `contains`, vetoed by `excludes`.
fn label_matches(rule: &ColumnRule, label: &str) -> bool {
    let lower = label.to_lowercase();
    rule.contains.iter().any(|word| lower.contains(&word.to_lowercase()))
        && !rule.excludes.iter().any(|word| lower.contains(&word.to_lowercase()))
}

/// Run the chain for one rule.
pub fn resolve(rule: &ColumnRule, headers: &[String]) -> Option<(DetectionPath, usize)> {
    CHAIN
        .iter()
        .find_map(|(path, detect)| detect(rule, headers).map(|i| (*path, i)))
}

// =============================================================================
// Column map
// =============================================================================

/// Resolved column indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMap {
    pub identifier: usize,
    pub date: usize,
    pub description: Option<usize>,
    /// Indexed by [`MetricKind::index`].
    pub metrics: [Option<usize>; 5],
}

/// Resolve every canonical column of `table`.
///
/// Identifier and date are required. Description and metrics degrade to
/// absent with a [`Diagnostic::ColumnMissing`].
pub fn detect_columns(
    table: &RawTable,
    config: &RunConfig,
    diags: &mut Diagnostics,
) -> ClassifyResult<ColumnMap> {
    let headers = &table.headers;
    let mut required = |field: &str, rule: &ColumnRule| -> ClassifyResult<usize> {
        match resolve(rule, headers) {
            Some((path, index)) => {
                diags.push(resolved(field, path, index, headers));
                Ok(index)
            }
            None => Err(ClassifyError::MissingColumn {
                field: field.to_string(),
                columns: headers.len(),
            }),
        }
    };

    let identifier = required("identifier", &config.layout.identifier)?;
    let date = required("date", &config.layout.date)?;

    let description = optional("description", &config.layout.description, headers, diags);

    let mut metrics = [None; 5];
    for def in config.ordered_series() {
        let field = def.kind.as_str();
        let found = resolve(&def.column, headers);
        match found {
            Some((path, index)) => {
                diags.push(resolved(field, path, index, headers));
                if path == DetectionPath::Positional {
                    cross_check(field, &def.column, index, table, config, diags)?;
                }
                metrics[def.kind.index()] = Some(index);
            }
            None => diags.push(Diagnostic::ColumnMissing {
                field: field.to_string(),
            }),
        }
    }

    Ok(ColumnMap {
        identifier,
        date,
        description,
        metrics,
    })
}

fn optional(
    field: &str,
    rule: &ColumnRule,
    headers: &[String],
    diags: &mut Diagnostics,
) -> Option<usize> {
    match resolve(rule, headers) {
        Some((path, index)) => {
            diags.push(resolved(field, path, index, headers));
            Some(index)
        }
        None => {
            diags.push(Diagnostic::ColumnMissing {
                field: field.to_string(),
            });
            None
        }
    }
}

fn resolved(field: &str, path: DetectionPath, index: usize, headers: &[String]) -> Diagnostic {
    Diagnostic::ColumnResolved {
        field: field.to_string(),
        path,
        index,
        header: headers.get(index).cloned().unwrap_or_default(),
    }
}

/// Compare a positionally chosen metric column with its sub-label.
///
/// A blank sub-label is accepted. A label that names something else is a
/// warning, or an error under `strict_layout`.
fn cross_check(
    field: &str,
    rule: &ColumnRule,
    index: usize,
    table: &RawTable,
    config: &RunConfig,
    diags: &mut Diagnostics,
) -> ClassifyResult<()> {
    let label = table.sublabels.get(index).map(|s| s.trim()).unwrap_or("");
    if label.is_empty() || rule.exact.iter().any(|e| e == label) || label_matches(rule, label) {
        return Ok(());
    }

    if config.output.strict_layout {
        return Err(ClassifyError::LayoutMismatch {
            field: field.to_string(),
            index,
            found: label.to_string(),
        });
    }
    diags.push(Diagnostic::LayoutMismatch {
        field: field.to_string(),
        index,
        found: label.to_string(),
    });
    Ok(())
}

// =============================================================================
// Row projection
// =============================================================================

/// A raw row projected onto the canonical columns, before filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRow {
    pub source_row: usize,
    pub identifier: String,
    pub date: Cell,
    pub description: String,
    pub metrics: [Option<f64>; 5],
}

/// Project every row of `table` through `columns`.
pub fn project_rows(table: &RawTable, columns: &ColumnMap) -> Vec<CandidateRow> {
    table
        .rows
        .iter()
        .map(|row| {
            let mut metrics = [None; 5];
            for kind in MetricKind::ALL {
                metrics[kind.index()] = columns.metrics[kind.index()]
                    .and_then(|i| parse_amount(table.cell(row, i)));
            }
            CandidateRow {
                source_row: row.source_row,
                identifier: table.cell(row, columns.identifier).as_text(),
                date: table.cell(row, columns.date).clone(),
                description: columns
                    .description
                    .map(|i| table.cell(row, i).as_text())
                    .unwrap_or_default(),
                metrics,
            }
        })
        .collect()
}

/// Numeric value of a metric cell.
///
/// Numbers pass through. Text is parsed, accepting Italian grouping
/// (`1.234,5`). Anything else is absent.
pub fn parse_amount(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => parse_amount_text(s),
        _ => None,
    }
}

fn parse_amount_text(s: &str) -> Option<f64> {
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if compact.is_empty() {
        return None;
    }
    let normalized = if compact.contains(',') {
        compact.replace('.', "").replace(',', ".")
    } else {
        compact
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::RawRow;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn unnamed(width: usize) -> Vec<String> {
        (0..width).map(|i| format!("Unnamed: {}", i)).collect()
    }

    fn table(headers: Vec<String>, sublabels: Vec<String>, rows: Vec<Vec<Cell>>) -> RawTable {
        RawTable {
            headers,
            sublabels,
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, cells)| RawRow { source_row: i + 6, cells })
                .collect(),
        }
    }

    #[test]
    fn test_chain_order_exact_before_fuzzy() {
        let rule = ColumnRule {
            exact: vec!["ISIN".into()],
            contains: vec!["isin".into()],
            excludes: vec![],
            position: Some(2),
        };
        let h = headers(&["codice isin", "x", "y", "ISIN"]);
        assert_eq!(resolve(&rule, &h), Some((DetectionPath::Exact, 3)));

        let h = headers(&["a", "Codice ISIN", "c"]);
        assert_eq!(resolve(&rule, &h), Some((DetectionPath::Fuzzy, 1)));

        let h = unnamed(3);
        assert_eq!(resolve(&rule, &h), Some((DetectionPath::Positional, 2)));

        let h = unnamed(2);
        assert_eq!(resolve(&rule, &h), None);
    }

    #[test]
    fn test_fuzzy_excludes() {
        let config = RunConfig::default();
        let offered = &config.series_def(MetricKind::Offered).unwrap().column;
        let h = headers(&["minimo offerto", "Importo offerto"]);
        assert_eq!(resolve(offered, &h), Some((DetectionPath::Fuzzy, 1)));
    }

    #[test]
    fn test_missing_identifier_is_fatal() {
        let config = RunConfig::default();
        let t = table(headers(&["data asta", "x"]), vec![String::new(); 2], vec![]);
        let err = detect_columns(&t, &config, &mut Diagnostics::new()).unwrap_err();
        assert!(matches!(err, ClassifyError::MissingColumn { ref field, .. } if field == "identifier"));
    }

    #[test]
    fn test_positional_layout_resolution() {
        let config = RunConfig::default();
        let t = table(unnamed(14), vec![String::new(); 14], vec![]);
        let mut diags = Diagnostics::new();
        let map = detect_columns(&t, &config, &mut diags).unwrap();

        assert_eq!(map.identifier, 2);
        assert_eq!(map.date, 0);
        assert_eq!(map.description, Some(5));
        assert_eq!(map.metrics, [Some(9), Some(10), Some(11), Some(12), Some(13)]);
        assert_eq!(diags.path_of("identifier"), Some(DetectionPath::Positional));
        assert_eq!(diags.path_of("assigned"), Some(DetectionPath::Positional));
    }

    #[test]
    fn test_narrow_table_degrades_metrics() {
        let config = RunConfig::default();
        let t = table(headers(&["data asta", "x", "ISIN"]), vec![String::new(); 3], vec![]);
        let mut diags = Diagnostics::new();
        let map = detect_columns(&t, &config, &mut diags).unwrap();
        assert_eq!(map.description, None);
        assert_eq!(map.metrics, [None; 5]);
        let missing = diags
            .iter()
            .filter(|d| matches!(d, Diagnostic::ColumnMissing { .. }))
            .count();
        assert_eq!(missing, 6);
    }

    #[test]
    fn test_layout_cross_check() {
        let mut sublabels = vec![String::new(); 14];
        sublabels[9] = "richiesto".into();
        sublabels[10] = "Minimo offerto".into();
        let t = table(unnamed(14), sublabels, vec![]);

        let mut config = RunConfig::default();
        let mut diags = Diagnostics::new();
        detect_columns(&t, &config, &mut diags).unwrap();
        let mismatches: Vec<&Diagnostic> = diags
            .iter()
            .filter(|d| matches!(d, Diagnostic::LayoutMismatch { .. }))
            .collect();
        assert_eq!(mismatches.len(), 1);
        assert!(matches!(mismatches[0], Diagnostic::LayoutMismatch { index: 9, .. }));

        config.output.strict_layout = true;
        let err = detect_columns(&t, &config, &mut Diagnostics::new()).unwrap_err();
        assert!(matches!(err, ClassifyError::LayoutMismatch { index: 9, .. }));
    }

    #[test]
    fn test_project_rows() {
        let config = RunConfig::default();
        let mut cells = vec![Cell::Empty; 14];
        cells[0] = Cell::text("10/10/2025");
        cells[2] = Cell::text("IT0005580094");
        cells[9] = Cell::Number(3000.0);
        cells[10] = Cell::text("1.234,5");
        cells[13] = Cell::text("n.d.");
        let t = table(unnamed(14), vec![String::new(); 14], vec![cells]);
        let map = detect_columns(&t, &config, &mut Diagnostics::new()).unwrap();

        let rows = project_rows(&t, &map);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.identifier, "IT0005580094");
        assert_eq!(row.description, "");
        assert_eq!(row.metrics, [Some(3000.0), Some(1234.5), None, None, None]);
        assert_eq!(row.source_row, 6);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(&Cell::text("2500")), Some(2500.0));
        assert_eq!(parse_amount(&Cell::text("2 500,25")), Some(2500.25));
        assert_eq!(parse_amount(&Cell::text("1.5")), Some(1.5));
        assert_eq!(parse_amount(&Cell::text("-")), None);
        assert_eq!(parse_amount(&Cell::Empty), None);
    }
}
