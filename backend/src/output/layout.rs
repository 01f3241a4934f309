//! Cell grids for the DATA and META sheets.
//!
//! ```text
//! DATA                                      META
//! ┌────────────┬──────────┬─────┐           ┌──────┬─────────────┬─────┐
//! │            │ code OFR │ ... │  row 1    │ CODE │ DESCRIPTION │ ... │
//! │            │ desc OFR │ ... │  row 2    ├──────┼─────────────┼─────┤
//! ├────────────┼──────────┼─────┤           │ ...OFR.ITBI.M      │ ... │
//! │ 2025-10-03 │   2750.0 │     │  row 3+   │ ...  (5 rows)      │     │
//! └────────────┴──────────┴─────┘           └────────────────────┴─────┘
//! ```

use crate::config::RunConfig;
use crate::metadata::{series_code, series_description};
use crate::models::{MetadataRow, SeriesSet, METADATA_COLUMNS};

pub const DATA_SHEET: &str = "DATA";
pub const META_SHEET: &str = "META";

#[derive(Debug, Clone, PartialEq)]
pub enum OutCell {
    Blank,
    Text(String),
    Number(f64),
}

impl OutCell {
    fn text_or_blank(s: &str) -> Self {
        if s.is_empty() {
            OutCell::Blank
        } else {
            OutCell::Text(s.to_string())
        }
    }
}

/// A single named worksheet, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetGrid {
    pub name: String,
    pub rows: Vec<Vec<OutCell>>,
}

impl SheetGrid {
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// DATA sheet: two header rows, then one row per distinct date.
pub fn data_grid(set: &SeriesSet, config: &RunConfig) -> SheetGrid {
    let defs = config.ordered_series();

    let mut codes = vec![OutCell::Blank];
    let mut descriptions = vec![OutCell::Blank];
    for def in &defs {
        codes.push(OutCell::Text(series_code(&set.identifier, def)));
        descriptions.push(OutCell::Text(series_description(
            &set.identifier,
            &set.description,
            def,
        )));
    }

    let mut rows = vec![codes, descriptions];
    for date in set.dates() {
        let mut row = vec![OutCell::Text(date.format(&config.dates.output).to_string())];
        for def in &defs {
            let value = set.get(def.kind).and_then(|s| s.value_at(date));
            row.push(value.map(OutCell::Number).unwrap_or(OutCell::Blank));
        }
        rows.push(row);
    }

    SheetGrid {
        name: DATA_SHEET.to_string(),
        rows,
    }
}

/// META sheet: column names, then one row per series.
pub fn meta_grid(metadata: &[MetadataRow]) -> SheetGrid {
    let header = METADATA_COLUMNS
        .iter()
        .map(|c| OutCell::Text(c.to_string()))
        .collect();

    let mut rows = vec![header];
    rows.extend(
        metadata
            .iter()
            .map(|m| m.values().iter().map(|v| OutCell::text_or_blank(v)).collect()),
    );

    SheetGrid {
        name: META_SHEET.to_string(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::metadata_rows;
    use crate::models::{MetricKind, MonthKey, Series, SeriesPoint};
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
    }

    fn set() -> SeriesSet {
        let mut series: Vec<Series> = MetricKind::ALL
            .iter()
            .map(|&kind| Series { kind, points: vec![] })
            .collect();
        series[0].points = vec![
            SeriesPoint { date: date(3), value: Some(2750.0) },
            SeriesPoint { date: date(3), value: Some(9999.0) },
            SeriesPoint { date: date(10), value: None },
        ];
        series[4].points = vec![SeriesPoint { date: date(10), value: Some(2500.0) }];
        SeriesSet {
            identifier: "IT0005580094".into(),
            month: MonthKey::new(2025, 10).unwrap(),
            description: "BTP".into(),
            series,
        }
    }

    #[test]
    fn test_data_header_rows() {
        let grid = data_grid(&set(), &RunConfig::default());
        assert_eq!(grid.name, "DATA");
        assert_eq!(grid.rows[0][0], OutCell::Blank);
        assert_eq!(grid.rows[0][1], OutCell::Text("IT0005580094.OFR.ITBI.M".into()));
        assert_eq!(grid.rows[0][5], OutCell::Text("IT0005580094.ASGN.ITBI.M".into()));
        assert_eq!(grid.rows[1][0], OutCell::Blank);
        assert_eq!(
            grid.rows[1][2],
            OutCell::Text("ISIN:IT0005580094;BTP:amounts: minimum offered".into())
        );
        assert_eq!(grid.width(), 6);
    }

    #[test]
    fn test_data_rows_first_match_and_blanks() {
        let grid = data_grid(&set(), &RunConfig::default());
        assert_eq!(grid.rows.len(), 4);
        assert_eq!(grid.rows[2][0], OutCell::Text("2025-10-03".into()));
        assert_eq!(grid.rows[2][1], OutCell::Number(2750.0));
        assert_eq!(grid.rows[2][5], OutCell::Blank);
        assert_eq!(grid.rows[3][0], OutCell::Text("2025-10-10".into()));
        assert_eq!(grid.rows[3][1], OutCell::Blank);
        assert_eq!(grid.rows[3][5], OutCell::Number(2500.0));
    }

    #[test]
    fn test_meta_grid() {
        let config = RunConfig::default();
        let grid = meta_grid(&metadata_rows("IT0005580094", "BTP", &config));
        assert_eq!(grid.name, "META");
        assert_eq!(grid.rows.len(), 6);
        assert_eq!(grid.rows[0][0], OutCell::Text("CODE".into()));
        assert_eq!(grid.rows[0][15], OutCell::Text("DATASET".into()));
        // ANNUALIZED is empty by default
        assert_eq!(grid.rows[1][9], OutCell::Blank);
        assert_eq!(grid.width(), 16);
    }
}
