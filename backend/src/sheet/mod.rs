//! Source workbook reader.
//!
//! Loads the first worksheet of an `.xls`/`.xlsx` file through calamine and
//! shapes it into a [`RawTable`]: header labels, optional sub-labels, and the
//! data rows that follow the boilerplate block. No domain logic here.
//!
//! ```text
//! row 0   title / notes            (ignored)
//! row 1   header labels            -> RawTable::headers
//! row 2   metric sub-labels        -> RawTable::sublabels
//! row 3-4 boilerplate              (skipped)
//! row 5.. data                     -> RawTable::rows (all-empty rows dropped)
//! ```

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::SourceLayout;
use crate::error::{SheetError, SheetResult};

/// A loosely typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Render as text the way a dataframe `str()` would, with an empty cell
    /// rendering as `""`.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Date(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// One data row with its 1-based position in the source sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRow {
    pub source_row: usize,
    pub cells: Vec<Cell>,
}

/// First worksheet, shaped by [`SourceLayout`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// Text of the sub-label row, same width as `headers`.
    pub sublabels: Vec<String>,
    pub rows: Vec<RawRow>,
}

static EMPTY: Cell = Cell::Empty;

impl RawTable {
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn cell<'a>(&self, row: &'a RawRow, index: usize) -> &'a Cell {
        row.cells.get(index).unwrap_or(&EMPTY)
    }
}

/// Read the first worksheet of `path`.
pub fn read_sheet(path: &Path, layout: &SourceLayout) -> SheetResult<RawTable> {
    if !path.exists() {
        return Err(SheetError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }

    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names().to_owned();
    let first = sheet_names.first().ok_or(SheetError::NoSheets)?;
    let range = workbook.worksheet_range(first)?;

    // Keep absolute coordinates when the used range does not start at A1.
    let (row0, col0) = range.start().map(|(r, c)| (r as usize, c as usize)).unwrap_or((0, 0));
    let (height, width) = range.get_size();

    let mut grid = vec![vec![Cell::Empty; col0 + width]; row0 + height];
    for (r, c, value) in range.used_cells() {
        grid[row0 + r][col0 + c] = convert_value(value);
    }

    table_from_grid(grid, layout)
}

fn convert_value(value: &Data) -> Cell {
    match value {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(if *b { "True" } else { "False" }.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => Cell::Date(ndt),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso(s).map(Cell::Date).unwrap_or_else(|| Cell::text(s.clone())),
        Data::DurationIso(s) => Cell::text(s.clone()),
        Data::Error(_) => Cell::Empty,
        #[allow(unreachable_patterns)]
        _ => Cell::Empty,
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Shape an absolute cell grid into a [`RawTable`].
pub fn table_from_grid(grid: Vec<Vec<Cell>>, layout: &SourceLayout) -> SheetResult<RawTable> {
    let height = grid.len();
    if layout.header_row >= height {
        return Err(SheetError::MissingHeader {
            row: layout.header_row,
            height,
        });
    }

    let width = grid.iter().map(|r| r.len()).max().unwrap_or(0);
    let headers = header_names(&grid[layout.header_row], width);

    let sublabels = match layout.sublabel_row {
        Some(r) if r < height => (0..width)
            .map(|i| grid[r].get(i).map(Cell::as_text).unwrap_or_default())
            .collect(),
        _ => vec![String::new(); width],
    };

    let rows = grid
        .into_iter()
        .enumerate()
        .skip(layout.first_data_row())
        .filter(|(_, cells)| cells.iter().any(|c| !c.is_empty()))
        .map(|(i, mut cells)| {
            cells.resize(width, Cell::Empty);
            RawRow {
                source_row: i + 1,
                cells,
            }
        })
        .collect();

    Ok(RawTable {
        headers,
        sublabels,
        rows,
    })
}

/// Blank labels become `Unnamed: {index}`; repeats get a `.{n}` suffix.
fn header_names(row: &[Cell], width: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    (0..width)
        .map(|i| {
            let raw = row.get(i).map(Cell::as_text).unwrap_or_default();
            let base = if raw.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                raw
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}
