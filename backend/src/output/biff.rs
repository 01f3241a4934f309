//! Minimal BIFF8 (`.xls`) workbook encoder.
//!
//! Writes exactly one worksheet with text, number and blank cells. Strings go
//! through the shared string table (SST + LABELSST), numbers are NUMBER
//! records, blanks are BLANK records. The record stream is wrapped in an OLE
//! compound file as the `Workbook` stream.
//!
//! ```text
//! Workbook stream
//! ├── globals   BOF CODEPAGE WINDOW1 FONT XF*16 STYLE BOUNDSHEET SST [CONTINUE*] EOF
//! └── sheet     BOF DIMENSIONS (LABELSST|NUMBER|BLANK)* WINDOW2 EOF
//! ```

use std::collections::HashMap;
use std::io::{Cursor, Write};

use super::layout::{OutCell, SheetGrid};
use crate::error::{OutputError, OutputResult};

const RECORD_BOF: u16 = 0x0809;
const RECORD_EOF: u16 = 0x000A;
const RECORD_CODEPAGE: u16 = 0x0042;
const RECORD_WINDOW1: u16 = 0x003D;
const RECORD_FONT: u16 = 0x0031;
const RECORD_XF: u16 = 0x00E0;
const RECORD_STYLE: u16 = 0x0293;
const RECORD_BOUNDSHEET: u16 = 0x0085;
const RECORD_SST: u16 = 0x00FC;
const RECORD_CONTINUE: u16 = 0x003C;
const RECORD_DIMENSIONS: u16 = 0x0200;
const RECORD_WINDOW2: u16 = 0x023E;
const RECORD_LABELSST: u16 = 0x00FD;
const RECORD_NUMBER: u16 = 0x0203;
const RECORD_BLANK: u16 = 0x0201;

const BOF_VERSION_BIFF8: u16 = 0x0600;
const BOF_DT_WORKBOOK_GLOBALS: u16 = 0x0005;
const BOF_DT_WORKSHEET: u16 = 0x0010;

/// UTF-16LE
const CODEPAGE_UNICODE: u16 = 1200;

const XF_FLAG_LOCKED: u16 = 0x0001;
const XF_FLAG_STYLE: u16 = 0x0004;
const COLOR_AUTOMATIC: u16 = 0x7FFF;

/// Style XFs 0..=14, default cell XF 15.
const STYLE_XF_COUNT: u16 = 15;
const CELL_XF: u16 = 15;

/// Largest record payload BIFF8 allows.
const MAX_RECORD_DATA: usize = 8224;

const MAX_ROWS: usize = 65_536;
const MAX_COLS: usize = 256;

// =============================================================================
// Writer seam
// =============================================================================

/// Encodes a [`SheetGrid`] into the bytes of a workbook file.
pub trait WorkbookWriter {
    /// File extension, without the dot.
    fn extension(&self) -> &'static str;

    fn encode(&self, sheet: &SheetGrid) -> OutputResult<Vec<u8>>;
}

/// Legacy Excel 97-2003 writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsWriter;

impl WorkbookWriter for XlsWriter {
    fn extension(&self) -> &'static str {
        "xls"
    }

    fn encode(&self, sheet: &SheetGrid) -> OutputResult<Vec<u8>> {
        let stream = workbook_stream(sheet)?;
        wrap_compound_file(&stream)
    }
}

fn wrap_compound_file(workbook_stream: &[u8]) -> OutputResult<Vec<u8>> {
    let cursor = Cursor::new(Vec::new());
    let mut ole = cfb::CompoundFile::create(cursor).map_err(OutputError::Encode)?;
    {
        let mut stream = ole.create_stream("Workbook").map_err(OutputError::Encode)?;
        stream.write_all(workbook_stream).map_err(OutputError::Encode)?;
    }
    ole.flush().map_err(OutputError::Encode)?;
    Ok(ole.into_inner().into_inner())
}

// =============================================================================
// Workbook stream
// =============================================================================

/// Raw BIFF8 record stream for a single-sheet workbook.
pub fn workbook_stream(sheet: &SheetGrid) -> OutputResult<Vec<u8>> {
    let width = sheet.width();
    if sheet.rows.len() > MAX_ROWS || width > MAX_COLS {
        return Err(OutputError::SheetTooLarge {
            rows: sheet.rows.len(),
            cols: width,
        });
    }

    let strings = SharedStrings::collect(sheet);

    // -- Globals ----------------------------------------------------------------
    let mut globals = Vec::<u8>::new();
    push_record(&mut globals, RECORD_BOF, &bof(BOF_DT_WORKBOOK_GLOBALS));
    push_record(&mut globals, RECORD_CODEPAGE, &CODEPAGE_UNICODE.to_le_bytes());
    push_record(&mut globals, RECORD_WINDOW1, &window1());
    push_record(&mut globals, RECORD_FONT, &font("Arial"));

    for _ in 0..STYLE_XF_COUNT {
        push_record(&mut globals, RECORD_XF, &xf_record(0, 0, true));
    }
    push_record(&mut globals, RECORD_XF, &xf_record(0, 0, false));
    push_record(&mut globals, RECORD_STYLE, &builtin_normal_style());

    let boundsheet_start = globals.len();
    let mut boundsheet = Vec::<u8>::new();
    boundsheet.extend_from_slice(&0u32.to_le_bytes()); // lbPlyPos, patched below
    boundsheet.extend_from_slice(&0u16.to_le_bytes()); // visible worksheet
    write_short_unicode_string(&mut boundsheet, &sheet.name)?;
    push_record(&mut globals, RECORD_BOUNDSHEET, &boundsheet);
    let boundsheet_offset_pos = boundsheet_start + 4;

    push_sst(&mut globals, &strings)?;
    push_record(&mut globals, RECORD_EOF, &[]);

    // -- Sheet ------------------------------------------------------------------
    let sheet_offset = globals.len() as u32;
    globals[boundsheet_offset_pos..boundsheet_offset_pos + 4]
        .copy_from_slice(&sheet_offset.to_le_bytes());

    globals.extend_from_slice(&sheet_substream(sheet, width, &strings));
    Ok(globals)
}

fn sheet_substream(sheet: &SheetGrid, width: usize, strings: &SharedStrings) -> Vec<u8> {
    let mut out = Vec::<u8>::new();
    push_record(&mut out, RECORD_BOF, &bof(BOF_DT_WORKSHEET));

    let mut dims = Vec::<u8>::new();
    dims.extend_from_slice(&0u32.to_le_bytes()); // first row
    dims.extend_from_slice(&(sheet.rows.len() as u32).to_le_bytes()); // last row + 1
    dims.extend_from_slice(&0u16.to_le_bytes()); // first col
    dims.extend_from_slice(&(width as u16).to_le_bytes()); // last col + 1
    dims.extend_from_slice(&0u16.to_le_bytes()); // reserved
    push_record(&mut out, RECORD_DIMENSIONS, &dims);

    for (r, row) in sheet.rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let (r, c) = (r as u16, c as u16);
            match cell {
                OutCell::Blank => push_record(&mut out, RECORD_BLANK, &blank_cell(r, c)),
                OutCell::Number(v) => push_record(&mut out, RECORD_NUMBER, &number_cell(r, c, *v)),
                OutCell::Text(s) => {
                    let isst = strings.index_of(s);
                    push_record(&mut out, RECORD_LABELSST, &labelsst_cell(r, c, isst));
                }
            }
        }
    }

    push_record(&mut out, RECORD_WINDOW2, &window2());
    push_record(&mut out, RECORD_EOF, &[]);
    out
}

// =============================================================================
// Shared string table
// =============================================================================

struct SharedStrings {
    unique: Vec<String>,
    index: HashMap<String, u32>,
    total: u32,
}

impl SharedStrings {
    fn collect(sheet: &SheetGrid) -> Self {
        let mut unique = Vec::new();
        let mut index = HashMap::new();
        let mut total = 0u32;
        for cell in sheet.rows.iter().flatten() {
            if let OutCell::Text(s) = cell {
                total += 1;
                if !index.contains_key(s) {
                    index.insert(s.clone(), unique.len() as u32);
                    unique.push(s.clone());
                }
            }
        }
        Self { unique, index, total }
    }

    fn index_of(&self, s: &str) -> u32 {
        self.index.get(s).copied().unwrap_or(0)
    }
}

/// SST followed by CONTINUE records; strings never straddle a record boundary.
fn push_sst(out: &mut Vec<u8>, strings: &SharedStrings) -> OutputResult<()> {
    let mut chunks: Vec<Vec<u8>> = vec![Vec::new()];
    chunks[0].extend_from_slice(&strings.total.to_le_bytes());
    chunks[0].extend_from_slice(&(strings.unique.len() as u32).to_le_bytes());

    for s in &strings.unique {
        let encoded = unicode_string(s)?;
        let fits = chunks
            .last()
            .map(|c| c.len() + encoded.len() <= MAX_RECORD_DATA)
            .unwrap_or(false);
        if !fits {
            chunks.push(Vec::new());
        }
        if let Some(current) = chunks.last_mut() {
            current.extend_from_slice(&encoded);
        }
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let id = if i == 0 { RECORD_SST } else { RECORD_CONTINUE };
        push_record(out, id, chunk);
    }
    Ok(())
}

/// XLUnicodeString, always stored uncompressed: [cch: u16][flags=1][utf-16le].
fn unicode_string(s: &str) -> OutputResult<Vec<u8>> {
    let units: Vec<u16> = s.encode_utf16().collect();
    if 3 + units.len() * 2 > MAX_RECORD_DATA {
        return Err(OutputError::StringTooLong(units.len()));
    }
    let mut out = Vec::with_capacity(3 + units.len() * 2);
    out.extend_from_slice(&(units.len() as u16).to_le_bytes());
    out.push(0x01);
    for unit in units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    Ok(out)
}

/// ShortXLUnicodeString: [cch: u8][flags][chars]; compressed when Latin-1.
fn write_short_unicode_string(out: &mut Vec<u8>, s: &str) -> OutputResult<()> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len: u8 = units
        .len()
        .try_into()
        .map_err(|_| OutputError::StringTooLong(units.len()))?;
    out.push(len);
    if units.iter().all(|&u| u <= 0xFF) {
        out.push(0);
        out.extend(units.iter().map(|&u| u as u8));
    } else {
        out.push(1);
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    }
    Ok(())
}

// =============================================================================
// Record payloads
// =============================================================================

fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

fn bof(dt: u16) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..2].copy_from_slice(&BOF_VERSION_BIFF8.to_le_bytes());
    out[2..4].copy_from_slice(&dt.to_le_bytes());
    out[4..6].copy_from_slice(&0x0DBBu16.to_le_bytes()); // build
    out[6..8].copy_from_slice(&0x07CCu16.to_le_bytes()); // year
    out
}

fn window1() -> [u8; 18] {
    let mut out = [0u8; 18];
    out[14..16].copy_from_slice(&1u16.to_le_bytes()); // cTabSel
    out[16..18].copy_from_slice(&600u16.to_le_bytes()); // wTabRatio
    out
}

fn window2() -> [u8; 18] {
    let mut out = [0u8; 18];
    out[0..2].copy_from_slice(&0x02B6u16.to_le_bytes());
    out
}

fn font(name: &str) -> Vec<u8> {
    let mut out = Vec::<u8>::new();
    out.extend_from_slice(&200u16.to_le_bytes()); // 10pt
    out.extend_from_slice(&0u16.to_le_bytes()); // flags
    out.extend_from_slice(&COLOR_AUTOMATIC.to_le_bytes());
    out.extend_from_slice(&400u16.to_le_bytes()); // weight
    out.extend_from_slice(&0u16.to_le_bytes()); // escapement
    out.extend_from_slice(&[0, 0, 0, 0]); // underline, family, charset, reserved
    out.push(name.len() as u8);
    out.push(0);
    out.extend_from_slice(name.as_bytes());
    out
}

fn xf_record(font_idx: u16, fmt_idx: u16, is_style_xf: bool) -> [u8; 20] {
    let mut out = [0u8; 20];
    out[0..2].copy_from_slice(&font_idx.to_le_bytes());
    out[2..4].copy_from_slice(&fmt_idx.to_le_bytes());
    let flags: u16 = XF_FLAG_LOCKED | if is_style_xf { XF_FLAG_STYLE | 0xFFF0 } else { 0 };
    out[4..6].copy_from_slice(&flags.to_le_bytes());
    out[6] = 0x20; // General, bottom aligned
    out[9] = if is_style_xf { 0 } else { 0x3F };
    out
}

fn builtin_normal_style() -> [u8; 4] {
    let mut out = [0u8; 4];
    out[0..2].copy_from_slice(&0x8000u16.to_le_bytes()); // built-in, XF 0
    out[2] = 0x00; // Normal
    out[3] = 0xFF;
    out
}

fn labelsst_cell(row: u16, col: u16, isst: u32) -> [u8; 10] {
    let mut out = [0u8; 10];
    out[0..2].copy_from_slice(&row.to_le_bytes());
    out[2..4].copy_from_slice(&col.to_le_bytes());
    out[4..6].copy_from_slice(&CELL_XF.to_le_bytes());
    out[6..10].copy_from_slice(&isst.to_le_bytes());
    out
}

fn number_cell(row: u16, col: u16, v: f64) -> [u8; 14] {
    let mut out = [0u8; 14];
    out[0..2].copy_from_slice(&row.to_le_bytes());
    out[2..4].copy_from_slice(&col.to_le_bytes());
    out[4..6].copy_from_slice(&CELL_XF.to_le_bytes());
    out[6..14].copy_from_slice(&v.to_le_bytes());
    out
}

fn blank_cell(row: u16, col: u16) -> [u8; 6] {
    let mut out = [0u8; 6];
    out[0..2].copy_from_slice(&row.to_le_bytes());
    out[2..4].copy_from_slice(&col.to_le_bytes());
    out[4..6].copy_from_slice(&CELL_XF.to_le_bytes());
    out
}
