//! Read-only access to workbook sheets (calamine) and CSV files as a grid of
//! cells addressed by absolute 0-based (row, column).

use std::collections::HashMap;
use std::path::Path;

use calamine::{Data, Reader};
use serde_json::Value;
use tracing::warn;

use crate::error::{CuadreError, Result};
use crate::models::RowMap;
use crate::normalize::{self, ParsedNumber};

/// Sheet row number (1-based) stored in every row-map read from a sheet.
pub const ROW_MARKER: &str = "_row";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(String),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn parse_number(&self) -> ParsedNumber {
        match self {
            Self::Empty => ParsedNumber::EMPTY,
            Self::Number(n) => normalize::parse_float(*n),
            Self::Text(s) => normalize::parse_text(s),
            Self::Bool(_) | Self::Error(_) => ParsedNumber::INVALID,
        }
    }

    /// Display text, integers without a trailing `.0`.
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
            Self::Bool(b) => b.to_string().to_uppercase(),
            Self::Error(e) => e.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Number(n) => serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            Self::Text(s) if s.trim().is_empty() => Value::Null,
            Self::Text(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Error(e) => Value::String(e.clone()),
        }
    }
}

fn from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    DataOnly,
    /// Also load formula text so computed cells can be told apart from literals.
    WithFormulas,
}

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    cells: Vec<Vec<CellValue>>,
    formulas: HashMap<(usize, usize), String>,
}

impl Sheet {
    pub fn from_rows(name: &str, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.to_string(),
            cells: rows,
            formulas: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_formula(mut self, row: usize, col: usize, formula: &str) -> Self {
        self.formulas.insert((row, col), formula.to_string());
        self
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row(&self, row: usize) -> &[CellValue] {
        self.cells.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn formula(&self, row: usize, col: usize) -> Option<&str> {
        self.formulas.get(&(row, col)).map(String::as_str)
    }
}

/// Convert column index to Excel column letter (0 = A, 25 = Z, 26 = AA, etc.)
pub fn col_to_letter(col: usize) -> String {
    let mut result = String::new();
    let mut n = col + 1;
    while n > 0 {
        n -= 1;
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    result
}

/// Cell reference like `C7` for absolute 0-based coordinates.
pub fn cell_ref(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letter(col), row + 1)
}

fn is_workbook(path: &Path) -> Option<bool> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(true),
        "csv" => Some(false),
        _ => None,
    }
}

pub fn is_spreadsheet_path(path: &Path) -> bool {
    is_workbook(path).is_some()
}

/// Open one sheet. `None` selects the first sheet; CSV files have a single
/// sheet named after the file.
pub fn read_sheet(path: &Path, sheet: Option<&str>, mode: ReadMode) -> Result<Sheet> {
    match is_workbook(path) {
        Some(true) => read_workbook_sheet(path, sheet, mode),
        Some(false) => read_csv(path),
        None => Err(CuadreError::Validation(format!(
            "unsupported file type: {} (expected .xlsx, .xls, .ods or .csv)",
            path.display()
        ))),
    }
}

fn read_workbook_sheet(path: &Path, sheet: Option<&str>, mode: ReadMode) -> Result<Sheet> {
    let mut workbook = calamine::open_workbook_auto(path).map_err(|e| CuadreError::file(path, e))?;
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|n| n.trim().eq_ignore_ascii_case(wanted.trim()))
            .cloned()
            .ok_or_else(|| {
                CuadreError::structure(
                    wanted,
                    format!("sheet not found in {} (available: {})", path.display(), names.join(", ")),
                )
            })?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| CuadreError::structure(path.display().to_string(), "workbook has no sheets"))?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| CuadreError::file(path, e))?;
    let (start_row, start_col) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); start_row];
    for row in range.rows() {
        let mut out = vec![CellValue::Empty; start_col];
        out.extend(row.iter().map(from_data));
        cells.push(out);
    }

    let mut formulas = HashMap::new();
    if mode == ReadMode::WithFormulas {
        match workbook.worksheet_formula(&name) {
            Ok(frange) => {
                let (fr, fc) = frange
                    .start()
                    .map(|(r, c)| (r as usize, c as usize))
                    .unwrap_or((0, 0));
                for (r, c, formula) in frange.used_cells() {
                    if !formula.is_empty() {
                        formulas.insert((fr + r, fc + c), formula.clone());
                    }
                }
            }
            Err(e) => warn!(sheet = %name, error = %e, "formula read failed, continuing without formulas"),
        }
    }

    Ok(Sheet { name, cells, formulas })
}

fn read_csv(path: &Path) -> Result<Sheet> {
    let file = std::fs::File::open(path).map_err(|e| CuadreError::file(path, e))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut cells = Vec::new();
    for result in rdr.records() {
        let record = result?;
        cells.push(
            record
                .iter()
                .map(|f| {
                    if f.trim().is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(f.to_string())
                    }
                })
                .collect(),
        );
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Sheet::from_rows(&name, cells))
}

/// Generic row-maps for comparison: the first row with two or more non-empty
/// cells is the header; every later non-blank row becomes one map.
pub fn rows_as_maps(sheet: &Sheet) -> Vec<RowMap> {
    let Some(header_row) = (0..sheet.height())
        .find(|&r| sheet.row(r).iter().filter(|c| !c.is_empty()).count() >= 2)
    else {
        return Vec::new();
    };

    let mut headers: Vec<String> = Vec::new();
    for (col, cell) in sheet.row(header_row).iter().enumerate() {
        let base = if cell.is_empty() {
            format!("COL_{}", col_to_letter(col))
        } else {
            cell.as_text()
        };
        let mut name = base.clone();
        let mut n = 2;
        while headers.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        headers.push(name);
    }

    let mut maps = Vec::new();
    for r in header_row + 1..sheet.height() {
        let row = sheet.row(r);
        if row.iter().all(CellValue::is_empty) {
            continue;
        }
        let mut map = RowMap::new();
        map.insert(ROW_MARKER.to_string(), Value::from(r as u64 + 1));
        for (col, header) in headers.iter().enumerate() {
            let cell = sheet.cell(r, col);
            if cell.is_empty() && header.starts_with("COL_") {
                continue;
            }
            map.insert(header.clone(), cell.to_json());
        }
        maps.push(map);
    }
    maps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NumberKind;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_col_to_letter() {
        assert_eq!(col_to_letter(0), "A");
        assert_eq!(col_to_letter(25), "Z");
        assert_eq!(col_to_letter(26), "AA");
        assert_eq!(cell_ref(6, 2), "C7");
    }

    #[test]
    fn test_cell_text_and_json() {
        assert_eq!(CellValue::Number(1010101.0).as_text(), "1010101");
        assert_eq!(CellValue::Number(1.5).as_text(), "1.5");
        assert_eq!(text("  abc ").as_text(), "abc");
        assert_eq!(CellValue::Empty.to_json(), Value::Null);
        assert_eq!(text("1.234,5").parse_number().value, 1234.5);
        assert_eq!(CellValue::Bool(true).parse_number().kind, NumberKind::Invalid);
    }

    #[test]
    fn test_sheet_out_of_range_is_empty() {
        let sheet = Sheet::from_rows("S", vec![vec![text("a")]]);
        assert_eq!(sheet.cell(0, 0), &text("a"));
        assert!(sheet.cell(5, 5).is_empty());
        assert!(sheet.row(9).is_empty());
    }

    #[test]
    fn test_rows_as_maps_skips_title_rows() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![text("Presupuesto 2025")],
                vec![],
                vec![text("CODIGO"), text("ENERO"), CellValue::Empty, text("ENERO")],
                vec![text("1010101"), CellValue::Number(10.0), CellValue::Empty, text("x")],
                vec![],
                vec![text("1010102"), text("1.000")],
            ],
        );
        let maps = rows_as_maps(&sheet);
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0]["_row"], 4);
        assert_eq!(maps[0]["CODIGO"], "1010101");
        assert_eq!(maps[0]["ENERO"], 10.0);
        assert_eq!(maps[0]["ENERO_2"], "x");
        assert!(!maps[0].contains_key("COL_C"));
        assert_eq!(maps[1]["_row"], 6);
    }

    #[test]
    fn test_read_csv_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saldos.csv");
        std::fs::write(&path, "code,ENERO\n1010101,\"1.234,50\"\n").unwrap();
        let sheet = read_sheet(&path, None, ReadMode::DataOnly).unwrap();
        assert_eq!(sheet.name, "saldos");
        assert_eq!(sheet.cell(1, 1).parse_number().value, 1234.5);
        assert!(sheet.formula(1, 1).is_none());
    }

    #[test]
    fn test_unsupported_extension() {
        let err = read_sheet(Path::new("notes.txt"), None, ReadMode::DataOnly).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_missing_workbook_is_io_error() {
        let err = read_sheet(Path::new("/nonexistent/book.xlsx"), None, ReadMode::DataOnly).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }
}
