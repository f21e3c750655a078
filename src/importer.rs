use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::batches::{self, NewBatch};
use crate::error::{CuadreError, Result};
use crate::evidence::{self, EvidenceMeta};
use crate::layout;
use crate::ledger;
use crate::models::{validate_year, ImportBatch, LedgerCategory, LedgerRow, MonthlyValues, RowMap, Scenario};
use crate::spreadsheet::{self, cell_ref, ReadMode, Sheet, ROW_MARKER};

/// The header row must appear within this many rows from the top.
pub const HEADER_SCAN_ROWS: usize = 30;

const CODE_HEADERS: &[&str] = &["codigo", "code", "cuenta"];
const DESCRIPTION_HEADERS: &[&str] = &["descripcion", "description", "nombre", "concepto", "detalle"];
const WARNINGS_MARKER: &str = "_warnings";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lowercase and strip Spanish accents so `Código` matches `codigo`.
fn fold(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct HeaderMap {
    row: usize,
    code_col: usize,
    description_col: Option<usize>,
    month_cols: [usize; 12],
}

fn locate_header(sheet: &Sheet) -> Result<HeaderMap> {
    for r in 0..sheet.height().min(HEADER_SCAN_ROWS) {
        let mut code_col = None;
        let mut description_col = None;
        let mut months: [Option<usize>; 12] = [None; 12];
        for (c, cell) in sheet.row(r).iter().enumerate() {
            let name = fold(&cell.as_text());
            if name.is_empty() {
                continue;
            }
            if code_col.is_none() && CODE_HEADERS.contains(&name.as_str()) {
                code_col = Some(c);
            } else if description_col.is_none() && DESCRIPTION_HEADERS.contains(&name.as_str()) {
                description_col = Some(c);
            } else if let Some(m) = layout::month_number(&name) {
                months[(m - 1) as usize].get_or_insert(c);
            }
        }
        let Some(code_col) = code_col else {
            continue;
        };
        if months.iter().all(Option::is_some) {
            return Ok(HeaderMap {
                row: r,
                code_col,
                description_col,
                month_cols: months.map(Option::unwrap_or_default),
            });
        }
    }
    Err(CuadreError::structure(
        sheet.name.as_str(),
        format!("no header row with an account code column and twelve month columns in the first {HEADER_SCAN_ROWS} rows"),
    ))
}

// ---------------------------------------------------------------------------
// Sheet parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportWarning {
    /// 1-based sheet row.
    pub row: usize,
    pub cell: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedLedger {
    pub rows: Vec<LedgerRow>,
    pub evidence: Vec<RowMap>,
    pub warnings: Vec<ImportWarning>,
    pub skipped: usize,
}

/// Turn a ledger sheet into rows for one category. Problems in individual
/// cells become warnings; only a missing header is an error.
pub fn parse_ledger_sheet(sheet: &Sheet, category: LedgerCategory, year: i32, scenario: Scenario) -> Result<ParsedLedger> {
    let header = locate_header(sheet)?;
    let mut parsed = ParsedLedger::default();

    for r in header.row + 1..sheet.height() {
        let sheet_row = r + 1;
        let code = sheet.cell(r, header.code_col).as_text();
        if code.is_empty() {
            continue;
        }
        if !code.chars().all(|c| c.is_ascii_digit()) {
            parsed.skipped += 1;
            parsed.warnings.push(ImportWarning {
                row: sheet_row,
                cell: Some(cell_ref(r, header.code_col)),
                message: format!("account code '{code}' is not numeric; row skipped"),
            });
            continue;
        }
        if LedgerCategory::from_code(&code) != Some(category) {
            parsed.skipped += 1;
            let belongs = LedgerCategory::from_code(&code)
                .map(|c| c.table())
                .unwrap_or("no ledger tab");
            parsed.warnings.push(ImportWarning {
                row: sheet_row,
                cell: Some(cell_ref(r, header.code_col)),
                message: format!("account {code} belongs to {belongs}, not {}; row skipped", category.table()),
            });
            continue;
        }

        let mut row_warnings: Vec<ImportWarning> = Vec::new();
        if let Some(earlier) = parsed.rows.iter().position(|row| row.code == code) {
            row_warnings.push(ImportWarning {
                row: sheet_row,
                cell: Some(cell_ref(r, header.code_col)),
                message: format!("account {code} appears more than once; the later row wins"),
            });
            // `rows` and `evidence` are pushed in step
            parsed.rows.remove(earlier);
            parsed.evidence.remove(earlier);
        }

        let mut months = MonthlyValues::zero();
        for (idx, &col) in header.month_cols.iter().enumerate() {
            let cell = sheet.cell(r, col);
            if cell.is_empty() {
                if let Some(formula) = sheet.formula(r, col) {
                    row_warnings.push(ImportWarning {
                        row: sheet_row,
                        cell: Some(cell_ref(r, col)),
                        message: format!("uncalculated formula ={formula}; read as 0"),
                    });
                }
                continue;
            }
            let number = cell.parse_number();
            if !number.is_numeric() {
                row_warnings.push(ImportWarning {
                    row: sheet_row,
                    cell: Some(cell_ref(r, col)),
                    message: format!("invalid number '{}'; read as 0", cell.as_text()),
                });
            }
            months.add_to(idx as u32 + 1, number.value);
        }

        let description = header
            .description_col
            .map(|c| sheet.cell(r, c).as_text())
            .unwrap_or_default();
        let row = LedgerRow {
            code,
            description,
            year,
            scenario,
            months,
        };
        parsed.evidence.push(evidence_row(sheet_row, &row, &row_warnings));
        parsed.warnings.extend(row_warnings);
        parsed.rows.push(row);
    }
    Ok(parsed)
}

fn evidence_row(sheet_row: usize, row: &LedgerRow, warnings: &[ImportWarning]) -> RowMap {
    let mut map = RowMap::new();
    map.insert(ROW_MARKER.into(), Value::from(sheet_row as u64));
    map.extend(row.to_row_map());
    map.insert(
        WARNINGS_MARKER.into(),
        Value::from(warnings.iter().map(|w| w.message.clone()).collect::<Vec<_>>()),
    );
    map
}

// ---------------------------------------------------------------------------
// import_file
// ---------------------------------------------------------------------------

pub struct ImportRequest<'a> {
    pub path: &'a Path,
    pub category: LedgerCategory,
    pub scenario: Scenario,
    pub year: i32,
    /// Defaults to the sheet named after the category, else the first sheet.
    pub sheet: Option<&'a str>,
    /// Parse, record evidence and a batch, but leave the ledger untouched.
    pub validate_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub batch: ImportBatch,
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub warnings: Vec<ImportWarning>,
    pub evidence_path: PathBuf,
    pub validate_only: bool,
}

fn open_sheet(req: &ImportRequest<'_>) -> Result<Sheet> {
    if let Some(name) = req.sheet {
        return spreadsheet::read_sheet(req.path, Some(name), ReadMode::WithFormulas);
    }
    match spreadsheet::read_sheet(req.path, Some(req.category.label()), ReadMode::WithFormulas) {
        Err(CuadreError::StructureMismatch { .. }) => spreadsheet::read_sheet(req.path, None, ReadMode::WithFormulas),
        other => other,
    }
}

pub fn import_file(conn: &Connection, data_dir: &Path, req: &ImportRequest<'_>) -> Result<ImportResult> {
    validate_year(req.year)?;
    let tab = req.category.table();
    info!(file = %req.path.display(), tab, scenario = %req.scenario, year = req.year, "import started");

    let sheet = open_sheet(req)?;
    let parsed = parse_ledger_sheet(&sheet, req.category, req.year, req.scenario)?;
    for w in &parsed.warnings {
        warn!(row = w.row, cell = w.cell.as_deref().unwrap_or(""), "{}", w.message);
    }

    let ledger_layout = if req.validate_only {
        None
    } else {
        Some(layout::inspect(conn, tab)?)
    };

    let source_file_name = req
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let evidence_path = evidence::new_evidence_path(data_dir, tab, req.scenario);
    let meta = EvidenceMeta {
        tab: tab.to_string(),
        scenario: req.scenario,
        year: req.year,
        source_file_name: source_file_name.clone(),
        sheet_name: sheet.name.clone(),
        created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        warnings: parsed.warnings.len(),
    };

    let tx = conn.unchecked_transaction()?;
    let step = (|| -> Result<ImportBatch> {
        if let Some(ledger_layout) = &ledger_layout {
            for row in &parsed.rows {
                ledger::upsert_row(&tx, ledger_layout, row)?;
            }
        }
        evidence::write(&evidence_path, &parsed.evidence, &meta)?;
        batches::create(
            &tx,
            &NewBatch {
                tab,
                scenario: req.scenario,
                source_file_name: &source_file_name,
                sheet_name: &sheet.name,
                evidence_path: &evidence_path.to_string_lossy(),
            },
        )
    })();
    let committed = step.and_then(|batch| {
        tx.commit()?;
        Ok(batch)
    });
    let batch = match committed {
        Ok(batch) => batch,
        Err(e) => {
            // Dropping the transaction rolls the ledger back; the snapshot goes too.
            let _ = std::fs::remove_file(&evidence_path);
            return Err(e);
        }
    };

    let rows_written = if req.validate_only { 0 } else { parsed.rows.len() };
    info!(
        batch = batch.id,
        rows = parsed.rows.len(),
        written = rows_written,
        skipped = parsed.skipped,
        warnings = parsed.warnings.len(),
        "import finished"
    );

    Ok(ImportResult {
        batch,
        rows_read: parsed.rows.len(),
        rows_written,
        rows_skipped: parsed.skipped,
        warnings: parsed.warnings,
        evidence_path,
        validate_only: req.validate_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_db;
    use crate::error::ErrorKind;
    use crate::models::MONTH_LABELS;
    use crate::spreadsheet::CellValue;

    const MONTHS_HEADER: &str =
        "Enero,Febrero,Marzo,Abril,Mayo,Junio,Julio,Agosto,Septiembre,Octubre,Noviembre,Diciembre";

    fn write_csv(dir: &Path, name: &str, body: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut content = String::from("PRESUPUESTO 2025\nVersion,1\n");
        content.push_str(&format!("Código,Descripción,{MONTHS_HEADER},Total\n"));
        for line in body {
            content.push_str(line);
            content.push('\n');
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn request(path: &Path, category: LedgerCategory) -> ImportRequest<'_> {
        ImportRequest {
            path,
            category,
            scenario: Scenario::Budget,
            year: 2025,
            sheet: None,
            validate_only: false,
        }
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_fold_strips_accents() {
        assert_eq!(fold("  Código "), "codigo");
        assert_eq!(fold("DESCRIPCIÓN"), "descripcion");
    }

    #[test]
    fn test_locate_header_with_abbreviations() {
        let mut header = vec![text("Cuenta"), text("Nombre")];
        header.extend(["ENE", "FEB", "MAR", "ABR", "MAY", "JUN", "JUL", "AGO", "SET", "OCT", "NOV", "DIC"].map(text));
        // `set` is not an abbreviation we know; the row must not match.
        let sheet = Sheet::from_rows("COSTOS", vec![vec![text("x")], header.clone()]);
        assert_eq!(locate_header(&sheet).unwrap_err().kind(), ErrorKind::StructureMismatch);

        header[10] = text("Sep");
        let sheet = Sheet::from_rows("COSTOS", vec![vec![text("x")], header]);
        let found = locate_header(&sheet).unwrap();
        assert_eq!(found.row, 1);
        assert_eq!(found.code_col, 0);
        assert_eq!(found.description_col, Some(1));
        assert_eq!(found.month_cols[0], 2);
        assert_eq!(found.month_cols[11], 13);
    }

    #[test]
    fn test_header_beyond_scan_window_is_rejected() {
        let mut rows = vec![vec![text("nota")]; HEADER_SCAN_ROWS];
        let mut header = vec![text("codigo")];
        header.extend(MONTH_LABELS.map(text));
        rows.push(header);
        let sheet = Sheet::from_rows("INGRESOS", rows);
        let err = locate_header(&sheet).unwrap_err();
        assert!(err.to_string().contains("INGRESOS"));
    }

    #[test]
    fn test_parse_warnings_and_skips() {
        let mut header = vec![text("codigo"), text("descripcion")];
        header.extend(MONTH_LABELS.map(text));
        let mut good = vec![CellValue::Number(1010101.0), text("Ventas"), text("1.234,50"), text("abc")];
        good.resize(14, CellValue::Empty);
        let mut wrong_tab = vec![text("5010101"), text("Costo")];
        wrong_tab.resize(14, CellValue::Number(1.0));
        let mut not_numeric = vec![text("TOTAL"), text("")];
        not_numeric.resize(14, CellValue::Number(1.0));
        let blank = vec![CellValue::Empty, text("subtitulo")];
        let sheet = Sheet::from_rows("INGRESOS", vec![header, good, wrong_tab, not_numeric, blank])
            .with_formula(1, 4, "SUM(C2:D2)");

        let parsed = parse_ledger_sheet(&sheet, LedgerCategory::Income, 2025, Scenario::Budget).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.skipped, 2);
        let row = &parsed.rows[0];
        assert_eq!(row.code, "1010101");
        assert_eq!(row.months.get(1), 1234.5);
        assert_eq!(row.months.get(2), 0.0);

        let messages: Vec<&str> = parsed.warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("invalid number 'abc'")));
        assert!(messages.iter().any(|m| m.contains("uncalculated formula")));
        assert!(messages.iter().any(|m| m.contains("belongs to costos")));
        assert!(messages.iter().any(|m| m.contains("'TOTAL' is not numeric")));
        let formula = parsed.warnings.iter().find(|w| w.message.contains("formula")).unwrap();
        assert_eq!(formula.cell.as_deref(), Some("E2"));

        let evidence = &parsed.evidence[0];
        assert_eq!(evidence["_row"], 2);
        assert_eq!(evidence["ENERO"], 1234.5);
        assert_eq!(evidence["_warnings"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_import_writes_ledger_evidence_and_batch() {
        let (dir, conn) = test_db();
        let csv_path = write_csv(
            dir.path(),
            "ingresos.csv",
            &[
                "1010101,Ventas,\"1.000,00\",200,,,,,,,,,,,1200",
                "1010102,Servicios,50,50,,,,,,,,,,,100",
            ],
        );
        let result = import_file(&conn, dir.path(), &request(&csv_path, LedgerCategory::Income)).unwrap();
        assert_eq!(result.rows_read, 2);
        assert_eq!(result.rows_written, 2);
        assert!(result.warnings.is_empty());
        assert_eq!(result.batch.tab, "ingresos");
        assert_eq!(result.batch.source_file_name, "ingresos.csv");

        let ene: f64 = conn
            .query_row("SELECT ene FROM ingresos WHERE code = '1010101'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(ene, 1000.0);

        let snapshot = evidence::read(&result.evidence_path).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0]["_row"], 4);
        assert_eq!(snapshot[1]["FEBRERO"], 50.0);
    }

    #[test]
    fn test_reimport_updates_in_place() {
        let (dir, conn) = test_db();
        let first = write_csv(dir.path(), "a.csv", &["5010101,Costo,100,,,,,,,,,,,,"]);
        let second = write_csv(dir.path(), "b.csv", &["5010101,Costo,150,,,,,,,,,,,,"]);
        import_file(&conn, dir.path(), &request(&first, LedgerCategory::Costs)).unwrap();
        import_file(&conn, dir.path(), &request(&second, LedgerCategory::Costs)).unwrap();
        let (count, ene): (i64, f64) = conn
            .query_row("SELECT count(*), MAX(ene) FROM costos", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(ene, 150.0);
        assert_eq!(batches::list(&conn, Some("costos"), None).unwrap().len(), 2);
    }

    #[test]
    fn test_validate_only_leaves_ledger_untouched() {
        let (dir, conn) = test_db();
        let csv_path = write_csv(dir.path(), "c.csv", &["1010101,Ventas,10,,,,,,,,,,,,"]);
        let mut req = request(&csv_path, LedgerCategory::Income);
        req.validate_only = true;
        let result = import_file(&conn, dir.path(), &req).unwrap();
        assert_eq!(result.rows_written, 0);
        assert!(result.evidence_path.exists());
        let count: i64 = conn.query_row("SELECT count(*) FROM ingresos", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
        assert_eq!(batches::get(&conn, result.batch.id).unwrap().tab, "ingresos");
    }

    #[test]
    fn test_failed_import_rolls_back() {
        let (dir, conn) = test_db();
        let csv_path = write_csv(dir.path(), "d.csv", &["1010101,Ventas,10,,,,,,,,,,,,"]);
        // Evidence cannot be written when its directory is a file.
        std::fs::write(dir.path().join("evidence"), "blocker").unwrap();
        let err = import_file(&conn, dir.path(), &request(&csv_path, LedgerCategory::Income)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        let rows: i64 = conn.query_row("SELECT count(*) FROM ingresos", [], |r| r.get(0)).unwrap();
        let imports: i64 = conn.query_row("SELECT count(*) FROM import_batches", [], |r| r.get(0)).unwrap();
        assert_eq!((rows, imports), (0, 0));
    }

    #[test]
    fn test_duplicate_code_keeps_only_the_later_row() {
        let (dir, conn) = test_db();
        let csv_path = write_csv(
            dir.path(),
            "dup.csv",
            &["1010101,Ventas,10,,,,,,,,,,,,", "1010102,Otros,5,,,,,,,,,,,,", "1010101,Ventas,30,,,,,,,,,,,,"],
        );
        let result = import_file(&conn, dir.path(), &request(&csv_path, LedgerCategory::Income)).unwrap();
        assert_eq!(result.rows_read, 2);
        assert!(result.warnings.iter().any(|w| w.row == 6 && w.message.contains("more than once")));

        let snapshot = evidence::read(&result.evidence_path).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0]["code"], "1010102");
        assert_eq!(snapshot[1]["code"], "1010101");
        assert_eq!(snapshot[1]["_row"], 6);
        assert_eq!(snapshot[1]["ENERO"], 30.0);

        let ene: f64 = conn
            .query_row("SELECT ene FROM ingresos WHERE code = '1010101'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(ene, 30.0);
    }

    #[test]
    fn test_failed_commit_removes_snapshot() {
        let (dir, conn) = test_db();
        // A deferred foreign key violation only surfaces at COMMIT.
        conn.execute_batch(
            "CREATE TABLE audit_parent (id INTEGER PRIMARY KEY);
             CREATE TABLE audit_child (
                 parent_id INTEGER REFERENCES audit_parent(id) DEFERRABLE INITIALLY DEFERRED
             );
             CREATE TRIGGER audit_batch AFTER INSERT ON import_batches
             BEGIN INSERT INTO audit_child VALUES (999); END;",
        )
        .unwrap();
        let csv_path = write_csv(dir.path(), "e.csv", &["1010101,Ventas,10,,,,,,,,,,,,"]);
        let err = import_file(&conn, dir.path(), &request(&csv_path, LedgerCategory::Income)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let rows: i64 = conn.query_row("SELECT count(*) FROM ingresos", [], |r| r.get(0)).unwrap();
        let imports: i64 = conn.query_row("SELECT count(*) FROM import_batches", [], |r| r.get(0)).unwrap();
        assert_eq!((rows, imports), (0, 0));
        let leftovers = std::fs::read_dir(evidence::evidence_dir(dir.path()))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_missing_header_is_structure_mismatch() {
        let (dir, conn) = test_db();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "a,b,c\n1,2,3\n").unwrap();
        let err = import_file(&conn, dir.path(), &request(&path, LedgerCategory::Income)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructureMismatch);
    }
}
