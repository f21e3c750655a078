//! CSV and XLSX output for reconciliations and income statements.

use std::path::Path;

use tracing::info;

use crate::eri::EriReport;
use crate::error::{CuadreError, Result};
use crate::models::MONTH_LABELS;
use crate::reconcile::Reconciliation;

#[derive(Debug, Clone, PartialEq)]
pub enum ExportCell {
    Blank,
    Text(String),
    Number(f64),
}

impl ExportCell {
    fn to_field(&self) -> String {
        match self {
            Self::Blank => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

impl From<Option<f64>> for ExportCell {
    fn from(value: Option<f64>) -> Self {
        value.map(Self::Number).unwrap_or(Self::Blank)
    }
}

/// A header row plus data rows, independent of the output format.
#[derive(Debug, Clone, Default)]
pub struct ExportTable {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<ExportCell>>,
}

pub fn reconciliation_table(result: &Reconciliation) -> ExportTable {
    let mut headers = vec!["key".to_string(), "status".to_string(), "differing_columns".to_string()];
    for col in &result.columns.numeric {
        headers.push(format!("{col} A"));
        headers.push(format!("{col} B"));
        headers.push(format!("{col} delta"));
    }

    let rows = result
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                ExportCell::Text(row.key.clone()),
                ExportCell::Text(row.status.to_string()),
                ExportCell::Text(row.differing_columns.join("; ")),
            ];
            for delta in &row.deltas {
                cells.push(delta.a.into());
                cells.push(delta.b.into());
                cells.push(delta.delta.into());
            }
            cells
        })
        .collect();

    ExportTable {
        sheet_name: "Conciliacion".to_string(),
        headers,
        rows,
    }
}

pub fn eri_table(report: &EriReport) -> ExportTable {
    let mut headers = vec!["label".to_string(), "role".to_string()];
    headers.extend(MONTH_LABELS.iter().map(|m| m.to_string()));
    headers.push("TOTAL".to_string());

    let rows = report
        .lines
        .iter()
        .map(|line| {
            let mut cells = vec![
                ExportCell::Text(line.label.clone()),
                ExportCell::Text(line.role.as_str().to_string()),
            ];
            cells.extend(line.values.iter().map(|v| ExportCell::Number(*v)));
            cells.push(ExportCell::Number(line.total));
            cells
        })
        .collect();

    ExportTable {
        sheet_name: format!("ERI {} {}", report.year, report.scenario),
        headers,
        rows,
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

pub fn write_csv(table: &ExportTable, path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(ExportCell::to_field))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(feature = "xlsx")]
pub fn write_xlsx(table: &ExportTable, path: &Path) -> Result<()> {
    use rust_xlsxwriter::{Format, Workbook};

    let xlsx_err = |e: rust_xlsxwriter::XlsxError| CuadreError::Export(format!("{}: {e}", path.display()));
    let bold = Format::new().set_bold();
    let amount = Format::new().set_num_format("#,##0.00");

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    // Sheet names are limited to 31 characters.
    let name: String = table.sheet_name.chars().take(31).collect();
    worksheet.set_name(&name).map_err(xlsx_err)?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &bold)
            .map_err(xlsx_err)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        let row32 = (r + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col16 = col as u16;
            match cell {
                ExportCell::Blank => {}
                ExportCell::Text(s) => {
                    worksheet.write_string(row32, col16, s).map_err(xlsx_err)?;
                }
                ExportCell::Number(n) => {
                    worksheet
                        .write_number_with_format(row32, col16, *n, &amount)
                        .map_err(xlsx_err)?;
                }
            }
        }
    }
    workbook.save(path).map_err(xlsx_err)?;
    Ok(())
}

/// Writes by file extension and returns the number of data rows.
pub fn export(table: &ExportTable, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CuadreError::file(parent, e))?;
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => write_csv(table, path)?,
        #[cfg(feature = "xlsx")]
        "xlsx" => write_xlsx(table, path)?,
        #[cfg(not(feature = "xlsx"))]
        "xlsx" => {
            return Err(CuadreError::Export(
                "XLSX export requires the 'xlsx' feature".to_string(),
            ))
        }
        _ => {
            return Err(CuadreError::Validation(format!(
                "unsupported export format: {} (expected .csv or .xlsx)",
                path.display()
            )))
        }
    }
    info!(path = %path.display(), rows = table.rows.len(), "export written");
    Ok(table.rows.len())
}
