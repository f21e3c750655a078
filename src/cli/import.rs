use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::importer::{import_file, ImportRequest};
use crate::models::{LedgerCategory, Scenario};
use crate::response;

use super::open_db;

pub fn run(
    file: &str,
    tab: &str,
    scenario: &str,
    year: i32,
    sheet: Option<&str>,
    validate_only: bool,
    json: bool,
) -> Result<()> {
    let category: LedgerCategory = tab.parse()?;
    let scenario: Scenario = scenario.parse()?;
    let file_path = PathBuf::from(file);
    let (settings, conn) = open_db()?;

    let result = import_file(
        &conn,
        &settings.data_path(),
        &ImportRequest {
            path: &file_path,
            category,
            scenario,
            year,
            sheet,
            validate_only,
        },
    )?;

    if json {
        return response::print_success(&result);
    }

    if validate_only {
        println!("{}", "Validation only: the ledger was not modified.".yellow());
    }
    println!(
        "Batch {} | {} rows read, {} written, {} skipped",
        result.batch.id, result.rows_read, result.rows_written, result.rows_skipped
    );
    println!("Evidence: {}", result.evidence_path.display());

    if !result.warnings.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Row", "Cell", "Warning"]);
        for w in &result.warnings {
            table.add_row(vec![
                Cell::new(w.row),
                Cell::new(w.cell.as_deref().unwrap_or("")),
                Cell::new(&w.message),
            ]);
        }
        println!("{}\n{table}", format!("{} warnings", result.warnings.len()).yellow().bold());
    }
    Ok(())
}
