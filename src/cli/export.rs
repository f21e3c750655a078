use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::export::{eri_table, export, reconciliation_table};
use crate::response;
use crate::settings::{shellexpand_path, Settings};

use super::eri::build_report;
use super::open_db;
use super::reconcile::load_and_reconcile;

#[derive(Serialize)]
struct ExportSummary {
    path: PathBuf,
    rows: usize,
}

fn output_path(settings: &Settings, output: Option<String>, default_name: String) -> PathBuf {
    match output {
        Some(path) => PathBuf::from(shellexpand_path(&path)),
        None => settings.exports_dir().join(default_name),
    }
}

fn report(path: PathBuf, rows: usize, json: bool) -> Result<()> {
    if json {
        return response::print_success(&ExportSummary { path, rows });
    }
    println!("Wrote {rows} rows to {}", path.display());
    Ok(())
}

pub fn reconcile(
    a: &str,
    b: &str,
    only_differences: bool,
    key: Option<&str>,
    output: Option<String>,
    json: bool,
) -> Result<()> {
    let (settings, conn) = open_db()?;
    let result = load_and_reconcile(&conn, a, b, only_differences, key)?;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let path = output_path(&settings, output, format!("conciliacion-{stamp}.csv"));
    let rows = export(&reconciliation_table(&result), &path)?;
    report(path, rows, json)
}

pub fn eri(
    year: i32,
    scenario: &str,
    participation: Option<f64>,
    tax: Option<f64>,
    output: Option<String>,
    json: bool,
) -> Result<()> {
    let (settings, conn) = open_db()?;
    let eri_report = build_report(&conn, &settings, year, scenario, participation, tax)?;
    let default_name = format!("eri-{year}-{}.csv", eri_report.scenario.as_str().to_lowercase());
    let path = output_path(&settings, output, default_name);
    let rows = export(&eri_table(&eri_report), &path)?;
    report(path, rows, json)
}
