use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::Connection;

use crate::datasets::DatasetSource;
use crate::error::Result;
use crate::fmt::amount;
use crate::reconcile::{reconcile, ReconcileOptions, Reconciliation, RowStatus};
use crate::response;

use super::open_db;

/// Load both sides and reconcile them. Shared with `export reconcile`.
pub(crate) fn load_and_reconcile(
    conn: &Connection,
    a: &str,
    b: &str,
    only_differences: bool,
    key: Option<&str>,
) -> Result<Reconciliation> {
    let source_a: DatasetSource = a.parse()?;
    let source_b: DatasetSource = b.parse()?;
    let rows_a = source_a.load(conn)?;
    let rows_b = source_b.load(conn)?;
    let options = ReconcileOptions {
        only_differences,
        key_field: key.map(str::to_string),
    };
    Ok(reconcile(&rows_a, &rows_b, &options))
}

fn status_cell(status: RowStatus) -> Cell {
    let label = status.to_string();
    Cell::new(match status {
        RowStatus::Equal => label.dimmed(),
        RowStatus::Changed => label.yellow(),
        RowStatus::NewInA => label.green(),
        RowStatus::MissingInA => label.red(),
    })
}

pub fn run(a: &str, b: &str, only_differences: bool, key: Option<&str>, json: bool) -> Result<()> {
    let (_settings, conn) = open_db()?;
    let result = load_and_reconcile(&conn, a, b, only_differences, key)?;

    if json {
        return response::print_success(&result);
    }

    let s = &result.summary;
    println!(
        "A: {a} ({} rows)  B: {b} ({} rows)\n{} equal, {} changed, {} new in A, {} missing in A",
        s.total_a,
        s.total_b,
        s.equal.to_string().bold(),
        s.changed.to_string().yellow().bold(),
        s.new_in_a.to_string().green().bold(),
        s.missing_in_a.to_string().red().bold(),
    );

    if result.rows.is_empty() {
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Key", "Status", "Columns", "Net delta"]);
    for row in &result.rows {
        let net: f64 = row.deltas.iter().filter_map(|d| d.delta).sum();
        let net = if row.deltas.iter().any(|d| d.delta.is_some()) {
            amount(net)
        } else {
            String::new()
        };
        table.add_row(vec![
            Cell::new(&row.key),
            status_cell(row.status),
            Cell::new(row.differing_columns.join(", ")),
            Cell::new(net),
        ]);
    }
    println!("{table}");
    Ok(())
}
