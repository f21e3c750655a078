use comfy_table::{Cell, Table};

use crate::batches;
use crate::error::Result;
use crate::models::{LedgerCategory, Scenario};
use crate::response;

use super::open_db;

pub fn list(tab: Option<&str>, scenario: Option<&str>, json: bool) -> Result<()> {
    let category = tab.map(str::parse::<LedgerCategory>).transpose()?;
    let scenario = scenario.map(str::parse::<Scenario>).transpose()?;
    let (_settings, conn) = open_db()?;
    let rows = batches::list(&conn, category.map(|c| c.table()), scenario)?;

    if json {
        return response::print_success(&rows);
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Tab", "Scenario", "File", "Sheet", "Created"]);
    for b in &rows {
        table.add_row(vec![
            Cell::new(b.id),
            Cell::new(&b.tab),
            Cell::new(b.scenario),
            Cell::new(&b.source_file_name),
            Cell::new(&b.sheet_name),
            Cell::new(&b.created_at),
        ]);
    }
    println!("Import batches\n{table}");
    Ok(())
}
