use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::models::ALL_CATEGORIES;

pub const DB_FILE: &str = "cuadre.db";

pub const BATCH_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS import_batches (
    id INTEGER PRIMARY KEY,
    tab TEXT NOT NULL,
    scenario TEXT NOT NULL,
    source_file_name TEXT NOT NULL,
    sheet_name TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    evidence_path TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_import_batches_tab ON import_batches (tab, scenario, id);
";

/// Default ledger shape: one row per (scenario, year, code), abbreviated
/// month columns. Tables created elsewhere may use other shapes; see `layout`.
fn ledger_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    year INTEGER NOT NULL,
    scenario TEXT NOT NULL,
    ene REAL NOT NULL DEFAULT 0,
    feb REAL NOT NULL DEFAULT 0,
    mar REAL NOT NULL DEFAULT 0,
    abr REAL NOT NULL DEFAULT 0,
    may REAL NOT NULL DEFAULT 0,
    jun REAL NOT NULL DEFAULT 0,
    jul REAL NOT NULL DEFAULT 0,
    ago REAL NOT NULL DEFAULT 0,
    sep REAL NOT NULL DEFAULT 0,
    oct REAL NOT NULL DEFAULT 0,
    nov REAL NOT NULL DEFAULT 0,
    dic REAL NOT NULL DEFAULT 0,
    total REAL NOT NULL DEFAULT 0,
    UNIQUE (scenario, year, code)
);"
    )
}

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(BATCH_SCHEMA)?;
    for category in ALL_CATEGORIES {
        conn.execute_batch(&ledger_table_sql(category.table()))?;
    }
    Ok(())
}
