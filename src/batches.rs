use rusqlite::{Connection, OptionalExtension};

use crate::error::{CuadreError, Result};
use crate::models::{ImportBatch, Scenario};

pub struct NewBatch<'a> {
    pub tab: &'a str,
    pub scenario: Scenario,
    pub source_file_name: &'a str,
    pub sheet_name: &'a str,
    pub evidence_path: &'a str,
}

const SELECT: &str = "SELECT id, tab, scenario, source_file_name, sheet_name, created_at, evidence_path \
                      FROM import_batches";

fn map_batch(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImportBatch> {
    Ok(ImportBatch {
        id: row.get(0)?,
        tab: row.get(1)?,
        scenario: row.get(2)?,
        source_file_name: row.get(3)?,
        sheet_name: row.get(4)?,
        created_at: row.get(5)?,
        evidence_path: row.get(6)?,
    })
}

pub fn create(conn: &Connection, batch: &NewBatch<'_>) -> Result<ImportBatch> {
    conn.execute(
        "INSERT INTO import_batches (tab, scenario, source_file_name, sheet_name, evidence_path) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            batch.tab,
            batch.scenario,
            batch.source_file_name,
            batch.sheet_name,
            batch.evidence_path
        ],
    )?;
    get(conn, conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> Result<ImportBatch> {
    conn.query_row(&format!("{SELECT} WHERE id = ?1"), [id], map_batch)
        .optional()?
        .ok_or_else(|| CuadreError::NotFound(format!("import batch {id}")))
}

/// Most recent batch for a tab when `back` is 0, the one before it when 1.
fn nth_latest(conn: &Connection, tab: &str, scenario: Scenario, back: i64) -> Result<Option<ImportBatch>> {
    Ok(conn
        .query_row(
            &format!("{SELECT} WHERE tab = ?1 AND scenario = ?2 ORDER BY id DESC LIMIT 1 OFFSET ?3"),
            rusqlite::params![tab, scenario, back],
            map_batch,
        )
        .optional()?)
}

pub fn latest(conn: &Connection, tab: &str, scenario: Scenario) -> Result<ImportBatch> {
    nth_latest(conn, tab, scenario, 0)?.ok_or_else(|| {
        CuadreError::NotFound(format!(
            "no import for {tab} ({scenario}); import a file first"
        ))
    })
}

pub fn previous(conn: &Connection, tab: &str, scenario: Scenario) -> Result<ImportBatch> {
    nth_latest(conn, tab, scenario, 1)?.ok_or_else(|| {
        CuadreError::NotFound(format!(
            "no earlier import for {tab} ({scenario}); at least two imports are needed"
        ))
    })
}

pub fn list(conn: &Connection, tab: Option<&str>, scenario: Option<Scenario>) -> Result<Vec<ImportBatch>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT} WHERE (?1 IS NULL OR tab = ?1) AND (?2 IS NULL OR scenario = ?2) ORDER BY id DESC"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![tab, scenario], map_batch)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_db;

    fn add(conn: &Connection, tab: &str, scenario: Scenario, path: &str) -> ImportBatch {
        create(
            conn,
            &NewBatch {
                tab,
                scenario,
                source_file_name: "presupuesto.xlsx",
                sheet_name: "INGRESOS",
                evidence_path: path,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, conn) = test_db();
        let batch = add(&conn, "ingresos", Scenario::Budget, "/e/1.json");
        assert_eq!(batch.tab, "ingresos");
        assert_eq!(batch.scenario, Scenario::Budget);
        assert!(!batch.created_at.is_empty());
        assert_eq!(get(&conn, batch.id).unwrap().evidence_path, "/e/1.json");
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (_dir, conn) = test_db();
        assert_eq!(get(&conn, 42).unwrap_err().kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn test_latest_and_previous() {
        let (_dir, conn) = test_db();
        add(&conn, "ingresos", Scenario::Budget, "/e/1.json");
        add(&conn, "ingresos", Scenario::Budget, "/e/2.json");
        add(&conn, "ingresos", Scenario::Actual, "/e/3.json");
        add(&conn, "costos", Scenario::Budget, "/e/4.json");
        assert_eq!(latest(&conn, "ingresos", Scenario::Budget).unwrap().evidence_path, "/e/2.json");
        assert_eq!(previous(&conn, "ingresos", Scenario::Budget).unwrap().evidence_path, "/e/1.json");
        assert!(previous(&conn, "costos", Scenario::Budget).is_err());
    }

    #[test]
    fn test_latest_without_imports_suggests_import() {
        let (_dir, conn) = test_db();
        let err = latest(&conn, "ingresos", Scenario::Budget).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert!(err.to_string().contains("import a file first"));
    }

    #[test]
    fn test_list_filters() {
        let (_dir, conn) = test_db();
        add(&conn, "ingresos", Scenario::Budget, "/e/1.json");
        add(&conn, "ingresos", Scenario::Actual, "/e/2.json");
        add(&conn, "costos", Scenario::Budget, "/e/3.json");
        assert_eq!(list(&conn, None, None).unwrap().len(), 3);
        assert_eq!(list(&conn, Some("ingresos"), None).unwrap().len(), 2);
        assert_eq!(list(&conn, None, Some(Scenario::Budget)).unwrap().len(), 2);
        let newest_first = list(&conn, None, None).unwrap();
        assert_eq!(newest_first[0].evidence_path, "/e/3.json");
    }
}
