use rusqlite::types::Value;
use rusqlite::Connection;

use crate::error::Result;
use crate::layout::{quote, LedgerLayout, MonthLayout};
use crate::models::{LedgerRow, MonthlyValues, Scenario, LEAF_CODE_LEN};

impl Scenario {
    /// Stored spellings accepted when reading ledger tables.
    pub fn stored_aliases(&self) -> [&'static str; 2] {
        match self {
            Self::Budget => ["BUDGET", "PRESUPUESTO"],
            Self::Actual => ["ACTUAL", "REAL"],
        }
    }
}

/// Which codes a month lookup covers.
#[derive(Debug, Clone)]
pub enum CodeFilter<'a> {
    Exact(&'a str),
    /// Leaf codes under a parent prefix.
    Children(&'a str),
}

fn code_expr(layout: &LedgerLayout) -> String {
    format!("CAST({} AS TEXT)", quote(&layout.code))
}

fn period_clause(layout: &LedgerLayout) -> String {
    format!(
        "CAST({} AS INTEGER) = ?1 AND UPPER(TRIM({})) IN (?2, ?3)",
        quote(&layout.year),
        quote(&layout.scenario)
    )
}

fn period_params(year: i32, scenario: Scenario) -> Vec<Value> {
    let [a, b] = scenario.stored_aliases();
    vec![Value::Integer(year as i64), Value::Text(a.into()), Value::Text(b.into())]
}

/// Insert or update one ledger row on its natural key.
pub fn upsert_row(conn: &Connection, layout: &LedgerLayout, row: &LedgerRow) -> Result<()> {
    let mut columns = vec![layout.code.clone(), layout.year.clone(), layout.scenario.clone()];
    let mut values = vec![
        Value::Text(row.code.clone()),
        Value::Integer(row.year as i64),
        Value::Text(row.scenario.as_str().into()),
    ];
    if let Some(desc) = &layout.description {
        columns.push(desc.clone());
        values.push(Value::Text(row.description.clone()));
    }
    let key = [&layout.scenario, &layout.year, &layout.code]
        .map(|c| quote(c))
        .join(", ");

    match &layout.months {
        MonthLayout::Abbreviated(month_cols) | MonthLayout::FullName(month_cols) => {
            for (col, v) in month_cols.iter().zip(row.months.iter()) {
                columns.push(col.clone());
                values.push(Value::Real(*v));
            }
            if let Some(total) = &layout.total {
                columns.push(total.clone());
                values.push(Value::Real(row.total()));
            }
            let sql = upsert_sql(&layout.quoted_table(), &columns, &key, 3);
            conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        }
        MonthLayout::Long { month, value } => {
            columns.push(month.clone());
            columns.push(value.clone());
            let key = format!("{key}, {}", quote(month));
            let sql = upsert_sql(&layout.quoted_table(), &columns, &key, 3);
            let mut stmt = conn.prepare(&sql)?;
            for (idx, v) in row.months.iter().enumerate() {
                let mut month_values = values.clone();
                month_values.push(Value::Integer(idx as i64 + 1));
                month_values.push(Value::Real(*v));
                stmt.execute(rusqlite::params_from_iter(month_values.iter()))?;
            }
        }
    }
    Ok(())
}

/// Columns after the first `key_len` are overwritten on conflict.
fn upsert_sql(table: &str, columns: &[String], conflict_key: &str, key_len: usize) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = names[key_len..]
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT({conflict_key}) DO UPDATE SET {}",
        names.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}

/// Sum of every row of the table per month, unsigned.
pub fn monthly_sum(conn: &Connection, layout: &LedgerLayout, year: i32, scenario: Scenario) -> Result<MonthlyValues> {
    let sums: Vec<String> = layout
        .month_exprs()
        .iter()
        .map(|e| format!("COALESCE(SUM({e}), 0)"))
        .collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        sums.join(", "),
        layout.quoted_table(),
        period_clause(layout)
    );
    let params = period_params(year, scenario);
    let months = conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| {
        let mut months = MonthlyValues::zero();
        for m in 1..=12u32 {
            months.add_to(m, row.get::<_, f64>((m - 1) as usize)?);
        }
        Ok(months)
    })?;
    Ok(months)
}

/// All accounts of the table for a period, one entry per code.
pub fn load_rows(conn: &Connection, layout: &LedgerLayout, year: i32, scenario: Scenario) -> Result<Vec<LedgerRow>> {
    let description = layout
        .description
        .as_ref()
        .map(|d| format!("COALESCE(MAX({}), '')", quote(d)))
        .unwrap_or_else(|| "''".to_string());
    let sums: Vec<String> = layout
        .month_exprs()
        .iter()
        .map(|e| format!("COALESCE(SUM({e}), 0)"))
        .collect();
    let code = code_expr(layout);
    let sql = format!(
        "SELECT {code}, {description}, {} FROM {} WHERE {} GROUP BY {code} ORDER BY {code}",
        sums.join(", "),
        layout.quoted_table(),
        period_clause(layout)
    );
    let params = period_params(year, scenario);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let mut months = MonthlyValues::zero();
            for m in 1..=12u32 {
                months.add_to(m, row.get::<_, f64>((m + 1) as usize)?);
            }
            Ok(LedgerRow {
                code: row.get(0)?,
                description: row.get(1)?,
                year,
                scenario,
                months,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Stored (unsigned) value of one month per matching code, ordered by code.
pub fn month_values(
    conn: &Connection,
    layout: &LedgerLayout,
    year: i32,
    scenario: Scenario,
    month: u32,
    filter: CodeFilter<'_>,
) -> Result<Vec<(String, f64)>> {
    let code = code_expr(layout);
    let (condition, arg) = match filter {
        CodeFilter::Exact(c) => (format!("{code} = ?4"), c),
        CodeFilter::Children(prefix) => (
            format!("{code} LIKE ?4 || '%' AND length({code}) = {LEAF_CODE_LEN}"),
            prefix,
        ),
    };
    let sql = format!(
        "SELECT {code}, COALESCE(SUM({}), 0) FROM {} WHERE {} AND {condition} GROUP BY {code} ORDER BY {code}",
        layout.month_expr(month),
        layout.quoted_table(),
        period_clause(layout)
    );
    let mut params = period_params(year, scenario);
    params.push(Value::Text(arg.to_string()));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::tests::test_db;
    use crate::layout::inspect;

    pub(crate) fn row(code: &str, year: i32, scenario: Scenario, values: &[(u32, f64)]) -> LedgerRow {
        let mut months = MonthlyValues::zero();
        for (m, v) in values {
            months.add_to(*m, *v);
        }
        LedgerRow {
            code: code.to_string(),
            description: format!("Cuenta {code}"),
            year,
            scenario,
            months,
        }
    }

    pub(crate) fn create_long_table(conn: &Connection, table: &str) {
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (
                 id INTEGER PRIMARY KEY,
                 codigo TEXT NOT NULL,
                 descripcion TEXT,
                 anio INTEGER NOT NULL,
                 tipo TEXT NOT NULL,
                 mes INTEGER NOT NULL,
                 valor REAL NOT NULL DEFAULT 0,
                 UNIQUE (tipo, anio, codigo, mes)
             );"
        ))
        .unwrap();
    }

    pub(crate) fn create_full_name_table(conn: &Connection, table: &str) {
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (
                 code TEXT NOT NULL, description TEXT, year INTEGER NOT NULL, scenario TEXT NOT NULL,
                 enero REAL DEFAULT 0, febrero REAL DEFAULT 0, marzo REAL DEFAULT 0, abril REAL DEFAULT 0,
                 mayo REAL DEFAULT 0, junio REAL DEFAULT 0, julio REAL DEFAULT 0, agosto REAL DEFAULT 0,
                 septiembre REAL DEFAULT 0, octubre REAL DEFAULT 0, noviembre REAL DEFAULT 0,
                 diciembre REAL DEFAULT 0,
                 UNIQUE (scenario, year, code)
             );"
        ))
        .unwrap();
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let (_dir, conn) = test_db();
        let layout = inspect(&conn, "ingresos").unwrap();
        upsert_row(&conn, &layout, &row("1010101", 2025, Scenario::Budget, &[(1, 100.0)])).unwrap();
        upsert_row(&conn, &layout, &row("1010101", 2025, Scenario::Budget, &[(1, 250.0), (2, 5.0)])).unwrap();
        let count: i64 = conn.query_row("SELECT count(*) FROM ingresos", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
        let (ene, total): (f64, f64) = conn
            .query_row("SELECT ene, total FROM ingresos", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(ene, 250.0);
        assert_eq!(total, 255.0);
    }

    #[test]
    fn test_monthly_sum_filters_period() {
        let (_dir, conn) = test_db();
        let layout = inspect(&conn, "costos").unwrap();
        upsert_row(&conn, &layout, &row("5010101", 2025, Scenario::Budget, &[(1, 100.0)])).unwrap();
        upsert_row(&conn, &layout, &row("5010102", 2025, Scenario::Budget, &[(1, 50.0), (3, 7.0)])).unwrap();
        upsert_row(&conn, &layout, &row("5010101", 2025, Scenario::Actual, &[(1, 999.0)])).unwrap();
        upsert_row(&conn, &layout, &row("5010101", 2024, Scenario::Budget, &[(1, 999.0)])).unwrap();
        let sum = monthly_sum(&conn, &layout, 2025, Scenario::Budget).unwrap();
        assert_eq!(sum.get(1), 150.0);
        assert_eq!(sum.get(3), 7.0);
        assert_eq!(sum.total(), 157.0);
    }

    #[test]
    fn test_monthly_sum_empty_table_is_zero() {
        let (_dir, conn) = test_db();
        let layout = inspect(&conn, "otros_ingresos").unwrap();
        let sum = monthly_sum(&conn, &layout, 2025, Scenario::Actual).unwrap();
        assert_eq!(sum, MonthlyValues::zero());
    }

    #[test]
    fn test_long_format_roundtrip_through_layout() {
        let (_dir, conn) = test_db();
        create_long_table(&conn, "gastos_financieros");
        let layout = inspect(&conn, "gastos_financieros").unwrap();
        assert!(matches!(layout.months, MonthLayout::Long { .. }));
        upsert_row(&conn, &layout, &row("7010101", 2025, Scenario::Actual, &[(2, 40.0), (12, 2.5)])).unwrap();
        upsert_row(&conn, &layout, &row("7010101", 2025, Scenario::Actual, &[(2, 45.0), (12, 2.5)])).unwrap();
        let count: i64 = conn.query_row("SELECT count(*) FROM gastos_financieros", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 12);
        let sum = monthly_sum(&conn, &layout, 2025, Scenario::Actual).unwrap();
        assert_eq!(sum.get(2), 45.0);
        assert_eq!(sum.get(12), 2.5);
        let rows = load_rows(&conn, &layout, 2025, Scenario::Actual).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total(), 47.5);
    }

    #[test]
    fn test_reads_spanish_scenario_spellings() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO ingresos (code, year, scenario, ene) VALUES ('1010101', 2025, 'presupuesto', 10)",
            [],
        )
        .unwrap();
        let layout = inspect(&conn, "ingresos").unwrap();
        let sum = monthly_sum(&conn, &layout, 2025, Scenario::Budget).unwrap();
        assert_eq!(sum.get(1), 10.0);
    }

    #[test]
    fn test_month_values_children_only_leaves() {
        let (_dir, conn) = test_db();
        let layout = inspect(&conn, "gastos_operacionales").unwrap();
        for (code, v) in [("6010101", 100.0), ("6010102", 150.0), ("60101", 999.0), ("6020101", 1.0)] {
            upsert_row(&conn, &layout, &row(code, 2025, Scenario::Budget, &[(4, v)])).unwrap();
        }
        let children = month_values(&conn, &layout, 2025, Scenario::Budget, 4, CodeFilter::Children("601")).unwrap();
        assert_eq!(
            children,
            vec![("6010101".to_string(), 100.0), ("6010102".to_string(), 150.0)]
        );
        let exact = month_values(&conn, &layout, 2025, Scenario::Budget, 4, CodeFilter::Exact("60101")).unwrap();
        assert_eq!(exact, vec![("60101".to_string(), 999.0)]);
    }
}
