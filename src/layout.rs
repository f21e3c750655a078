//! Ledger table shape detection.
//!
//! The six ledger tables are structurally alike but not identical: months may
//! be twelve abbreviated columns, twelve full-name columns, or (month, value)
//! rows. Each strategy inspects the column set and, on a match, yields one
//! summable SQL expression per month so every query can be written once.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{CuadreError, Result};

static ABBREVIATED: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sep", "oct", "nov", "dic",
];

static FULL_NAMES: [&[&str]; 12] = [
    &["enero"],
    &["febrero"],
    &["marzo"],
    &["abril"],
    &["mayo"],
    &["junio"],
    &["julio"],
    &["agosto"],
    &["septiembre", "setiembre"],
    &["octubre"],
    &["noviembre"],
    &["diciembre"],
];

const CODE_COLUMNS: &[&str] = &["code", "codigo"];
const YEAR_COLUMNS: &[&str] = &["year", "anio"];
const SCENARIO_COLUMNS: &[&str] = &["scenario", "tipo"];
const DESCRIPTION_COLUMNS: &[&str] = &["description", "descripcion"];
const TOTAL_COLUMNS: &[&str] = &["total"];
const MONTH_NUMBER_COLUMNS: &[&str] = &["month", "mes"];
const VALUE_COLUMNS: &[&str] = &["value", "valor"];

/// Column names of one table, as stored.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    names: Vec<String>,
}

impl ColumnSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// First stored name matching any alias, case-insensitively.
    pub fn find(&self, aliases: &[&str]) -> Option<String> {
        aliases.iter().find_map(|alias| {
            self.names
                .iter()
                .find(|n| n.eq_ignore_ascii_case(alias))
                .cloned()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonthLayout {
    Abbreviated([String; 12]),
    FullName([String; 12]),
    Long { month: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutStrategy {
    Abbreviated,
    FullName,
    Long,
}

/// Tried in this order; first match wins.
pub const STRATEGY_ORDER: [LayoutStrategy; 3] = [
    LayoutStrategy::Abbreviated,
    LayoutStrategy::FullName,
    LayoutStrategy::Long,
];

impl LayoutStrategy {
    pub fn detect(&self, columns: &ColumnSet) -> Option<MonthLayout> {
        match self {
            Self::Abbreviated => {
                month_columns(columns, |i| std::slice::from_ref(&ABBREVIATED[i]))
                    .map(MonthLayout::Abbreviated)
            }
            Self::FullName => month_columns(columns, |i| FULL_NAMES[i]).map(MonthLayout::FullName),
            Self::Long => Some(MonthLayout::Long {
                month: columns.find(MONTH_NUMBER_COLUMNS)?,
                value: columns.find(VALUE_COLUMNS)?,
            }),
        }
    }
}

/// 1-based month for a lowercase, accent-free Spanish month name or abbreviation.
pub fn month_number(name: &str) -> Option<u32> {
    let name = name.trim().to_lowercase();
    ABBREVIATED
        .iter()
        .position(|a| *a == name)
        .or_else(|| FULL_NAMES.iter().position(|names| names.contains(&name.as_str())))
        .map(|i| i as u32 + 1)
}

fn month_columns<'a>(columns: &ColumnSet, aliases: impl Fn(usize) -> &'a [&'a str]) -> Option<[String; 12]> {
    let found: Option<Vec<String>> = (0..12).map(|i| columns.find(aliases(i))).collect();
    found?.try_into().ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerLayout {
    pub table: String,
    pub code: String,
    pub year: String,
    pub scenario: String,
    pub description: Option<String>,
    pub total: Option<String>,
    pub months: MonthLayout,
}

impl LedgerLayout {
    pub fn detect(table: &str, columns: &ColumnSet) -> Result<Self> {
        if columns.is_empty() {
            return Err(CuadreError::structure(table, "table does not exist or has no columns"));
        }
        let required = |aliases: &[&str]| {
            columns.find(aliases).ok_or_else(|| {
                CuadreError::structure(table, format!("missing column {}", aliases.join("/")))
            })
        };
        let code = required(CODE_COLUMNS)?;
        let year = required(YEAR_COLUMNS)?;
        let scenario = required(SCENARIO_COLUMNS)?;

        let months = STRATEGY_ORDER
            .iter()
            .find_map(|strategy| strategy.detect(columns))
            .ok_or_else(|| {
                CuadreError::structure(
                    table,
                    "no abbreviated month columns, full month-name columns or (month, value) pair",
                )
            })?;

        Ok(Self {
            table: table.to_string(),
            code,
            year,
            scenario,
            description: columns.find(DESCRIPTION_COLUMNS),
            total: columns.find(TOTAL_COLUMNS),
            months,
        })
    }

    /// Summable SQL expression yielding the value for a 1-based month.
    pub fn month_expr(&self, month: u32) -> String {
        let idx = (month - 1) as usize;
        match &self.months {
            MonthLayout::Abbreviated(cols) | MonthLayout::FullName(cols) => quote(&cols[idx]),
            MonthLayout::Long { month: m, value } => format!(
                "CASE WHEN CAST({} AS INTEGER) = {month} THEN {} ELSE 0 END",
                quote(m),
                quote(value)
            ),
        }
    }

    pub fn month_exprs(&self) -> [String; 12] {
        std::array::from_fn(|i| self.month_expr(i as u32 + 1))
    }

    pub fn quoted_table(&self) -> String {
        quote(&self.table)
    }
}

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<ColumnSet> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ColumnSet::new(names))
}

pub fn inspect(conn: &Connection, table: &str) -> Result<LedgerLayout> {
    let layout = LedgerLayout::detect(table, &table_columns(conn, table)?)?;
    debug!(table, layout = ?layout.months, "ledger layout detected");
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(extra: &[&str]) -> ColumnSet {
        let mut names = vec!["id", "code", "description", "year", "scenario"];
        names.extend_from_slice(extra);
        ColumnSet::new(names)
    }

    #[test]
    fn test_detects_abbreviated() {
        let layout = LedgerLayout::detect("ingresos", &cols(&ABBREVIATED)).unwrap();
        assert!(matches!(layout.months, MonthLayout::Abbreviated(_)));
        assert_eq!(layout.month_expr(1), "\"ene\"");
        assert_eq!(layout.description.as_deref(), Some("description"));
    }

    #[test]
    fn test_detects_full_names_case_insensitively() {
        let names = [
            "ENERO", "FEBRERO", "MARZO", "ABRIL", "MAYO", "JUNIO",
            "JULIO", "AGOSTO", "SETIEMBRE", "OCTUBRE", "NOVIEMBRE", "DICIEMBRE",
        ];
        let layout = LedgerLayout::detect("costos", &cols(&names)).unwrap();
        assert!(matches!(layout.months, MonthLayout::FullName(_)));
        assert_eq!(layout.month_expr(9), "\"SETIEMBRE\"");
    }

    #[test]
    fn test_detects_long_format() {
        let layout = LedgerLayout::detect("otros_egresos", &cols(&["mes", "valor"])).unwrap();
        assert_eq!(
            layout.months,
            MonthLayout::Long { month: "mes".into(), value: "valor".into() }
        );
        assert_eq!(
            layout.month_expr(3),
            "CASE WHEN CAST(\"mes\" AS INTEGER) = 3 THEN \"valor\" ELSE 0 END"
        );
    }

    #[test]
    fn test_abbreviated_wins_over_long() {
        let mut extra: Vec<&str> = ABBREVIATED.to_vec();
        extra.extend(["month", "value"]);
        let layout = LedgerLayout::detect("ingresos", &cols(&extra)).unwrap();
        assert!(matches!(layout.months, MonthLayout::Abbreviated(_)));
    }

    #[test]
    fn test_incomplete_month_set_falls_through() {
        // Eleven abbreviations and no long-format pair
        let layout = LedgerLayout::detect("costos", &cols(&ABBREVIATED[..11]));
        let err = layout.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StructureMismatch);
        assert!(err.to_string().contains("costos"));
    }

    #[test]
    fn test_missing_key_column() {
        let names = ColumnSet::new(["code", "year", "ene"]);
        let err = LedgerLayout::detect("ingresos", &names).unwrap_err();
        assert!(err.to_string().contains("scenario"));
    }

    #[test]
    fn test_spanish_key_aliases() {
        let mut names = vec!["codigo", "descripcion", "anio", "tipo"];
        names.extend(ABBREVIATED);
        let layout = LedgerLayout::detect("ingresos", &ColumnSet::new(names)).unwrap();
        assert_eq!(layout.code, "codigo");
        assert_eq!(layout.year, "anio");
        assert_eq!(layout.scenario, "tipo");
    }

    #[test]
    fn test_month_number() {
        assert_eq!(month_number("ene"), Some(1));
        assert_eq!(month_number(" Diciembre "), Some(12));
        assert_eq!(month_number("setiembre"), Some(9));
        assert_eq!(month_number("total"), None);
    }

    #[test]
    fn test_inspect_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        let err = inspect(&conn, "gastos_financieros").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StructureMismatch);
    }
}
