//! Traces one income-statement cell back to the ledger rows behind it.

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::error::{CuadreError, Result};
use crate::layout;
use crate::ledger::{self, CodeFilter};
use crate::models::{validate_month, validate_year, LedgerCategory, Scenario, LEAF_CODE_LEN};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub code: String,
    /// Signed as it enters the statement.
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Formula {
    /// The code has its own row; `stored` is the unsigned ledger value.
    Direct { code: String, stored: f64 },
    /// Parent code: sum of its leaf accounts.
    Sum { components: Vec<Component> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Origin {
    pub year: i32,
    pub month: u32,
    pub scenario: Scenario,
    pub code: String,
    pub value_eri: f64,
    pub origin_table: String,
    pub formula: Formula,
}

fn validate_code(code: &str) -> Result<&str> {
    let code = code.trim();
    if code.is_empty() || code.len() > LEAF_CODE_LEN || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(CuadreError::Validation(format!(
            "account code must be 1 to {LEAF_CODE_LEN} digits, got '{code}'"
        )));
    }
    Ok(code)
}

pub fn explain(conn: &Connection, year: i32, code: &str, month: u32, scenario: Scenario) -> Result<Origin> {
    validate_year(year)?;
    validate_month(month)?;
    let code = validate_code(code)?;

    let category = LedgerCategory::from_code(code).ok_or_else(|| {
        CuadreError::NotFound(format!("no ledger tab for accounts starting with '{}'", &code[..1]))
    })?;
    let table = category.table();
    let layout = layout::inspect(conn, table)?;
    let sign = category.sign();

    let exact = ledger::month_values(conn, &layout, year, scenario, month, CodeFilter::Exact(code))?;
    let (value_eri, formula) = if let Some((found, stored)) = exact.into_iter().next() {
        (stored * sign, Formula::Direct { code: found, stored })
    } else {
        let children = ledger::month_values(conn, &layout, year, scenario, month, CodeFilter::Children(code))?;
        if children.is_empty() {
            return Err(CuadreError::NotFound(format!(
                "no data for account {code} in {table} for {year} ({scenario})"
            )));
        }
        let components: Vec<Component> = children
            .into_iter()
            .map(|(code, stored)| Component { code, value: stored * sign })
            .collect();
        let value = components.iter().map(|c| c.value).sum();
        (value, Formula::Sum { components })
    };

    debug!(code, table, value_eri, "origin resolved");
    Ok(Origin {
        year,
        month,
        scenario,
        code: code.to_string(),
        value_eri,
        origin_table: table.to_string(),
        formula,
    })
}
