use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CuadreError;

/// Raw row as read from a spreadsheet or evidence file. Only used at the
/// boundary; keys keep their insertion order.
pub type RowMap = serde_json::Map<String, serde_json::Value>;

/// Length of a leaf account code. Shorter codes are parents.
pub const LEAF_CODE_LEN: usize = 7;

pub const MONTH_LABELS: [&str; 12] = [
    "ENERO", "FEBRERO", "MARZO", "ABRIL", "MAYO", "JUNIO",
    "JULIO", "AGOSTO", "SEPTIEMBRE", "OCTUBRE", "NOVIEMBRE", "DICIEMBRE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scenario {
    Budget,
    Actual,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "BUDGET",
            Self::Actual => "ACTUAL",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl rusqlite::types::FromSql for Scenario {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: CuadreError| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}

impl rusqlite::types::ToSql for Scenario {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromStr for Scenario {
    type Err = CuadreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "budget" | "presupuesto" => Ok(Self::Budget),
            "actual" | "real" => Ok(Self::Actual),
            other => Err(CuadreError::Validation(format!(
                "unknown scenario '{other}' (expected budget or actual)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCategory {
    Income,
    Costs,
    OperatingExpense,
    FinancialExpense,
    OtherIncome,
    OtherExpense,
}

pub const ALL_CATEGORIES: [LedgerCategory; 6] = [
    LedgerCategory::Income,
    LedgerCategory::Costs,
    LedgerCategory::OperatingExpense,
    LedgerCategory::FinancialExpense,
    LedgerCategory::OtherIncome,
    LedgerCategory::OtherExpense,
];

impl LedgerCategory {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Costs => "costs",
            Self::OperatingExpense => "operating_expense",
            Self::FinancialExpense => "financial_expense",
            Self::OtherIncome => "other_income",
            Self::OtherExpense => "other_expense",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Income => "ingresos",
            Self::Costs => "costos",
            Self::OperatingExpense => "gastos_operacionales",
            Self::FinancialExpense => "gastos_financieros",
            Self::OtherIncome => "otros_ingresos",
            Self::OtherExpense => "otros_egresos",
        }
    }

    /// Report heading, also the default sheet name in budget workbooks.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Income => "INGRESOS",
            Self::Costs => "COSTOS",
            Self::OperatingExpense => "GASTOS OPERACIONALES",
            Self::FinancialExpense => "GASTOS FINANCIEROS",
            Self::OtherIncome => "OTROS INGRESOS",
            Self::OtherExpense => "OTROS EGRESOS",
        }
    }

    pub fn leading_digit(&self) -> char {
        match self {
            Self::Income => '1',
            Self::Costs => '5',
            Self::OperatingExpense => '6',
            Self::FinancialExpense => '7',
            Self::OtherIncome => '8',
            Self::OtherExpense => '9',
        }
    }

    /// Polarity applied when a stored (positive) value enters the income statement.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Income | Self::OtherIncome => 1.0,
            _ => -1.0,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let first = code.trim().chars().next()?;
        ALL_CATEGORIES.iter().find(|c| c.leading_digit() == first).copied()
    }

    /// Accepts the category key or its table name.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        ALL_CATEGORIES
            .iter()
            .find(|c| c.key() == key || c.table() == key)
            .copied()
    }
}

impl fmt::Display for LedgerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for LedgerCategory {
    type Err = CuadreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| {
            CuadreError::Validation(format!(
                "unknown ledger tab '{s}' (expected one of: {})",
                ALL_CATEGORIES.iter().map(|c| c.table()).collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Monthly values
// ---------------------------------------------------------------------------

/// Twelve Jan-Dec buckets. Only ever combined by addition and scaling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyValues(pub [f64; 12]);

impl MonthlyValues {
    pub fn zero() -> Self {
        Self([0.0; 12])
    }

    /// Month is 1-based.
    pub fn get(&self, month: u32) -> f64 {
        self.0[(month - 1) as usize]
    }

    pub fn add_to(&mut self, month: u32, value: f64) {
        self.0[(month - 1) as usize] += value;
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self(self.0.map(|v| v * factor))
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self(self.0.map(f))
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.0.iter()
    }
}

impl Add for MonthlyValues {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let mut out = self;
        out += rhs;
        out
    }
}

impl AddAssign for MonthlyValues {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a += b;
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRow {
    pub code: String,
    pub description: String,
    pub year: i32,
    pub scenario: Scenario,
    pub months: MonthlyValues,
}

impl LedgerRow {
    pub fn total(&self) -> f64 {
        self.months.total()
    }

    /// Flat map with code, description, one column per month and TOTAL.
    pub fn to_row_map(&self) -> RowMap {
        let mut map = RowMap::new();
        map.insert("code".into(), self.code.clone().into());
        map.insert("description".into(), self.description.clone().into());
        for (label, v) in MONTH_LABELS.iter().zip(self.months.iter()) {
            map.insert((*label).into(), (*v).into());
        }
        map.insert("TOTAL".into(), self.total().into());
        map
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportBatch {
    pub id: i64,
    pub tab: String,
    pub scenario: Scenario,
    pub source_file_name: String,
    pub sheet_name: String,
    pub created_at: String,
    pub evidence_path: String,
}

pub fn validate_year(year: i32) -> crate::error::Result<i32> {
    if (1000..=9999).contains(&year) {
        Ok(year)
    } else {
        Err(CuadreError::Validation(format!("year must have 4 digits, got {year}")))
    }
}

pub fn validate_month(month: u32) -> crate::error::Result<u32> {
    if (1..=12).contains(&month) {
        Ok(month)
    } else {
        Err(CuadreError::Validation(format!("month must be between 1 and 12, got {month}")))
    }
}
