//! Monthly income statement (ERI) built from the six ledger tables.

use std::collections::HashMap;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CuadreError, Result};
use crate::layout;
use crate::ledger;
use crate::models::{validate_year, LedgerCategory, MonthlyValues, Scenario, ALL_CATEGORIES};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EriConfig {
    /// Workers' share of a positive pre-tax result.
    pub participation_rate: f64,
    pub income_tax_rate: f64,
}

impl Default for EriConfig {
    fn default() -> Self {
        Self {
            participation_rate: 0.15,
            income_tax_rate: 0.25,
        }
    }
}

impl EriConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("participation rate", self.participation_rate),
            ("income tax rate", self.income_tax_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(CuadreError::Validation(format!(
                    "{name} must be between 0 and 1, got {rate}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineRole {
    Header,
    MonthlyTotal,
    Subtotal,
    CalcLine,
    FinalResult,
}

impl LineRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "HEADER",
            Self::MonthlyTotal => "MONTHLY_TOTAL",
            Self::Subtotal => "SUBTOTAL",
            Self::CalcLine => "CALC_LINE",
            Self::FinalResult => "FINAL_RESULT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EriLine {
    pub label: String,
    pub role: LineRole,
    pub values: MonthlyValues,
    pub total: f64,
}

impl EriLine {
    fn new(label: impl Into<String>, role: LineRole, values: MonthlyValues) -> Self {
        Self {
            label: label.into(),
            role,
            values,
            total: values.total(),
        }
    }
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

/// Every step of the statement, month by month. Category vectors are
/// already signed: expenses are negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waterfall {
    pub income: MonthlyValues,
    pub costs: MonthlyValues,
    pub gross_margin: MonthlyValues,
    pub operating_expense: MonthlyValues,
    pub operating_result: MonthlyValues,
    pub other_income: MonthlyValues,
    pub financial_expense: MonthlyValues,
    pub other_expense: MonthlyValues,
    pub pre_tax: MonthlyValues,
    pub participation: MonthlyValues,
    pub income_tax: MonthlyValues,
    pub net_result: MonthlyValues,
}

impl Waterfall {
    /// Categories missing from `signed` count as zero.
    pub fn compute(signed: &HashMap<LedgerCategory, MonthlyValues>, config: &EriConfig) -> Self {
        let get = |c: LedgerCategory| signed.get(&c).copied().unwrap_or_default();

        let income = get(LedgerCategory::Income);
        let costs = get(LedgerCategory::Costs);
        let gross_margin = income + costs;
        let operating_expense = get(LedgerCategory::OperatingExpense);
        let operating_result = gross_margin + operating_expense;
        let other_income = get(LedgerCategory::OtherIncome);
        let financial_expense = get(LedgerCategory::FinancialExpense);
        let other_expense = get(LedgerCategory::OtherExpense);
        let pre_tax = operating_result + other_income + financial_expense + other_expense;

        let participation = pre_tax.map(|v| if v > 0.0 { -v * config.participation_rate } else { 0.0 });
        let taxable = pre_tax + participation;
        let income_tax = taxable.map(|v| if v > 0.0 { -v * config.income_tax_rate } else { 0.0 });
        let net_result = taxable + income_tax;

        Self {
            income,
            costs,
            gross_margin,
            operating_expense,
            operating_result,
            other_income,
            financial_expense,
            other_expense,
            pre_tax,
            participation,
            income_tax,
            net_result,
        }
    }

    fn category(&self, category: LedgerCategory) -> MonthlyValues {
        match category {
            LedgerCategory::Income => self.income,
            LedgerCategory::Costs => self.costs,
            LedgerCategory::OperatingExpense => self.operating_expense,
            LedgerCategory::FinancialExpense => self.financial_expense,
            LedgerCategory::OtherIncome => self.other_income,
            LedgerCategory::OtherExpense => self.other_expense,
        }
    }

    /// Statement lines in presentation order.
    pub fn lines(&self) -> Vec<EriLine> {
        let mut lines = Vec::with_capacity(18);
        let push_category = |lines: &mut Vec<EriLine>, category: LedgerCategory| {
            lines.push(EriLine::new(category.label(), LineRole::Header, MonthlyValues::zero()));
            lines.push(EriLine::new(
                format!("TOTAL {}", category.label()),
                LineRole::MonthlyTotal,
                self.category(category),
            ));
        };

        push_category(&mut lines, LedgerCategory::Income);
        push_category(&mut lines, LedgerCategory::Costs);
        lines.push(EriLine::new("UTILIDAD BRUTA", LineRole::Subtotal, self.gross_margin));
        push_category(&mut lines, LedgerCategory::OperatingExpense);
        lines.push(EriLine::new("RESULTADO OPERACIONAL", LineRole::Subtotal, self.operating_result));
        push_category(&mut lines, LedgerCategory::OtherIncome);
        push_category(&mut lines, LedgerCategory::FinancialExpense);
        push_category(&mut lines, LedgerCategory::OtherExpense);
        lines.push(EriLine::new("UTILIDAD ANTES DE PARTICIPACION E IMPUESTOS", LineRole::Subtotal, self.pre_tax));
        lines.push(EriLine::new("PARTICIPACION TRABAJADORES", LineRole::CalcLine, self.participation));
        lines.push(EriLine::new("IMPUESTO A LA RENTA", LineRole::CalcLine, self.income_tax));
        lines.push(EriLine::new("RESULTADO NETO", LineRole::FinalResult, self.net_result));
        lines
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EriReport {
    pub year: i32,
    pub scenario: Scenario,
    pub config: EriConfig,
    pub lines: Vec<EriLine>,
    pub waterfall: Waterfall,
}

pub struct EriEngine<'a> {
    conn: &'a Connection,
    config: EriConfig,
}

impl<'a> EriEngine<'a> {
    pub fn new(conn: &'a Connection, config: EriConfig) -> Self {
        Self { conn, config }
    }

    /// Signed monthly totals per category. Any table that cannot be read
    /// aborts the whole report.
    pub fn category_totals(&self, year: i32, scenario: Scenario) -> Result<HashMap<LedgerCategory, MonthlyValues>> {
        let mut totals = HashMap::new();
        for category in ALL_CATEGORIES {
            let layout = layout::inspect(self.conn, category.table())?;
            let stored = ledger::monthly_sum(self.conn, &layout, year, scenario)?;
            debug!(table = category.table(), total = stored.total(), "category summed");
            totals.insert(category, stored.scaled(category.sign()));
        }
        Ok(totals)
    }

    pub fn build(&self, year: i32, scenario: Scenario) -> Result<EriReport> {
        validate_year(year)?;
        self.config.validate()?;

        let totals = self.category_totals(year, scenario)?;
        let waterfall = Waterfall::compute(&totals, &self.config);
        info!(year, %scenario, net = waterfall.net_result.total(), "income statement built");

        Ok(EriReport {
            year,
            scenario,
            config: self.config,
            lines: waterfall.lines(),
            waterfall,
        })
    }
}
