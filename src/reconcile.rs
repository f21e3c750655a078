//! Keyed structural diff of two row datasets.
//!
//! Rows are matched by a derived key, never by position. Every input row ends
//! up in exactly one result row: duplicate keys inside a dataset get a `#n`
//! suffix in order of appearance.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::RowMap;
use crate::normalize::{self, NumberKind, ParsedNumber};

/// Absolute tolerance for numeric equality.
pub const COMPARE_TOLERANCE: f64 = 1e-6;

const TECHNICAL_COLUMNS: &[&str] = &[
    "fila", "row", "row_number", "warnings", "advertencias", "metadata", "meta",
];
const ID_FIELDS: &[&str] = &["code", "codigo", "cuenta", "account", "id"];
const PERIOD_FIELDS: &[&str] = &["period", "periodo", "month", "mes"];

/// Row markers, warnings and metadata never take part in keys or comparison.
pub fn is_technical(column: &str) -> bool {
    column.starts_with('_') || TECHNICAL_COLUMNS.iter().any(|t| column.eq_ignore_ascii_case(t))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    Equal,
    Changed,
    NewInA,
    MissingInA,
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "EQUAL"),
            Self::Changed => write!(f, "CHANGED"),
            Self::NewInA => write!(f, "NEW_IN_A"),
            Self::MissingInA => write!(f, "MISSING_IN_A"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub only_differences: bool,
    /// Column to key on before the built-in identifying fields.
    pub key_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDelta {
    pub column: String,
    pub a: Option<f64>,
    pub b: Option<f64>,
    /// `a - b`, when both sides hold a number.
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationRow {
    pub key: String,
    pub status: RowStatus,
    pub differing_columns: Vec<String>,
    pub deltas: Vec<ColumnDelta>,
    pub row_a: Option<RowMap>,
    pub row_b: Option<RowMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub equal: usize,
    pub changed: usize,
    pub new_in_a: usize,
    pub missing_in_a: usize,
    pub total_a: usize,
    pub total_b: usize,
    pub total_in_result: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileColumns {
    /// Every non-technical column seen, A's first.
    pub all: Vec<String>,
    /// Non-identifying columns with at least one number in either dataset.
    pub numeric: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub rows: Vec<ReconciliationRow>,
    pub summary: ReconcileSummary,
    pub columns: ReconcileColumns,
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Trimmed display text of a cell; integral floats print without `.0`.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string().to_uppercase(),
        other => other.to_string(),
    }
}

fn field(row: &RowMap, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        row.iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| text_of(v))
            .filter(|t| !t.is_empty())
    })
}

fn content_hash(row: &RowMap) -> String {
    let mut hasher = Sha256::new();
    for (k, v) in row.iter().filter(|(k, _)| !is_technical(k)) {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(text_of(v).as_bytes());
        hasher.update(b"\n");
    }
    format!("hash:{}", &hex::encode(hasher.finalize())[..16])
}

/// Identifying key of one row, before duplicate disambiguation.
pub fn row_key(row: &RowMap, key_field: Option<&str>) -> String {
    if let Some(key) = key_field.and_then(|k| field(row, &[k])) {
        return key;
    }
    if let Some(id) = field(row, ID_FIELDS) {
        return match field(row, PERIOD_FIELDS) {
            Some(period) => format!("{id}|{period}"),
            None => id,
        };
    }
    row.iter()
        .filter(|(k, _)| !is_technical(k))
        .map(|(_, v)| text_of(v))
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| content_hash(row))
}

fn keyed<'a>(rows: &'a [RowMap], key_field: Option<&str>) -> Vec<(String, &'a RowMap)> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    rows.iter()
        .map(|row| {
            let base = row_key(row, key_field);
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            let key = if *count == 1 { base } else { format!("{base}#{count}") };
            (key, row)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

fn column_universe(rows_a: &[RowMap], rows_b: &[RowMap]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for row in rows_a.iter().chain(rows_b.iter()) {
        for k in row.keys() {
            if !is_technical(k) && seen.insert(k.clone()) {
                columns.push(k.clone());
            }
        }
    }
    columns
}

/// Codes, periods and the chosen key name a row; they are compared as text.
fn is_identifying(column: &str, key_field: Option<&str>) -> bool {
    let column = column.trim();
    ID_FIELDS.iter().chain(PERIOD_FIELDS).any(|f| column.eq_ignore_ascii_case(f))
        || key_field.is_some_and(|k| column.eq_ignore_ascii_case(k.trim()))
}

fn is_numeric_column(column: &str, rows_a: &[RowMap], rows_b: &[RowMap]) -> bool {
    rows_a
        .iter()
        .chain(rows_b.iter())
        .filter_map(|r| r.get(column))
        .any(|v| normalize::parse_json(v).kind == NumberKind::Numeric)
}

/// Normalised cell value; blanks read as 0, unparseable text as `None`.
fn number_at(row: &RowMap, column: &str) -> Option<f64> {
    let parsed = row.get(column).map(normalize::parse_json).unwrap_or(ParsedNumber::EMPTY);
    parsed.is_numeric().then_some(parsed.value)
}

fn text_at(row: &RowMap, column: &str) -> String {
    row.get(column).map(|v| text_of(v).to_uppercase()).unwrap_or_default()
}

fn values_differ(row_a: &RowMap, row_b: &RowMap, column: &str, identifying: bool) -> bool {
    if !identifying {
        if let (Some(a), Some(b)) = (number_at(row_a, column), number_at(row_b, column)) {
            return (a - b).abs() > COMPARE_TOLERANCE;
        }
    }
    text_at(row_a, column) != text_at(row_b, column)
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

pub fn reconcile(rows_a: &[RowMap], rows_b: &[RowMap], options: &ReconcileOptions) -> Reconciliation {
    let key_field = options.key_field.as_deref();
    let all = column_universe(rows_a, rows_b);
    let numeric: Vec<String> = all
        .iter()
        .filter(|c| !is_identifying(c, key_field) && is_numeric_column(c, rows_a, rows_b))
        .cloned()
        .collect();

    let keyed_a = keyed(rows_a, key_field);
    let keyed_b = keyed(rows_b, key_field);
    let b_by_key: HashMap<&str, &RowMap> = keyed_b.iter().map(|(k, r)| (k.as_str(), *r)).collect();
    let a_keys: HashSet<&str> = keyed_a.iter().map(|(k, _)| k.as_str()).collect();

    let mut summary = ReconcileSummary {
        total_a: rows_a.len(),
        total_b: rows_b.len(),
        ..Default::default()
    };
    let mut rows = Vec::new();

    let deltas = |a: Option<&RowMap>, b: Option<&RowMap>| -> Vec<ColumnDelta> {
        numeric
            .iter()
            .map(|col| {
                let va = a.and_then(|r| number_at(r, col));
                let vb = b.and_then(|r| number_at(r, col));
                ColumnDelta {
                    column: col.clone(),
                    a: va,
                    b: vb,
                    delta: va.zip(vb).map(|(x, y)| x - y),
                }
            })
            .collect()
    };

    for (key, row_a) in &keyed_a {
        let Some(row_b) = b_by_key.get(key.as_str()) else {
            summary.new_in_a += 1;
            rows.push(ReconciliationRow {
                key: key.clone(),
                status: RowStatus::NewInA,
                differing_columns: Vec::new(),
                deltas: deltas(Some(row_a), None),
                row_a: Some((*row_a).clone()),
                row_b: None,
            });
            continue;
        };

        let differing_columns: Vec<String> = all
            .iter()
            .filter(|col| values_differ(row_a, row_b, col, is_identifying(col, key_field)))
            .cloned()
            .collect();

        let status = if differing_columns.is_empty() {
            summary.equal += 1;
            RowStatus::Equal
        } else {
            summary.changed += 1;
            RowStatus::Changed
        };
        rows.push(ReconciliationRow {
            key: key.clone(),
            status,
            differing_columns,
            deltas: deltas(Some(row_a), Some(row_b)),
            row_a: Some((*row_a).clone()),
            row_b: Some((*row_b).clone()),
        });
    }

    for (key, row_b) in &keyed_b {
        if a_keys.contains(key.as_str()) {
            continue;
        }
        summary.missing_in_a += 1;
        rows.push(ReconciliationRow {
            key: key.clone(),
            status: RowStatus::MissingInA,
            differing_columns: Vec::new(),
            deltas: deltas(None, Some(row_b)),
            row_a: None,
            row_b: Some((*row_b).clone()),
        });
    }

    if options.only_differences {
        rows.retain(|r| r.status != RowStatus::Equal);
    }
    summary.total_in_result = rows.len();

    debug!(
        equal = summary.equal,
        changed = summary.changed,
        new_in_a = summary.new_in_a,
        missing_in_a = summary.missing_in_a,
        "reconciled datasets"
    );

    Reconciliation {
        rows,
        summary,
        columns: ReconcileColumns { all, numeric },
    }
}
