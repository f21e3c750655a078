//! Locale-tolerant number parsing for spreadsheet and JSON cell content.
//!
//! Budget exports mix `1.234,56` and `1,234.56` freely, so a separator is
//! classified by position and by how many digits follow it. A lone separator
//! followed by exactly three digits is always read as thousands grouping:
//! `1.234` is 1234, never 1.234.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberKind {
    Numeric,
    /// Empty cell or null. Reads as 0.0 but is not a parse failure.
    Empty,
    /// Text that does not resolve to a number. Reads as 0.0.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParsedNumber {
    pub value: f64,
    pub kind: NumberKind,
}

impl ParsedNumber {
    pub const EMPTY: Self = Self { value: 0.0, kind: NumberKind::Empty };
    pub const INVALID: Self = Self { value: 0.0, kind: NumberKind::Invalid };

    fn numeric(value: f64) -> Self {
        Self { value, kind: NumberKind::Numeric }
    }

    /// True for numbers and empty cells; false only for unparseable text.
    pub fn is_numeric(&self) -> bool {
        self.kind != NumberKind::Invalid
    }
}

fn numeric_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?(\d+\.?\d*|\.\d+)$").expect("valid literal pattern"))
}

pub fn parse_float(value: f64) -> ParsedNumber {
    if value.is_finite() {
        ParsedNumber::numeric(value)
    } else {
        ParsedNumber::INVALID
    }
}

pub fn parse_json(value: &Value) -> ParsedNumber {
    match value {
        Value::Null => ParsedNumber::EMPTY,
        Value::Number(n) => n.as_f64().map(parse_float).unwrap_or(ParsedNumber::INVALID),
        Value::String(s) => parse_text(s),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => ParsedNumber::INVALID,
    }
}

pub fn parse_text(raw: &str) -> ParsedNumber {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParsedNumber::EMPTY;
    }
    let parenthesized = trimmed.contains('(') && trimmed.contains(')');

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    let canonical = resolve_separators(&cleaned);
    if !numeric_literal().is_match(&canonical) {
        return ParsedNumber::INVALID;
    }
    let Ok(value) = canonical.parse::<f64>() else {
        return ParsedNumber::INVALID;
    };
    if parenthesized {
        ParsedNumber::numeric(-value.abs())
    } else {
        ParsedNumber::numeric(value)
    }
}

fn resolve_separators(s: &str) -> String {
    match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) => resolve_single(s, ','),
        (None, Some(_)) => resolve_single(s, '.'),
        (None, None) => s.to_string(),
    }
}

fn resolve_single(s: &str, sep: char) -> String {
    if s.matches(sep).count() > 1 {
        return s.replace(sep, "");
    }
    match s.split_once(sep) {
        Some((_, frac)) if frac.len() == 3 && frac.chars().all(|c| c.is_ascii_digit()) => {
            s.replace(sep, "")
        }
        _ => s.replace(sep, "."),
    }
}
