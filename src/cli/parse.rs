use colored::Colorize;
use comfy_table::{Cell, Table};
use serde::Serialize;

use crate::error::Result;
use crate::normalize::{self, NumberKind, ParsedNumber};
use crate::response;

#[derive(Serialize)]
struct ParsedValue<'a> {
    raw: &'a str,
    #[serde(flatten)]
    parsed: ParsedNumber,
}

pub fn run(values: &[String], json: bool) -> Result<()> {
    let parsed: Vec<ParsedValue<'_>> = values
        .iter()
        .map(|raw| ParsedValue {
            raw,
            parsed: normalize::parse_text(raw),
        })
        .collect();

    if json {
        return response::print_success(&parsed);
    }

    let mut table = Table::new();
    table.set_header(vec!["Input", "Value", "Kind"]);
    for p in &parsed {
        let kind = match p.parsed.kind {
            NumberKind::Numeric => "numeric".green(),
            NumberKind::Empty => "empty".dimmed(),
            NumberKind::Invalid => "invalid".red(),
        };
        table.add_row(vec![Cell::new(p.raw), Cell::new(p.parsed.value), Cell::new(kind)]);
    }
    println!("{table}");
    Ok(())
}
