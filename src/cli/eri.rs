use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::Connection;

use crate::eri::{EriEngine, EriReport, LineRole};
use crate::error::Result;
use crate::fmt::amount_or_blank;
use crate::models::Scenario;
use crate::response;
use crate::settings::Settings;

use super::open_db;

const MONTH_HEADERS: [&str; 12] = [
    "Ene", "Feb", "Mar", "Abr", "May", "Jun", "Jul", "Ago", "Sep", "Oct", "Nov", "Dic",
];

/// Build the report with settings rates, overridden by command-line rates.
pub(crate) fn build_report(
    conn: &Connection,
    settings: &Settings,
    year: i32,
    scenario: &str,
    participation: Option<f64>,
    tax: Option<f64>,
) -> Result<EriReport> {
    let scenario: Scenario = scenario.parse()?;
    let mut config = settings.eri_config();
    if let Some(rate) = participation {
        config.participation_rate = rate;
    }
    if let Some(rate) = tax {
        config.income_tax_rate = rate;
    }
    EriEngine::new(conn, config).build(year, scenario)
}

pub fn run(year: i32, scenario: &str, participation: Option<f64>, tax: Option<f64>, json: bool) -> Result<()> {
    let (settings, conn) = open_db()?;
    let report = build_report(&conn, &settings, year, scenario, participation, tax)?;

    if json {
        return response::print_success(&report);
    }

    let mut header = vec!["".to_string()];
    header.extend(MONTH_HEADERS.iter().map(|m| m.to_string()));
    header.push("Total".to_string());

    let mut table = Table::new();
    table.set_header(header);
    for line in &report.lines {
        let label = match line.role {
            LineRole::Header => line.label.bold(),
            LineRole::MonthlyTotal => format!("  {}", line.label).normal(),
            LineRole::Subtotal => line.label.cyan().bold(),
            LineRole::CalcLine => format!("  {}", line.label).italic(),
            LineRole::FinalResult if line.total >= 0.0 => line.label.green().bold(),
            LineRole::FinalResult => line.label.red().bold(),
        };
        let mut cells = vec![Cell::new(label)];
        if line.role != LineRole::Header {
            cells.extend(line.values.iter().map(|v| Cell::new(amount_or_blank(*v))));
            cells.push(Cell::new(amount_or_blank(line.total)));
        }
        table.add_row(cells);
    }
    println!(
        "Estado de resultados {} ({})  participation {:.0}%, income tax {:.0}%\n{table}",
        report.year,
        report.scenario,
        report.config.participation_rate * 100.0,
        report.config.income_tax_rate * 100.0
    );
    Ok(())
}
