use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::amount;
use crate::models::Scenario;
use crate::origin::{explain, Formula};
use crate::response;

use super::open_db;

pub fn run(year: i32, code: &str, month: u32, scenario: &str, json: bool) -> Result<()> {
    let scenario: Scenario = scenario.parse()?;
    let (_settings, conn) = open_db()?;
    let origin = explain(&conn, year, code, month, scenario)?;

    if json {
        return response::print_success(&origin);
    }

    println!(
        "{} {}/{} ({}): {} from {}",
        origin.code.bold(),
        origin.month,
        origin.year,
        origin.scenario,
        amount(origin.value_eri).bold(),
        origin.origin_table
    );
    match &origin.formula {
        Formula::Direct { code, stored } => {
            println!("Direct: account {code} stored {}", amount(*stored));
        }
        Formula::Sum { components } => {
            let mut table = Table::new();
            table.set_header(vec!["Account", "Value"]);
            for c in components {
                table.add_row(vec![Cell::new(&c.code), Cell::new(amount(c.value))]);
            }
            println!("Sum of {} accounts\n{table}", components.len());
        }
    }
    Ok(())
}
