pub mod batches;
pub mod eri;
pub mod export;
pub mod import;
pub mod init;
pub mod origin;
pub mod parse;
pub mod reconcile;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::{get_connection, init_db};
use crate::error::{CuadreError, Result};
use crate::settings::{load_settings, Settings};

/// Open the configured database, creating the data directory and schema on
/// first use.
pub(crate) fn open_db() -> Result<(Settings, Connection)> {
    let settings = load_settings();
    let data_dir = settings.data_path();
    std::fs::create_dir_all(&data_dir).map_err(|e| CuadreError::file(&data_dir, e))?;
    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;
    Ok((settings, conn))
}

#[derive(Parser)]
#[command(
    name = "cuadre",
    version,
    about = "Budget and actuals ledger import, reconciliation and income statement."
)]
pub struct Cli {
    /// Print machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for cuadre data (default: ~/Documents/cuadre)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import one ledger sheet (xlsx, xls, ods or csv) into a ledger tab.
    Import {
        /// Path to the workbook or CSV file
        file: String,
        /// Ledger tab: ingresos, costos, gastos_operacionales, gastos_financieros,
        /// otros_ingresos, otros_egresos
        #[arg(long)]
        tab: String,
        /// budget or actual
        #[arg(long)]
        scenario: String,
        #[arg(long)]
        year: i32,
        /// Sheet name (default: the tab's heading, else the first sheet)
        #[arg(long)]
        sheet: Option<String>,
        /// Parse and record evidence without writing the ledger
        #[arg(long = "validate-only")]
        validate_only: bool,
    },
    /// List import batches, newest first.
    Batches {
        #[arg(long)]
        tab: Option<String>,
        #[arg(long)]
        scenario: Option<String>,
    },
    /// Show how raw cell texts are read as numbers.
    Parse {
        /// Values to parse, e.g. "1.234,56" "(500)"
        #[arg(required = true, allow_hyphen_values = true)]
        values: Vec<String>,
    },
    /// Compare two datasets row by row.
    Reconcile {
        /// Dataset A: batch:<id>, latest:<tab>:<scenario>, previous:<tab>:<scenario>,
        /// ledger:<tab>:<year>:<scenario>, file.json or file.xlsx[#sheet]
        #[arg(long)]
        a: String,
        /// Dataset B, same forms as A
        #[arg(long)]
        b: String,
        /// Omit rows that are equal on both sides
        #[arg(long = "only-differences")]
        only_differences: bool,
        /// Column to match rows on
        #[arg(long)]
        key: Option<String>,
    },
    /// Monthly income statement (ERI) for a year and scenario.
    Eri {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        scenario: String,
        /// Workers' participation rate (default from settings)
        #[arg(long)]
        participation: Option<f64>,
        /// Income tax rate (default from settings)
        #[arg(long)]
        tax: Option<f64>,
    },
    /// Explain where one income statement value comes from.
    Origin {
        #[arg(long)]
        year: i32,
        /// Account code, 1 to 7 digits
        #[arg(long)]
        code: String,
        /// Month 1-12
        #[arg(long)]
        month: u32,
        #[arg(long)]
        scenario: String,
    },
    /// Export results to CSV or XLSX.
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
}

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Export a reconciliation.
    Reconcile {
        #[arg(long)]
        a: String,
        #[arg(long)]
        b: String,
        #[arg(long = "only-differences")]
        only_differences: bool,
        #[arg(long)]
        key: Option<String>,
        /// Output file, .csv or .xlsx (default: <data_dir>/exports/conciliacion-<timestamp>.csv)
        #[arg(long)]
        output: Option<String>,
    },
    /// Export the income statement.
    Eri {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        scenario: String,
        #[arg(long)]
        participation: Option<f64>,
        #[arg(long)]
        tax: Option<f64>,
        /// Output file, .csv or .xlsx (default: <data_dir>/exports/eri-<year>-<scenario>.csv)
        #[arg(long)]
        output: Option<String>,
    },
}
