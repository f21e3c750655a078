mod batches;
mod cli;
mod datasets;
mod db;
mod eri;
mod error;
mod evidence;
mod export;
mod fmt;
mod importer;
mod layout;
mod ledger;
mod models;
mod normalize;
mod origin;
mod reconcile;
mod response;
mod settings;
mod spreadsheet;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ExportCommands};

fn main() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: logging already initialized");
    }

    let cli = Cli::parse();
    let json = cli.json;

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir, json),
        Commands::Import {
            file,
            tab,
            scenario,
            year,
            sheet,
            validate_only,
        } => cli::import::run(&file, &tab, &scenario, year, sheet.as_deref(), validate_only, json),
        Commands::Batches { tab, scenario } => cli::batches::list(tab.as_deref(), scenario.as_deref(), json),
        Commands::Parse { values } => cli::parse::run(&values, json),
        Commands::Reconcile {
            a,
            b,
            only_differences,
            key,
        } => cli::reconcile::run(&a, &b, only_differences, key.as_deref(), json),
        Commands::Eri {
            year,
            scenario,
            participation,
            tax,
        } => cli::eri::run(year, &scenario, participation, tax, json),
        Commands::Origin {
            year,
            code,
            month,
            scenario,
        } => cli::origin::run(year, &code, month, &scenario, json),
        Commands::Export { command } => match command {
            ExportCommands::Reconcile {
                a,
                b,
                only_differences,
                key,
                output,
            } => cli::export::reconcile(&a, &b, only_differences, key.as_deref(), output, json),
            ExportCommands::Eri {
                year,
                scenario,
                participation,
                tax,
                output,
            } => cli::export::eri(year, &scenario, participation, tax, output, json),
        },
    };

    if let Err(e) = result {
        if json {
            println!("{}", response::failure(&e));
        } else {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }
}
