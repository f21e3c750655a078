//! Where a reconciliation side comes from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::Connection;
use tracing::debug;

use crate::batches;
use crate::error::{CuadreError, Result};
use crate::evidence;
use crate::layout;
use crate::ledger;
use crate::models::{validate_year, LedgerCategory, RowMap, Scenario};
use crate::spreadsheet::{self, ReadMode};

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetSource {
    /// Evidence snapshot of one import batch.
    Batch(i64),
    Latest { category: LedgerCategory, scenario: Scenario },
    Previous { category: LedgerCategory, scenario: Scenario },
    /// Current ledger contents, one map per account.
    Ledger { category: LedgerCategory, year: i32, scenario: Scenario },
    Evidence(PathBuf),
    Spreadsheet { path: PathBuf, sheet: Option<String> },
}

const USAGE: &str = "expected batch:<id>, latest:<tab>:<scenario>, previous:<tab>:<scenario>, \
                     ledger:<tab>:<year>:<scenario>, a .json evidence file or a spreadsheet path[#sheet]";

fn tab_and_scenario(rest: &str, raw: &str) -> Result<(LedgerCategory, Scenario)> {
    match rest.split(':').collect::<Vec<_>>().as_slice() {
        [tab, scenario] => Ok((tab.parse()?, scenario.parse()?)),
        _ => Err(CuadreError::Validation(format!("bad dataset '{raw}': {USAGE}"))),
    }
}

impl FromStr for DatasetSource {
    type Err = CuadreError;

    fn from_str(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if let Some(id) = s.strip_prefix("batch:") {
            let id = id
                .trim()
                .parse()
                .map_err(|_| CuadreError::Validation(format!("bad batch id in '{raw}'")))?;
            return Ok(Self::Batch(id));
        }
        if let Some(rest) = s.strip_prefix("latest:") {
            let (category, scenario) = tab_and_scenario(rest, raw)?;
            return Ok(Self::Latest { category, scenario });
        }
        if let Some(rest) = s.strip_prefix("previous:") {
            let (category, scenario) = tab_and_scenario(rest, raw)?;
            return Ok(Self::Previous { category, scenario });
        }
        if let Some(rest) = s.strip_prefix("ledger:") {
            return match rest.split(':').collect::<Vec<_>>().as_slice() {
                [tab, year, scenario] => {
                    let year = year
                        .parse()
                        .map_err(|_| CuadreError::Validation(format!("bad year in '{raw}'")))?;
                    Ok(Self::Ledger {
                        category: tab.parse()?,
                        year: validate_year(year)?,
                        scenario: scenario.parse()?,
                    })
                }
                _ => Err(CuadreError::Validation(format!("bad dataset '{raw}': {USAGE}"))),
            };
        }

        if s.to_lowercase().ends_with(".json") {
            return Ok(Self::Evidence(PathBuf::from(s)));
        }
        let (path, sheet) = match s.rsplit_once('#') {
            Some((path, sheet)) if !sheet.is_empty() => (path, Some(sheet.to_string())),
            _ => (s, None),
        };
        let path = PathBuf::from(path);
        if spreadsheet::is_spreadsheet_path(&path) {
            return Ok(Self::Spreadsheet { path, sheet });
        }
        Err(CuadreError::Validation(format!("bad dataset '{raw}': {USAGE}")))
    }
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch(id) => write!(f, "batch {id}"),
            Self::Latest { category, scenario } => write!(f, "latest {category} ({scenario})"),
            Self::Previous { category, scenario } => write!(f, "previous {category} ({scenario})"),
            Self::Ledger { category, year, scenario } => write!(f, "ledger {category} {year} ({scenario})"),
            Self::Evidence(path) => write!(f, "{}", path.display()),
            Self::Spreadsheet { path, sheet: Some(sheet) } => write!(f, "{}#{sheet}", path.display()),
            Self::Spreadsheet { path, sheet: None } => write!(f, "{}", path.display()),
        }
    }
}

impl DatasetSource {
    pub fn load(&self, conn: &Connection) -> Result<Vec<RowMap>> {
        let rows = match self {
            Self::Batch(id) => batch_rows(&batches::get(conn, *id)?.evidence_path)?,
            Self::Latest { category, scenario } => {
                batch_rows(&batches::latest(conn, category.table(), *scenario)?.evidence_path)?
            }
            Self::Previous { category, scenario } => {
                batch_rows(&batches::previous(conn, category.table(), *scenario)?.evidence_path)?
            }
            Self::Ledger { category, year, scenario } => {
                let layout = layout::inspect(conn, category.table())?;
                ledger::load_rows(conn, &layout, *year, *scenario)?
                    .iter()
                    .map(|r| r.to_row_map())
                    .collect()
            }
            Self::Evidence(path) => evidence::read(path)?,
            Self::Spreadsheet { path, sheet } => {
                let sheet = spreadsheet::read_sheet(path, sheet.as_deref(), ReadMode::DataOnly)?;
                spreadsheet::rows_as_maps(&sheet)
            }
        };
        debug!(source = %self, rows = rows.len(), "dataset loaded");
        Ok(rows)
    }
}

fn batch_rows(evidence_path: &str) -> Result<Vec<RowMap>> {
    evidence::read(Path::new(evidence_path))
}
