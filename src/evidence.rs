//! JSON snapshots of imported rows. Written once per batch, never rewritten;
//! later comparisons read these files rather than the ledger tables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CuadreError, Result};
use crate::models::{RowMap, Scenario};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceMeta {
    pub tab: String,
    pub scenario: Scenario,
    pub year: i32,
    pub source_file_name: String,
    pub sheet_name: String,
    pub created_at: String,
    #[serde(default)]
    pub warnings: usize,
}

#[derive(Serialize)]
struct EvidenceFile<'a> {
    metadata: &'a EvidenceMeta,
    rows: &'a [RowMap],
}

pub fn evidence_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("evidence")
}

/// Fresh file name for a snapshot. Never returns a path that already exists.
pub fn new_evidence_path(data_dir: &Path, tab: &str, scenario: Scenario) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%3f");
    let base = format!("{tab}_{}_{stamp}", scenario.as_str().to_lowercase());
    let dir = evidence_dir(data_dir);
    let mut path = dir.join(format!("{base}.json"));
    let mut n = 2;
    while path.exists() {
        path = dir.join(format!("{base}_{n}.json"));
        n += 1;
    }
    path
}

pub fn write(path: &Path, rows: &[RowMap], metadata: &EvidenceMeta) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CuadreError::file(parent, e))?;
    }
    let json = serde_json::to_string_pretty(&EvidenceFile { metadata, rows })?;
    std::fs::write(path, format!("{json}\n")).map_err(|e| CuadreError::file(path, e))?;
    Ok(())
}

/// Reads a plain array of rows or a `{rows: [...]}` / `{preview: [...]}` envelope.
pub fn read(path: &Path) -> Result<Vec<RowMap>> {
    let content = std::fs::read_to_string(path).map_err(|e| CuadreError::file(path, e))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| CuadreError::file(path, format!("corrupt JSON: {e}")))?;

    let rows = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("rows").or_else(|| obj.remove("preview")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(CuadreError::file(path, "expected an array or a rows/preview envelope"));
            }
        },
        _ => return Err(CuadreError::file(path, "expected an array or a rows/preview envelope")),
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(CuadreError::file(path, format!("row {} is not an object", i + 1))),
        })
        .collect()
}
