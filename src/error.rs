use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CuadreError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unrecognized structure in {name}: {detail}")]
    StructureMismatch { name: String, detail: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot read {}: {detail}", path.display())]
    File { path: PathBuf, detail: String },

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

/// Coarse classification callers branch on instead of matching messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    StructureMismatch,
    NotFound,
    Io,
    Internal,
}

impl CuadreError {
    pub fn structure(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::StructureMismatch {
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn file(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        Self::File {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::StructureMismatch { .. } => ErrorKind::StructureMismatch,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::File { .. } | Self::Io(_) | Self::Csv(_) => ErrorKind::Io,
            Self::Db(_) | Self::Json(_) | Self::Export(_) | Self::Settings(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, CuadreError>;
