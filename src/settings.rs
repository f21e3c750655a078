use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::db::DB_FILE;
use crate::eri::EriConfig;
use crate::error::{CuadreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_participation_rate")]
    pub participation_rate: f64,
    #[serde(default = "default_income_tax_rate")]
    pub income_tax_rate: f64,
}

fn default_participation_rate() -> f64 {
    EriConfig::default().participation_rate
}

fn default_income_tax_rate() -> f64 {
    EriConfig::default().income_tax_rate
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            participation_rate: default_participation_rate(),
            income_tax_rate: default_income_tax_rate(),
        }
    }
}

impl Settings {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_path().join(DB_FILE)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_path().join("exports")
    }

    pub fn eri_config(&self) -> EriConfig {
        EriConfig {
            participation_rate: self.participation_rate,
            income_tax_rate: self.income_tax_rate,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("cuadre")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("cuadre")
}

/// Missing or unreadable settings fall back to defaults field by field.
pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| CuadreError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.participation_rate, 0.15);
        assert_eq!(s.income_tax_rate, 0.25);
        assert!(s.data_dir.ends_with("cuadre"));
        assert!(s.db_path().ends_with("cuadre.db"));
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/cuadre-test", "income_tax_rate": 0.3}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.participation_rate, 0.15);
        assert_eq!(s.eri_config().income_tax_rate, 0.3);
        assert_eq!(s.exports_dir(), PathBuf::from("/tmp/cuadre-test/exports"));
    }

    #[test]
    fn test_roundtrip_through_json() {
        let settings = Settings {
            data_dir: "/srv/cuadre".to_string(),
            participation_rate: 0.1,
            income_tax_rate: 0.2,
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        let loaded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.data_dir, "/srv/cuadre");
        assert_eq!(loaded.eri_config(), EriConfig { participation_rate: 0.1, income_tax_rate: 0.2 });
    }

    #[test]
    fn test_shellexpand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(shellexpand_path("~/x"), format!("{}/x", home.to_string_lossy()));
        }
    }
}
