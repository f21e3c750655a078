use serde::Serialize;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::evidence::evidence_dir;
use crate::response;
use crate::settings::{load_settings, save_settings, shellexpand_path};

#[derive(Serialize)]
struct InitSummary {
    data_dir: String,
    database: String,
}

pub fn run(data_dir: Option<String>, json: bool) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = settings.data_path();
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(evidence_dir(&resolved))?;
    std::fs::create_dir_all(settings.exports_dir())?;

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;

    if json {
        return response::print_success(&InitSummary {
            data_dir: resolved.to_string_lossy().to_string(),
            database: settings.db_path().to_string_lossy().to_string(),
        });
    }
    println!("Initialized cuadre at {}", resolved.display());
    Ok(())
}
