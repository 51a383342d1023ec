use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::SettingsError;
use crate::models::AppSettings;

const SETTINGS_FILE: &str = "settings.json";

pub fn get_settings_file_path() -> PathBuf {
    PathBuf::from(SETTINGS_FILE)
}

pub fn read_app_settings(file_path: &Path) -> Result<AppSettings, SettingsError> {
    let content = fs::read_to_string(file_path)?;
    let mut settings: AppSettings = serde_json::from_str(&content)?;
    settings.clamp_all();
    Ok(settings)
}

/// Loads settings, falling back to defaults when the file is absent or unreadable.
pub fn load_app_settings(file_path: &Path) -> AppSettings {
    if !file_path.exists() {
        info!(path = %file_path.display(), "no settings file, using defaults");
        return AppSettings::default();
    }

    match read_app_settings(file_path) {
        Ok(settings) => {
            info!(
                path = %file_path.display(),
                parse_immunity = settings.parse_immunity,
                dps_mode = ?settings.dps_mode,
                window_secs = settings.correlation_window_secs,
                "loaded settings"
            );
            settings
        }
        Err(e) => {
            warn!(path = %file_path.display(), error = %e, "unusable settings file, using defaults");
            AppSettings::default()
        }
    }
}

pub fn save_app_settings(file_path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    let json_content = serde_json::to_string_pretty(settings)?;

    let mut file = fs::File::create(file_path)?;
    file.write_all(json_content.as_bytes())?;
    file.flush()?;

    info!(path = %file_path.display(), "saved settings");
    Ok(())
}

pub fn auto_save_app_settings(file_path: &Path, settings: &AppSettings) {
    if let Err(e) = save_app_settings(file_path, settings) {
        warn!(path = %file_path.display(), error = %e, "failed to auto-save settings");
    }
}
