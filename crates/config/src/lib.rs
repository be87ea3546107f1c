//! Configuration directory helpers for healthsync
//!
//! All persistent settings live under a single directory
//! (`~/.config/healthsync/` on Linux): sync settings, upstream credentials,
//! cached session tokens and, by default, the SQLite database.
//!
//! Call [`init`] at application startup to bootstrap the directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Name of the application directory inside the platform config dir
const APP_DIR: &str = "healthsync";

/// Initialize the config directory.
///
/// Creates it if it doesn't exist and returns its path.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the config directory (`<platform config dir>/healthsync`)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Get the path to a file within the config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load and parse a JSON file from the config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a file exists in the config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Save a value as JSON into the config directory
pub fn save_json<T: serde::Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = ensure_config_dir()?;
    save_json_file(&dir.join(filename), value)
}

/// Save a value as pretty-printed JSON at an arbitrary path, creating parent
/// directories as needed
pub fn save_json_file<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        interval_secs: u64,
        name: String,
    }

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("healthsync"));
    }

    #[test]
    fn test_config_path() {
        let path = config_path("settings.json").unwrap();
        assert!(path.ends_with("healthsync/settings.json"));
    }

    #[test]
    fn test_save_and_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.json");
        let value = Sample {
            interval_secs: 300,
            name: "daily".to_string(),
        };

        save_json_file(&path, &value).unwrap();
        let loaded: Sample = load_json_file(&path).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = load_json_file::<Sample>(&path).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
