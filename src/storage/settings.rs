//! Runner settings
//!
//! Manages persistence of the few knobs the runner exposes outside its CLI
//! surface: where weights land, how much of the model is offloaded to the
//! GPU, and how patient the downloader is.

use crate::storage::{get_data_dir, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Directory where model weights and audio assets are cached
    pub models_directory: PathBuf,
    /// Number of model layers to offload to the GPU (0 = CPU only)
    pub gpu_layers: u32,
    /// Worker threads for the multimodal projector
    pub threads: u32,
    /// HTTP timeout for weight downloads, in seconds
    pub http_timeout_secs: u64,
}

fn default_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4)
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            models_directory: get_data_dir()
                .ok()
                .map(|d| d.join("models"))
                .unwrap_or_else(|| PathBuf::from("./models")),
            gpu_layers: 0,
            threads: default_threads(),
            http_timeout_secs: 3600, // large GGUF downloads
        }
    }
}

impl RunnerSettings {
    /// Clamp settings to usable ranges
    pub fn validate(&mut self) {
        if self.threads == 0 {
            self.threads = default_threads();
        }
        self.http_timeout_secs = self.http_timeout_secs.clamp(30, 86_400);
    }
}

/// Get the settings file path
fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> RunnerSettings {
    match load_settings_internal() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            RunnerSettings::default()
        }
    }
}

fn load_settings_internal() -> Result<RunnerSettings, StorageError> {
    let path = get_settings_path()?;

    if !path.exists() {
        tracing::debug!("Settings file not found, using defaults");
        return Ok(RunnerSettings::default());
    }

    let json = fs::read_to_string(&path)?;
    let mut settings: RunnerSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from disk");
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(settings: &RunnerSettings) -> Result<(), StorageError> {
    let path = get_settings_path()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to disk");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = RunnerSettings::default();
        assert_eq!(settings.gpu_layers, 0);
        assert!(settings.threads > 0);
        assert_eq!(settings.http_timeout_secs, 3600);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = RunnerSettings::default();

        settings.threads = 0;
        settings.validate();
        assert!(settings.threads > 0);

        settings.http_timeout_secs = 1;
        settings.validate();
        assert_eq!(settings.http_timeout_secs, 30);

        settings.http_timeout_secs = 1_000_000;
        settings.validate();
        assert_eq!(settings.http_timeout_secs, 86_400);
    }

    #[test]
    fn test_settings_serialization() {
        let settings = RunnerSettings::default();

        let json = serde_json::to_string_pretty(&settings).unwrap();
        let mut loaded: RunnerSettings = serde_json::from_str(&json).unwrap();
        loaded.validate();

        assert_eq!(settings.gpu_layers, loaded.gpu_layers);
        assert_eq!(settings.models_directory, loaded.models_directory);
    }
}
