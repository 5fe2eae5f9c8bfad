//! Persistent storage
//!
//! This module handles the local data directory, runner settings, and
//! HuggingFace model resolution.

pub mod huggingface;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not determine a platform data directory")]
    NoDataDir,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Get the application data directory, creating it if needed
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    let dirs = directories::ProjectDirs::from("com", "voxrun", "voxrun")
        .ok_or(StorageError::NoDataDir)?;
    let dir = dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
