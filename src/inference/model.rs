//! GGUF file validation
//!
//! Cheap header checks run before a weight file is handed to llama.cpp, so a
//! truncated download fails with a useful message instead of a backend abort.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Magic bytes opening every GGUF file
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

/// GGUF container versions llama.cpp accepts
const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 2..=3;

/// Errors from GGUF validation
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not a GGUF file")]
    NotGguf(String),
    #[error("unsupported GGUF version {0}")]
    UnsupportedVersion(u32),
    #[error("GGUF header is truncated")]
    Truncated,
}

/// Header metadata of a GGUF file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GgufMetadata {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
}

/// Validate the GGUF header of a weight file
pub fn validate_gguf(path: &Path) -> Result<GgufMetadata, ModelError> {
    let mut file = File::open(path)?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)
        .map_err(|_| ModelError::Truncated)?;
    if magic != GGUF_MAGIC {
        return Err(ModelError::NotGguf(path.display().to_string()));
    }

    let mut word = [0u8; 4];
    file.read_exact(&mut word)
        .map_err(|_| ModelError::Truncated)?;
    let version = u32::from_le_bytes(word);
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(ModelError::UnsupportedVersion(version));
    }

    let mut long = [0u8; 8];
    file.read_exact(&mut long)
        .map_err(|_| ModelError::Truncated)?;
    let tensor_count = u64::from_le_bytes(long);
    file.read_exact(&mut long)
        .map_err(|_| ModelError::Truncated)?;
    let metadata_kv_count = u64::from_le_bytes(long);

    Ok(GgufMetadata {
        version,
        tensor_count,
        metadata_kv_count,
    })
}
