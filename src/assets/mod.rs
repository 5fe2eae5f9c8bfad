//! Bundled sample audio
//!
//! The two published sample clips the demo attaches to prompts, plus the
//! canonical question asked for each attachment count. Clips are fetched
//! lazily into the data directory and decoded on load.

pub mod audio;

pub use audio::AudioBuffer;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::storage::{get_data_dir, StorageError};

// Decoded clips are shared read-only across requests that reuse a key
static DECODED_CACHE: Lazy<Mutex<HashMap<&'static str, AudioBuffer>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Errors from asset resolution
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("asset download of {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("audio decode failed: {0}")]
    Decode(String),
    #[error("audio input is empty")]
    EmptyAudio,
}

const ASSET_BASE_URL: &str =
    "https://vllm-public-assets.s3.us-west-2.amazonaws.com/multimodal_asset";

/// A named, lazily fetched sample audio clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioAsset {
    pub name: &'static str,
    filename: &'static str,
}

/// Sample clips, in the order prompts attach them
pub const AUDIO_ASSETS: [AudioAsset; 2] = [
    AudioAsset {
        name: "mary_had_lamb",
        filename: "mary_had_lamb.ogg",
    },
    AudioAsset {
        name: "winning_call",
        filename: "winning_call.ogg",
    },
];

/// The question asked for a given number of audio attachments
pub fn question_for_audio_count(audio_count: usize) -> Option<&'static str> {
    match audio_count {
        0 => Some("What is 1+1?"),
        1 => Some("What is recited in the audio?"),
        2 => Some("What sport and what nursery rhyme are referenced?"),
        _ => None,
    }
}

impl AudioAsset {
    fn url(&self) -> String {
        format!("{}/{}", ASSET_BASE_URL, self.filename)
    }

    /// Local path of the clip, downloading it on first access
    pub async fn local_path(&self) -> Result<PathBuf, AssetError> {
        let dir = get_data_dir()?.join("audio");
        fs::create_dir_all(&dir)?;

        let path = dir.join(self.filename);
        if path.exists() && fs::metadata(&path)?.len() > 0 {
            return Ok(path);
        }

        let url = self.url();
        tracing::info!("Fetching audio asset from: {}", url);
        let response = reqwest::get(&url).await?;
        if !response.status().is_success() {
            return Err(AssetError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        let temp_path = dir.join(format!("{}.tmp", self.filename));
        fs::write(&temp_path, &bytes)?;
        fs::rename(&temp_path, &path)?;

        Ok(path)
    }

    /// Decoded waveform and sample rate of the clip, decoded once per process
    pub async fn load(&self) -> Result<AudioBuffer, AssetError> {
        if let Some(buffer) = DECODED_CACHE
            .lock()
            .ok()
            .and_then(|cache| cache.get(self.name).cloned())
        {
            return Ok(buffer);
        }

        let path = self.local_path().await?;
        let bytes = fs::read(&path)?;
        let buffer = audio::decode_audio_bytes(&bytes)?;

        if let Ok(mut cache) = DECODED_CACHE.lock() {
            cache.insert(self.name, buffer.clone());
        }
        Ok(buffer)
    }
}

/// Load the first `audio_count` sample clips, in order
pub async fn load_default_audio(audio_count: usize) -> Result<Vec<AudioBuffer>, AssetError> {
    let mut buffers = Vec::with_capacity(audio_count);
    for asset in AUDIO_ASSETS.iter().take(audio_count) {
        buffers.push(asset.load().await?);
    }
    Ok(buffers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_per_audio_count() {
        assert_eq!(question_for_audio_count(0), Some("What is 1+1?"));
        assert_eq!(
            question_for_audio_count(1),
            Some("What is recited in the audio?")
        );
        assert_eq!(
            question_for_audio_count(2),
            Some("What sport and what nursery rhyme are referenced?")
        );
        assert_eq!(question_for_audio_count(3), None);
    }

    #[test]
    fn test_asset_registry() {
        assert_eq!(AUDIO_ASSETS[0].name, "mary_had_lamb");
        assert_eq!(AUDIO_ASSETS[1].name, "winning_call");
        assert!(AUDIO_ASSETS[0].url().ends_with("mary_had_lamb.ogg"));
    }
}
