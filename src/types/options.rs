//! Engine and sampling options
//!
//! Configuration records handed to the inference engine for one run.

use serde::{Deserialize, Serialize};

/// Per-modality attachment limits declared by a prompt builder.
///
/// Unset modalities are resolved to zero (disabled) by [`ModalityLimits::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalityLimits {
    pub image: Option<u32>,
    pub video: Option<u32>,
    pub audio: Option<u32>,
}

impl ModalityLimits {
    /// Limits declaring only an audio attachment count
    pub fn audio(count: u32) -> Self {
        Self {
            audio: Some(count),
            ..Default::default()
        }
    }

    /// Overlay the declared limits on the zeroed defaults.
    ///
    /// Modalities the builder did not mention stay disabled.
    pub fn resolve(&self) -> EffectiveLimits {
        EffectiveLimits {
            image: self.image.unwrap_or(0),
            video: self.video.unwrap_or(0),
            audio: self.audio.unwrap_or(0),
        }
    }
}

/// Fully resolved per-modality limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveLimits {
    pub image: u32,
    pub video: u32,
    pub audio: u32,
}

/// Engine configuration produced by a prompt builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// HuggingFace repo id holding the model weights
    pub model: String,
    /// Repo revision; `None` means the default branch
    pub revision: Option<String>,
    /// Explicit GGUF filename inside the repo; `None` picks the lone `.gguf`
    pub gguf_file: Option<String>,
    /// Explicit multimodal projector filename; `None` auto-detects `mmproj*`
    pub mmproj_file: Option<String>,
    /// Placeholder token the engine replaces with encoded audio chunks
    pub media_marker: Option<String>,
    /// Context window limit
    pub max_model_len: u32,
    /// Maximum concurrent sequences the engine should plan for
    pub max_num_seqs: u32,
    /// Declared per-modality attachment limits
    pub limit_mm_per_prompt: ModalityLimits,
    /// Whether LoRA adapters may be applied to this model
    pub enable_lora: bool,
    /// Maximum LoRA rank the engine should accept
    pub max_lora_rank: u32,
    /// Sampler seed forwarded to the engine
    pub seed: Option<u32>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            revision: None,
            gguf_file: None,
            mmproj_file: None,
            media_marker: None,
            max_model_len: 4096,
            max_num_seqs: 1,
            limit_mm_per_prompt: ModalityLimits::default(),
            enable_lora: false,
            max_lora_rank: 0,
            seed: None,
        }
    }
}

/// Parameters controlling generation randomness and length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    /// Extra token ids that end generation, on top of the model's EOG tokens
    pub stop_token_ids: Option<Vec<u32>>,
    pub seed: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmentioned_modalities_stay_disabled() {
        let declared = ModalityLimits::audio(2);
        let effective = declared.resolve();
        assert_eq!(
            effective,
            EffectiveLimits {
                image: 0,
                video: 0,
                audio: 2,
            }
        );
    }

    #[test]
    fn test_empty_limits_resolve_to_zero() {
        let effective = ModalityLimits::default().resolve();
        assert_eq!(effective, EffectiveLimits::default());
        assert_eq!(effective.audio, 0);
    }

    #[test]
    fn test_declared_limits_survive_resolution() {
        let declared = ModalityLimits {
            image: Some(3),
            video: None,
            audio: Some(1),
        };
        let effective = declared.resolve();
        assert_eq!(effective.image, 3);
        assert_eq!(effective.video, 0);
        assert_eq!(effective.audio, 1);
    }

    #[test]
    fn test_engine_options_serialization() {
        let options = EngineOptions {
            model: "ggml-org/Qwen2-Audio-7B-Instruct-GGUF".to_string(),
            max_model_len: 4096,
            max_num_seqs: 5,
            limit_mm_per_prompt: ModalityLimits::audio(1),
            ..Default::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        let back: EngineOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(options, back);
    }
}
