//! Prompt builders
//!
//! One builder per supported audio language model family. Each builder
//! encodes that model's published prompt grammar and returns a complete
//! request descriptor; the families share a signature and nothing else.

pub mod chat_template;

mod granite;
mod minicpm;
mod phi;
mod qwen;
mod ultravox;
mod voxtral;
mod whisper;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::assets::AssetError;
use crate::models::chat_template::TemplateError;
use crate::storage::huggingface::HubError;
use crate::storage::settings::RunnerSettings;
use crate::types::ModelRequestData;

/// Errors from prompt building
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{model} does not support {count} audio inputs per prompt")]
    UnsupportedAudioCount { model: &'static str, count: usize },
    #[error("{0} does not publish a chat template")]
    MissingChatTemplate(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// The registered model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Voxtral,
    GraniteSpeech,
    MiniCpmO,
    Phi4Mm,
    Phi4Multimodal,
    Qwen2Audio,
    Qwen25Omni,
    Ultravox,
    Whisper,
}

impl ModelKind {
    /// Every registered family, in registry order
    pub const ALL: [ModelKind; 9] = [
        ModelKind::Voxtral,
        ModelKind::GraniteSpeech,
        ModelKind::MiniCpmO,
        ModelKind::Phi4Mm,
        ModelKind::Phi4Multimodal,
        ModelKind::Qwen2Audio,
        ModelKind::Qwen25Omni,
        ModelKind::Ultravox,
        ModelKind::Whisper,
    ];

    /// The CLI key selecting this family
    pub fn key(&self) -> &'static str {
        match self {
            ModelKind::Voxtral => "voxtral",
            ModelKind::GraniteSpeech => "granite_speech",
            ModelKind::MiniCpmO => "minicpmo",
            ModelKind::Phi4Mm => "phi4_mm",
            ModelKind::Phi4Multimodal => "phi4_multimodal",
            ModelKind::Qwen2Audio => "qwen2_audio",
            ModelKind::Qwen25Omni => "qwen2_5_omni",
            ModelKind::Ultravox => "ultravox",
            ModelKind::Whisper => "whisper",
        }
    }

    /// Look up a family by its CLI key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.key() == key)
    }

    /// Keys of every registered family
    pub fn keys() -> Vec<&'static str> {
        Self::ALL.iter().map(ModelKind::key).collect()
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::Ultravox
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| format!("unknown model type: {s}"))
    }
}

/// Build the request descriptor for one family.
///
/// `audio_count` is the number of sample clips the prompt references; each
/// family declares its own attachment limit in the returned engine options.
pub async fn build_request(
    kind: ModelKind,
    question: &str,
    audio_count: usize,
    settings: &RunnerSettings,
) -> Result<ModelRequestData, BuildError> {
    match kind {
        ModelKind::Voxtral => voxtral::build(question, audio_count, settings).await,
        ModelKind::GraniteSpeech => granite::build(question, audio_count),
        ModelKind::MiniCpmO => minicpm::build(question, audio_count, settings).await,
        ModelKind::Phi4Mm => phi::build_phi4_mm(question, audio_count),
        ModelKind::Phi4Multimodal => phi::build_phi4_multimodal(question, audio_count),
        ModelKind::Qwen2Audio => qwen::build_qwen2_audio(question, audio_count),
        ModelKind::Qwen25Omni => qwen::build_qwen2_5_omni(question, audio_count),
        ModelKind::Ultravox => ultravox::build(question, audio_count, settings).await,
        ModelKind::Whisper => whisper::build(question, audio_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptInput;

    #[test]
    fn test_every_key_round_trips() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_key(kind.key()), Some(kind));
            assert_eq!(kind.key().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert_eq!(ModelKind::from_key("gpt4"), None);
        assert!("".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_default_is_ultravox() {
        assert_eq!(ModelKind::default(), ModelKind::Ultravox);
    }

    #[tokio::test]
    async fn test_offline_builders_populate_exactly_one_prompt_form() {
        let settings = RunnerSettings::default();
        let offline = [
            ModelKind::GraniteSpeech,
            ModelKind::Phi4Mm,
            ModelKind::Phi4Multimodal,
            ModelKind::Qwen2Audio,
            ModelKind::Qwen25Omni,
            ModelKind::Whisper,
        ];

        for kind in offline {
            let audio_count = 1;
            let request = build_request(kind, "What is recited in the audio?", audio_count, &settings)
                .await
                .unwrap();
            // the sum type makes text and token prompts mutually exclusive;
            // every offline family carries literal text
            assert!(
                matches!(request.prompt, PromptInput::Text(_)),
                "{kind} should produce a literal prompt"
            );
            assert_eq!(
                request.engine_options.limit_mm_per_prompt.resolve().audio,
                audio_count as u32
            );
        }
    }
}
