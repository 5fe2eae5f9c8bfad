//! Request types
//!
//! The per-invocation request descriptor produced by a prompt builder and
//! consumed once by the runner.

use serde::{Deserialize, Serialize};

use crate::assets::audio::AudioBuffer;
use crate::types::options::EngineOptions;

/// Prompt input for one request: either a literal prompt string or a
/// pre-tokenized id sequence, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PromptInput {
    /// Literal prompt text, tokenized by the engine
    Text(String),
    /// Pre-tokenized prompt
    Tokens(Vec<u32>),
}

impl PromptInput {
    pub fn is_text(&self) -> bool {
        matches!(self, PromptInput::Text(_))
    }

    pub fn is_tokens(&self) -> bool {
        matches!(self, PromptInput::Tokens(_))
    }

    /// The literal prompt, if this input carries one
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PromptInput::Text(text) => Some(text),
            PromptInput::Tokens(_) => None,
        }
    }
}

/// Reference to an auxiliary LoRA weight set applied atop the base model for
/// a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoraRequest {
    pub name: String,
    pub id: u32,
    /// Local path or `owner/repo[/file]` locator for the adapter weights
    pub path: String,
}

impl LoraRequest {
    pub fn new(name: impl Into<String>, id: u32, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            path: path.into(),
        }
    }
}

/// Non-text input data attached to a prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiModalData {
    /// Decoded audio clips, in placeholder order
    pub audio: Vec<AudioBuffer>,
}

/// Everything the runner needs to issue one generation call.
///
/// Built once per invocation by a model builder, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequestData {
    pub engine_options: EngineOptions,
    pub prompt: PromptInput,
    pub multi_modal: Option<MultiModalData>,
    pub stop_token_ids: Option<Vec<u32>>,
    pub lora_requests: Option<Vec<LoraRequest>>,
}
