//! Ultravox prompt builder
//!
//! Renders the chat template published in the base model's tokenizer config.

use crate::models::chat_template::{apply_chat_template, ChatMessage, TokenizerConfig};
use crate::models::BuildError;
use crate::storage::huggingface;
use crate::storage::settings::RunnerSettings;
use crate::types::{EngineOptions, ModalityLimits, ModelRequestData, PromptInput};

const MODEL_REPO: &str = "ggml-org/ultravox-v0_5-llama-3_2-1b-GGUF";
const TOKENIZER_REPO: &str = "fixie-ai/ultravox-v0_5-llama-3_2-1b";

pub(crate) fn user_message(question: &str, audio_count: usize) -> String {
    format!("{}{}", "<|audio|>\n".repeat(audio_count), question)
}

pub(crate) async fn build(
    question: &str,
    audio_count: usize,
    settings: &RunnerSettings,
) -> Result<ModelRequestData, BuildError> {
    let config_path =
        huggingface::download_file(settings, TOKENIZER_REPO, "main", "tokenizer_config.json")
            .await?;
    let config = TokenizerConfig::from_json_file(&config_path)?;
    let template = config
        .chat_template
        .clone()
        .ok_or_else(|| BuildError::MissingChatTemplate(TOKENIZER_REPO.to_string()))?;

    let message = ChatMessage::user(user_message(question, audio_count));
    let prompt = apply_chat_template(&template, &[message], config.bos(), config.eos(), true)?;

    Ok(ModelRequestData {
        engine_options: EngineOptions {
            model: MODEL_REPO.to_string(),
            media_marker: Some("<|audio|>".to_string()),
            max_model_len: 4096,
            max_num_seqs: 5,
            limit_mm_per_prompt: ModalityLimits::audio(audio_count as u32),
            ..Default::default()
        },
        prompt: PromptInput::Text(prompt),
        multi_modal: None,
        stop_token_ids: None,
        lora_requests: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefixes_audio_lines() {
        assert_eq!(user_message("What is 1+1?", 0), "What is 1+1?");
        assert_eq!(
            user_message("What is recited in the audio?", 2),
            "<|audio|>\n<|audio|>\nWhat is recited in the audio?"
        );
    }
}
