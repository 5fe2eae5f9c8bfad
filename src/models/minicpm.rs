//! MiniCPM-o prompt builder
//!
//! Uses the model's audio chat template (ChatML plus a speaker/TTS
//! generation prologue) and resolves its ChatML stop tokens to ids.

use crate::models::chat_template::{apply_chat_template, ChatMessage};
use crate::models::BuildError;
use crate::storage::huggingface;
use crate::storage::settings::RunnerSettings;
use crate::types::{EngineOptions, ModalityLimits, ModelRequestData, PromptInput};

const MODEL_REPO: &str = "openbmb/MiniCPM-o-2_6-gguf";
const TOKENIZER_REPO: &str = "openbmb/MiniCPM-o-2_6";

const AUDIO_PLACEHOLDER: &str = "(<audio>./</audio>)";

const AUDIO_CHAT_TEMPLATE: &str = "{% for message in messages %}{{'<|im_start|>' + message['role'] + '\n' + message['content'] + '<|im_end|>' + '\n'}}{% endfor %}{% if add_generation_prompt %}{{ '<|im_start|>assistant\n<|spk_bos|><|spk|><|spk_eos|><|tts_bos|>' }}{% endif %}";

const STOP_TOKENS: [&str; 2] = ["<|im_end|>", "<|endoftext|>"];

pub(crate) fn prompt_for(question: &str, audio_count: usize) -> Result<String, BuildError> {
    let placeholder = AUDIO_PLACEHOLDER.repeat(audio_count);
    let message = ChatMessage::user(format!("{placeholder}\n{question}"));
    Ok(apply_chat_template(
        AUDIO_CHAT_TEMPLATE,
        &[message],
        "",
        "",
        true,
    )?)
}

async fn stop_token_ids(settings: &RunnerSettings) -> Result<Vec<u32>, BuildError> {
    let tokenizer_path =
        huggingface::download_file(settings, TOKENIZER_REPO, "main", "tokenizer.json").await?;
    let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| BuildError::Tokenizer(e.to_string()))?;

    STOP_TOKENS
        .iter()
        .map(|token| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| BuildError::Tokenizer(format!("unknown stop token: {token}")))
        })
        .collect()
}

pub(crate) async fn build(
    question: &str,
    audio_count: usize,
    settings: &RunnerSettings,
) -> Result<ModelRequestData, BuildError> {
    let prompt = prompt_for(question, audio_count)?;
    let stop_ids = stop_token_ids(settings).await?;

    Ok(ModelRequestData {
        engine_options: EngineOptions {
            model: MODEL_REPO.to_string(),
            media_marker: Some(AUDIO_PLACEHOLDER.to_string()),
            max_model_len: 4096,
            max_num_seqs: 2,
            limit_mm_per_prompt: ModalityLimits::audio(audio_count as u32),
            ..Default::default()
        },
        prompt: PromptInput::Text(prompt),
        multi_modal: None,
        stop_token_ids: Some(stop_ids),
        lora_requests: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_template_render() {
        let prompt = prompt_for("What is recited in the audio?", 1).unwrap();
        assert_eq!(
            prompt,
            "<|im_start|>user\n(<audio>./</audio>)\nWhat is recited in the audio?<|im_end|>\n\
             <|im_start|>assistant\n<|spk_bos|><|spk|><|spk_eos|><|tts_bos|>"
        );
    }

    #[test]
    fn test_placeholders_repeat() {
        let prompt = prompt_for("q", 2).unwrap();
        assert_eq!(prompt.matches(AUDIO_PLACEHOLDER).count(), 2);
    }

    #[test]
    fn test_no_audio_keeps_question_only() {
        let prompt = prompt_for("What is 1+1?", 0).unwrap();
        assert!(prompt.contains("<|im_start|>user\n\nWhat is 1+1?"));
        assert!(!prompt.contains("<audio>"));
    }
}
