//! Qwen2-Audio and Qwen2.5-Omni prompt builders

use crate::models::BuildError;
use crate::types::{EngineOptions, ModalityLimits, ModelRequestData, PromptInput};

const QWEN2_AUDIO_REPO: &str = "ggml-org/Qwen2-Audio-7B-Instruct-GGUF";
const QWEN2_5_OMNI_REPO: &str = "ggml-org/Qwen2.5-Omni-7B-GGUF";

const AUDIO_PLACEHOLDER: &str = "<|audio_bos|><|AUDIO|><|audio_eos|>";

const OMNI_SYSTEM: &str = "You are Qwen, a virtual human developed by the Qwen Team, Alibaba \
     Group, capable of perceiving auditory and visual inputs, as well as \
     generating text and speech.";

/// Numbered `Audio N:` placeholder lines, one per attachment
fn numbered_audio_section(audio_count: usize) -> String {
    (0..audio_count)
        .map(|idx| format!("Audio {}: {}\n", idx + 1, AUDIO_PLACEHOLDER))
        .collect()
}

fn chatml_prompt(system: &str, user_content: &str) -> String {
    format!(
        "<|im_start|>system\n{system}<|im_end|>\n\
         <|im_start|>user\n{user_content}<|im_end|>\n\
         <|im_start|>assistant\n"
    )
}

pub(crate) fn qwen2_audio_prompt(question: &str, audio_count: usize) -> String {
    let audio_section = numbered_audio_section(audio_count);
    chatml_prompt(
        "You are a helpful assistant.",
        &format!("{audio_section}{question}"),
    )
}

pub(crate) fn qwen2_5_omni_prompt(question: &str, audio_count: usize) -> String {
    let audio_section: String = (0..audio_count)
        .map(|_| format!("{AUDIO_PLACEHOLDER}\n"))
        .collect();
    chatml_prompt(OMNI_SYSTEM, &format!("{audio_section}{question}"))
}

pub(crate) fn build_qwen2_audio(
    question: &str,
    audio_count: usize,
) -> Result<ModelRequestData, BuildError> {
    Ok(ModelRequestData {
        engine_options: EngineOptions {
            model: QWEN2_AUDIO_REPO.to_string(),
            media_marker: Some("<|AUDIO|>".to_string()),
            max_model_len: 4096,
            max_num_seqs: 5,
            limit_mm_per_prompt: ModalityLimits::audio(audio_count as u32),
            ..Default::default()
        },
        prompt: PromptInput::Text(qwen2_audio_prompt(question, audio_count)),
        multi_modal: None,
        stop_token_ids: None,
        lora_requests: None,
    })
}

pub(crate) fn build_qwen2_5_omni(
    question: &str,
    audio_count: usize,
) -> Result<ModelRequestData, BuildError> {
    Ok(ModelRequestData {
        engine_options: EngineOptions {
            model: QWEN2_5_OMNI_REPO.to_string(),
            media_marker: Some("<|AUDIO|>".to_string()),
            max_model_len: 4096,
            max_num_seqs: 5,
            limit_mm_per_prompt: ModalityLimits::audio(audio_count as u32),
            ..Default::default()
        },
        prompt: PromptInput::Text(qwen2_5_omni_prompt(question, audio_count)),
        multi_modal: None,
        stop_token_ids: None,
        lora_requests: None,
    })
}
