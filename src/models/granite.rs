//! Granite Speech prompt builder
//!
//! The model carries an audio-specific LoRA in its own repo; it must be
//! applied whenever audio is attached.

use crate::models::BuildError;
use crate::types::{EngineOptions, LoraRequest, ModalityLimits, ModelRequestData, PromptInput};

const MODEL_REPO: &str = "ibm-granite/granite-speech-3.3-8b";

pub(crate) fn prompt_for(question: &str, audio_count: usize) -> String {
    let audio_placeholder = "<|audio|>".repeat(audio_count);
    format!(
        "<|start_of_role|>system<|end_of_role|>Knowledge Cutoff Date: April 2024.\n\
         Today's Date: December 19, 2024.\n\
         You are Granite, developed by IBM. You are a helpful AI assistant<|end_of_text|>\n\
         <|start_of_role|>user<|end_of_role|>{audio_placeholder}{question}<|end_of_text|>\n\
         <|start_of_role|>assistant<|end_of_role|>"
    )
}

pub(crate) fn build(question: &str, audio_count: usize) -> Result<ModelRequestData, BuildError> {
    Ok(ModelRequestData {
        engine_options: EngineOptions {
            model: MODEL_REPO.to_string(),
            media_marker: Some("<|audio|>".to_string()),
            max_model_len: 2048,
            max_num_seqs: 2,
            limit_mm_per_prompt: ModalityLimits::audio(audio_count as u32),
            enable_lora: true,
            max_lora_rank: 64,
            ..Default::default()
        },
        prompt: PromptInput::Text(prompt_for(question, audio_count)),
        multi_modal: None,
        stop_token_ids: None,
        lora_requests: Some(vec![LoraRequest::new("speech", 1, MODEL_REPO)]),
    })
}
