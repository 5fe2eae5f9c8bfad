//! Voxtral prompt builder
//!
//! The only pre-tokenizing family: assembles a Mistral-instruct message with
//! one audio chunk per attachment, encodes it with the repo tokenizer, and
//! carries the decoded clips as the multimodal payload.

use crate::assets;
use crate::models::BuildError;
use crate::storage::huggingface;
use crate::storage::settings::RunnerSettings;
use crate::types::{
    EngineOptions, ModalityLimits, ModelRequestData, MultiModalData, PromptInput,
};

const MODEL_REPO: &str = "ggml-org/Voxtral-Mini-3B-2507-GGUF";

const AUDIO_CHUNK: &str = "[AUDIO]";

/// The instruct-format request text, audio chunks before the question
pub(crate) fn instruct_text(question: &str, audio_count: usize) -> String {
    format!(
        "<s>[INST]{}{}[/INST]",
        AUDIO_CHUNK.repeat(audio_count),
        question
    )
}

pub(crate) async fn build(
    question: &str,
    audio_count: usize,
    settings: &RunnerSettings,
) -> Result<ModelRequestData, BuildError> {
    let tokenizer_path =
        huggingface::download_file(settings, MODEL_REPO, "main", "tokenizer.json").await?;
    let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| BuildError::Tokenizer(e.to_string()))?;

    let text = instruct_text(question, audio_count);
    let encoding = tokenizer
        .encode(text.as_str(), false)
        .map_err(|e| BuildError::Tokenizer(e.to_string()))?;
    let prompt_ids = encoding.get_ids().to_vec();

    let audio = assets::load_default_audio(audio_count).await?;

    Ok(ModelRequestData {
        engine_options: EngineOptions {
            model: MODEL_REPO.to_string(),
            max_model_len: 8192,
            max_num_seqs: 2,
            limit_mm_per_prompt: ModalityLimits::audio(audio_count as u32),
            ..Default::default()
        },
        prompt: PromptInput::Tokens(prompt_ids),
        multi_modal: Some(MultiModalData { audio }),
        stop_token_ids: None,
        lora_requests: None,
    })
}
