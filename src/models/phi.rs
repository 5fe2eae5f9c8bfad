//! Phi-4-multimodal prompt builders
//!
//! Two registry entries for the same family: the original release with
//! numbered audio placeholders, and the revised upload (`refs/pr/70`) with
//! un-numbered ones. Both apply the repo's bundled speech LoRA.

use crate::models::BuildError;
use crate::types::{EngineOptions, LoraRequest, ModalityLimits, ModelRequestData, PromptInput};

const MODEL_REPO: &str = "microsoft/Phi-4-multimodal-instruct";
const REVISED_REVISION: &str = "refs/pr/70";

/// `<|audio_1|><|audio_2|>...` placeholders
pub(crate) fn numbered_placeholders(audio_count: usize) -> String {
    (0..audio_count)
        .map(|idx| format!("<|audio_{}|>", idx + 1))
        .collect()
}

pub(crate) fn prompt_for(placeholders: &str, question: &str) -> String {
    format!("<|user|>{placeholders}{question}<|end|><|assistant|>")
}

fn speech_lora() -> LoraRequest {
    // the speech adapter lives alongside the base weights in the model repo
    LoraRequest::new("speech", 1, format!("{MODEL_REPO}/speech-lora"))
}

fn engine_options(revision: Option<&str>, audio_count: usize) -> EngineOptions {
    EngineOptions {
        model: MODEL_REPO.to_string(),
        revision: revision.map(str::to_string),
        media_marker: Some("<|audio|>".to_string()),
        max_model_len: 12_800,
        max_num_seqs: 2,
        limit_mm_per_prompt: ModalityLimits::audio(audio_count as u32),
        enable_lora: true,
        max_lora_rank: 320,
        ..Default::default()
    }
}

pub(crate) fn build_phi4_mm(
    question: &str,
    audio_count: usize,
) -> Result<ModelRequestData, BuildError> {
    let placeholders = numbered_placeholders(audio_count);

    Ok(ModelRequestData {
        engine_options: engine_options(None, audio_count),
        prompt: PromptInput::Text(prompt_for(&placeholders, question)),
        multi_modal: None,
        stop_token_ids: None,
        lora_requests: Some(vec![speech_lora()]),
    })
}

pub(crate) fn build_phi4_multimodal(
    question: &str,
    audio_count: usize,
) -> Result<ModelRequestData, BuildError> {
    let placeholders = "<|audio|>".repeat(audio_count);

    Ok(ModelRequestData {
        engine_options: engine_options(Some(REVISED_REVISION), audio_count),
        prompt: PromptInput::Text(prompt_for(&placeholders, question)),
        multi_modal: None,
        stop_token_ids: None,
        lora_requests: Some(vec![speech_lora()]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_placeholders() {
        assert_eq!(numbered_placeholders(0), "");
        assert_eq!(numbered_placeholders(2), "<|audio_1|><|audio_2|>");
    }

    #[test]
    fn test_phi4_mm_prompt_shape() {
        let request = build_phi4_mm("What is recited in the audio?", 1).unwrap();
        assert_eq!(
            request.prompt.as_text(),
            Some("<|user|><|audio_1|>What is recited in the audio?<|end|><|assistant|>")
        );
        assert!(request.engine_options.revision.is_none());
    }

    #[test]
    fn test_revised_upload_uses_unnumbered_placeholders() {
        let request = build_phi4_multimodal("q", 2).unwrap();
        assert_eq!(
            request.prompt.as_text(),
            Some("<|user|><|audio|><|audio|>q<|end|><|assistant|>")
        );
        assert_eq!(
            request.engine_options.revision.as_deref(),
            Some("refs/pr/70")
        );
    }

    #[test]
    fn test_speech_lora_configuration() {
        for request in [build_phi4_mm("q", 1).unwrap(), build_phi4_multimodal("q", 1).unwrap()] {
            assert!(request.engine_options.enable_lora);
            assert_eq!(request.engine_options.max_lora_rank, 320);
            assert_eq!(request.engine_options.max_model_len, 12_800);

            let lora = request.lora_requests.unwrap();
            assert_eq!(lora.len(), 1);
            assert!(lora[0].path.ends_with("/speech-lora"));
        }
    }
}
