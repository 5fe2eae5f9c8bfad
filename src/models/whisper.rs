//! Whisper prompt builder
//!
//! Transcription only: exactly one audio clip, and the prompt is the decoder
//! start token.

use crate::models::BuildError;
use crate::types::{EngineOptions, ModalityLimits, ModelRequestData, PromptInput};

const MODEL_REPO: &str = "openai/whisper-large-v3-turbo";

// Whisper transcribes the clip; the question never enters its prompt.
pub(crate) fn build(_question: &str, audio_count: usize) -> Result<ModelRequestData, BuildError> {
    if audio_count != 1 {
        return Err(BuildError::UnsupportedAudioCount {
            model: "whisper",
            count: audio_count,
        });
    }

    Ok(ModelRequestData {
        engine_options: EngineOptions {
            model: MODEL_REPO.to_string(),
            max_model_len: 448,
            max_num_seqs: 5,
            limit_mm_per_prompt: ModalityLimits::audio(audio_count as u32),
            ..Default::default()
        },
        prompt: PromptInput::Text("<|startoftranscript|>".to_string()),
        multi_modal: None,
        stop_token_ids: None,
        lora_requests: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EffectiveLimits;

    #[test]
    fn test_single_audio_prompt() {
        let request = build("What is recited in the audio?", 1).unwrap();
        assert_eq!(request.prompt.as_text(), Some("<|startoftranscript|>"));
        assert_eq!(request.engine_options.max_model_len, 448);
        assert_eq!(request.engine_options.max_num_seqs, 5);
        assert_eq!(
            request.engine_options.limit_mm_per_prompt.resolve(),
            EffectiveLimits {
                image: 0,
                video: 0,
                audio: 1,
            }
        );
    }

    #[test]
    fn test_rejects_other_audio_counts() {
        for count in [0, 2] {
            let err = build("q", count).unwrap_err();
            assert!(matches!(
                err,
                BuildError::UnsupportedAudioCount {
                    model: "whisper",
                    count: c,
                } if c == count
            ));
        }
    }
}
