//! Request runner
//!
//! Glues a CLI selection to one generate call: look up the builder, resolve
//! the declared modality limits over zeroed defaults, replicate the input
//! for batch runs, and print the completions.

use thiserror::Error;

use crate::assets::{self, AssetError};
use crate::inference::engine::{Engine, EngineError, GenerationInput};
use crate::models::{self, BuildError, ModelKind};
use crate::storage::settings::load_settings;
use crate::storage::StorageError;
use crate::types::{EngineOptions, LoraRequest, ModelRequestData, SamplingOptions};

/// Parsed CLI selection
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub model_type: String,
    pub num_prompts: usize,
    pub num_audios: usize,
    pub seed: Option<u32>,
}

/// Errors from a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("model type {key} is not supported; expected one of: {expected}")]
    UnknownModel { key: String, expected: String },
    #[error("--num-audios must be 0, 1 or 2 (got {0})")]
    InvalidAudioCount(usize),
    #[error("--num-prompts must be greater than 0")]
    InvalidNumPrompts,
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Overlay the CLI seed on the builder's engine options
pub fn apply_seed(mut options: EngineOptions, seed: Option<u32>) -> EngineOptions {
    if seed.is_some() {
        options.seed = seed;
    }
    options
}

/// The same input, `num_prompts` times over
pub fn replicate_inputs(input: &GenerationInput, num_prompts: usize) -> Vec<GenerationInput> {
    vec![input.clone(); num_prompts]
}

/// The builder's LoRA requests repeated once per prompt, as the engine
/// expects one entry per input
pub fn replicate_lora(
    requests: Option<&[LoraRequest]>,
    num_prompts: usize,
) -> Option<Vec<LoraRequest>> {
    requests.map(|requests| {
        let mut repeated = Vec::with_capacity(requests.len() * num_prompts);
        for _ in 0..num_prompts {
            repeated.extend_from_slice(requests);
        }
        repeated
    })
}

/// Sampling for the demo: low temperature so identical batched prompts can
/// still produce different outputs, and a short output budget
pub fn demo_sampling(request: &ModelRequestData, seed: Option<u32>) -> SamplingOptions {
    SamplingOptions {
        temperature: 0.2,
        max_tokens: 64,
        stop_token_ids: request.stop_token_ids.clone(),
        seed,
    }
}

/// Execute one demo run end to end
pub async fn run(args: RunArgs) -> Result<(), RunError> {
    let kind = ModelKind::from_key(&args.model_type).ok_or_else(|| RunError::UnknownModel {
        key: args.model_type.clone(),
        expected: ModelKind::keys().join(", "),
    })?;
    if args.num_prompts == 0 {
        return Err(RunError::InvalidNumPrompts);
    }
    let question = assets::question_for_audio_count(args.num_audios)
        .ok_or(RunError::InvalidAudioCount(args.num_audios))?;

    let settings = load_settings();

    tracing::info!("Building {} request: {:?}", kind, question);
    let request = models::build_request(kind, question, args.num_audios, &settings).await?;

    // disable the modalities the builder did not mention
    let effective_limits = request.engine_options.limit_mm_per_prompt.resolve();
    tracing::info!(
        "Modality limits: image={} video={} audio={}",
        effective_limits.image,
        effective_limits.video,
        effective_limits.audio
    );

    let options = apply_seed(request.engine_options.clone(), args.seed);

    let audio = match &request.multi_modal {
        Some(payload) => payload.audio.clone(),
        None if args.num_audios > 0 => assets::load_default_audio(args.num_audios).await?,
        None => Vec::new(),
    };

    let input = GenerationInput {
        prompt: request.prompt.clone(),
        audio,
    };
    let inputs = replicate_inputs(&input, args.num_prompts);
    let lora = replicate_lora(request.lora_requests.as_deref(), args.num_prompts);
    let sampling = demo_sampling(&request, args.seed);

    let mut engine = Engine::load(&options, &settings, request.lora_requests.as_deref()).await?;
    let outputs = engine.generate(&inputs, &sampling, lora.as_deref())?;

    for output in outputs {
        println!("{}", output.text);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptInput;

    fn sample_input() -> GenerationInput {
        GenerationInput {
            prompt: PromptInput::Text("<|startoftranscript|>".to_string()),
            audio: Vec::new(),
        }
    }

    #[test]
    fn test_inputs_are_replicated_identically() {
        let inputs = replicate_inputs(&sample_input(), 3);
        assert_eq!(inputs.len(), 3);
        for input in &inputs {
            assert_eq!(input.prompt.as_text(), Some("<|startoftranscript|>"));
        }
    }

    #[test]
    fn test_lora_requests_repeat_per_prompt() {
        let requests = vec![LoraRequest::new("speech", 1, "owner/repo/speech-lora")];
        let repeated = replicate_lora(Some(&requests), 3).unwrap();
        assert_eq!(repeated.len(), 3);
        assert!(repeated.iter().all(|r| r == &requests[0]));
    }

    #[test]
    fn test_no_lora_stays_absent() {
        assert!(replicate_lora(None, 3).is_none());
    }

    #[test]
    fn test_seed_overlay() {
        let options = apply_seed(EngineOptions::default(), Some(7));
        assert_eq!(options.seed, Some(7));

        let untouched = apply_seed(
            EngineOptions {
                seed: Some(3),
                ..Default::default()
            },
            None,
        );
        assert_eq!(untouched.seed, Some(3));
    }

    #[test]
    fn test_demo_sampling_carries_stop_ids() {
        let request = ModelRequestData {
            engine_options: EngineOptions::default(),
            prompt: PromptInput::Text("hi".to_string()),
            multi_modal: None,
            stop_token_ids: Some(vec![2, 151_645]),
            lora_requests: None,
        };
        let sampling = demo_sampling(&request, Some(42));
        assert_eq!(sampling.temperature, 0.2);
        assert_eq!(sampling.max_tokens, 64);
        assert_eq!(sampling.stop_token_ids, Some(vec![2, 151_645]));
        assert_eq!(sampling.seed, Some(42));
    }

    #[tokio::test]
    async fn test_unknown_model_is_rejected() {
        let err = run(RunArgs {
            model_type: "gpt-oss".to_string(),
            num_prompts: 1,
            num_audios: 0,
            seed: None,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RunError::UnknownModel { .. }));
    }

    #[tokio::test]
    async fn test_zero_prompts_is_rejected() {
        let err = run(RunArgs {
            model_type: "whisper".to_string(),
            num_prompts: 0,
            num_audios: 1,
            seed: None,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RunError::InvalidNumPrompts));
    }

    #[tokio::test]
    async fn test_out_of_range_audio_count_is_rejected() {
        let err = run(RunArgs {
            model_type: "qwen2_audio".to_string(),
            num_prompts: 1,
            num_audios: 5,
            seed: None,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RunError::InvalidAudioCount(5)));
    }
}
