//! Engine client
//!
//! Owns the llama.cpp backend, the loaded model, and (for audio models) the
//! multimodal projector context. The engine is a black box from the runner's
//! point of view: it takes resolved options plus inputs and returns one
//! completion per input.

use std::ffi::CString;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaLoraAdapter, LlamaModel, Special};
use llama_cpp_2::mtmd::{
    mtmd_default_marker, MtmdBitmap, MtmdContext, MtmdContextParams, MtmdInputText,
};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use thiserror::Error;

use crate::assets::audio::{write_wav, AudioBuffer};
use crate::assets::AssetError;
use crate::inference::model::{validate_gguf, ModelError};
use crate::storage::huggingface::{self, HubError, HubLocator};
use crate::storage::settings::RunnerSettings;
use crate::types::{EngineOptions, LoraRequest, PromptInput, SamplingOptions};

// llama.cpp example default; used when no seed is requested
const DEFAULT_SEED: u32 = 1234;

/// Errors from the engine client
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("generation failed: {0}")]
    Generate(String),
    #[error("detokenization failed: {0}")]
    Detokenize(String),
    #[error("media handling failed: {0}")]
    Media(String),
    #[error("{0} has no multimodal projector; audio inputs are unsupported")]
    MissingProjector(String),
    #[error("pre-tokenized prompts cannot carry audio attachments with this backend")]
    PretokenizedWithAudio,
    #[error("LoRA requests supplied but the engine options do not enable adapters")]
    AdaptersDisabled,
    #[error("cannot resolve LoRA adapter weights from '{0}'")]
    AdapterUnresolved(String),
    #[error("no adapter with id {0} was loaded")]
    UnknownAdapter(u32),
    #[error("media marker contains a nul byte")]
    Marker(#[from] std::ffi::NulError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// One input record for a generate call
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub prompt: PromptInput,
    /// Decoded clips, in the order the prompt's placeholders reference them
    pub audio: Vec<AudioBuffer>,
}

/// One completion, in input order
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub text: String,
    pub generated_tokens: usize,
}

/// A loaded model plus everything needed to run generate calls against it
pub struct Engine {
    backend: LlamaBackend,
    model: LlamaModel,
    mtmd: Option<MtmdContext>,
    adapters: Vec<(u32, LlamaLoraAdapter)>,
    enable_lora: bool,
    max_model_len: u32,
    n_batch: u32,
    seed: Option<u32>,
    scratch_dir: PathBuf,
}

impl Engine {
    /// Resolve weights and bring up the backend.
    ///
    /// Downloads the GGUF weights (and the multimodal projector when the
    /// options allow audio attachments), validates them, loads the model
    /// with the configured GPU offload, and initializes any LoRA adapters
    /// named by the builder.
    pub async fn load(
        options: &EngineOptions,
        settings: &RunnerSettings,
        lora_requests: Option<&[LoraRequest]>,
    ) -> Result<Self, EngineError> {
        let revision = options.revision.as_deref().unwrap_or("main");
        let limits = options.limit_mm_per_prompt.resolve();

        let gguf_path = huggingface::resolve_gguf(
            settings,
            &options.model,
            revision,
            options.gguf_file.as_deref(),
        )
        .await?;
        validate_gguf(&gguf_path)?;

        let mmproj_path = if limits.audio > 0 {
            let resolved = huggingface::resolve_mmproj(
                settings,
                &options.model,
                revision,
                options.mmproj_file.as_deref(),
            )
            .await?;
            match resolved {
                Some(path) => {
                    validate_gguf(&path)?;
                    Some(path)
                }
                None => return Err(EngineError::MissingProjector(options.model.clone())),
            }
        } else {
            None
        };

        let backend = LlamaBackend::init().map_err(|e| EngineError::Backend(e.to_string()))?;

        tracing::info!(
            "Loading model {} ({} GPU layers)",
            options.model,
            settings.gpu_layers
        );
        let model_params = LlamaModelParams::default().with_n_gpu_layers(settings.gpu_layers);
        let model = LlamaModel::load_from_file(&backend, &gguf_path, &model_params)
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        let mtmd = match mmproj_path {
            Some(path) => {
                let marker = options
                    .media_marker
                    .clone()
                    .unwrap_or_else(|| mtmd_default_marker().to_string());
                let mtmd_params = MtmdContextParams {
                    use_gpu: settings.gpu_layers > 0,
                    print_timings: false,
                    n_threads: settings.threads as i32,
                    media_marker: CString::new(marker)?,
                };
                let projector =
                    MtmdContext::init_from_file(&path.to_string_lossy(), &model, &mtmd_params)
                        .map_err(|e| EngineError::Media(e.to_string()))?;
                Some(projector)
            }
            None => None,
        };

        let mut adapters = Vec::new();
        if let Some(requests) = lora_requests {
            if !options.enable_lora && !requests.is_empty() {
                return Err(EngineError::AdaptersDisabled);
            }
            for request in requests {
                if adapters.iter().any(|(id, _)| *id == request.id) {
                    continue;
                }
                let path = resolve_adapter_weights(settings, request).await?;
                let adapter = model
                    .lora_adapter_init(&path)
                    .map_err(|e| EngineError::Backend(e.to_string()))?;
                tracing::info!("Loaded LoRA adapter '{}' from {:?}", request.name, path);
                adapters.push((request.id, adapter));
            }
        }

        let scratch_dir = settings.models_directory.join("scratch");
        std::fs::create_dir_all(&scratch_dir).map_err(AssetError::Io)?;

        Ok(Self {
            backend,
            model,
            mtmd,
            adapters,
            enable_lora: options.enable_lora,
            max_model_len: options.max_model_len,
            n_batch: options.max_model_len.clamp(512, 4096),
            seed: options.seed,
            scratch_dir,
        })
    }

    /// Run every input to completion, in order.
    ///
    /// The call blocks until all inputs are done; the sampler chain is shared
    /// across inputs so identical prompts can still diverge.
    pub fn generate(
        &mut self,
        inputs: &[GenerationInput],
        sampling: &SamplingOptions,
        lora: Option<&[LoraRequest]>,
    ) -> Result<Vec<GenerationOutput>, EngineError> {
        if lora.is_some_and(|requests| !requests.is_empty()) && !self.enable_lora {
            return Err(EngineError::AdaptersDisabled);
        }

        let seed = sampling.seed.or(self.seed).unwrap_or(DEFAULT_SEED);
        let mut sampler = build_sampler(sampling, seed);
        let stop_ids: &[u32] = sampling.stop_token_ids.as_deref().unwrap_or(&[]);

        let mut outputs = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let ctx_params = LlamaContextParams::default()
                .with_n_ctx(NonZeroU32::new(self.max_model_len))
                .with_n_batch(self.n_batch);
            let mut ctx = self
                .model
                .new_context(&self.backend, ctx_params)
                .map_err(|e| EngineError::Backend(e.to_string()))?;

            if let Some(requests) = lora {
                let mut applied = Vec::new();
                for request in requests {
                    if applied.contains(&request.id) {
                        continue;
                    }
                    let adapter = self
                        .adapters
                        .iter_mut()
                        .find(|(id, _)| *id == request.id)
                        .ok_or(EngineError::UnknownAdapter(request.id))?;
                    ctx.lora_adapter_set(&mut adapter.1, 1.0)
                        .map_err(|e| EngineError::Backend(e.to_string()))?;
                    applied.push(request.id);
                }
            }

            let n_past = if input.audio.is_empty() {
                prefill_text(&self.model, &mut ctx, &input.prompt, self.n_batch as usize)?
            } else {
                let mtmd = self
                    .mtmd
                    .as_ref()
                    .ok_or_else(|| EngineError::MissingProjector("this model".to_string()))?;
                let prompt = match &input.prompt {
                    PromptInput::Text(text) => text.as_str(),
                    PromptInput::Tokens(_) => return Err(EngineError::PretokenizedWithAudio),
                };
                prefill_media(
                    mtmd,
                    &mut ctx,
                    prompt,
                    &input.audio,
                    &self.scratch_dir,
                    index,
                    self.n_batch as i32,
                )?
            };

            let (text, generated_tokens) =
                decode_loop(&self.model, &mut ctx, &mut sampler, n_past, sampling, stop_ids)?;
            tracing::debug!("Input {index}: generated {generated_tokens} tokens");
            outputs.push(GenerationOutput {
                text,
                generated_tokens,
            });
        }

        Ok(outputs)
    }
}

/// Local adapter weights: an existing path, or a hub file locator
async fn resolve_adapter_weights(
    settings: &RunnerSettings,
    request: &LoraRequest,
) -> Result<PathBuf, EngineError> {
    let as_path = Path::new(&request.path);
    if as_path.exists() {
        return Ok(as_path.to_path_buf());
    }

    let locator = HubLocator::parse(&request.path)
        .map_err(|_| EngineError::AdapterUnresolved(request.path.clone()))?;
    if locator.filename.is_empty() {
        return Err(EngineError::AdapterUnresolved(request.path.clone()));
    }
    Ok(huggingface::download_file(
        settings,
        &locator.repo_id,
        &locator.revision,
        &locator.filename,
    )
    .await?)
}

fn build_sampler(sampling: &SamplingOptions, seed: u32) -> LlamaSampler {
    if sampling.temperature <= 0.0 {
        LlamaSampler::chain_simple([LlamaSampler::greedy()])
    } else {
        LlamaSampler::chain_simple([
            LlamaSampler::temp(sampling.temperature),
            LlamaSampler::dist(seed),
        ])
    }
}

/// Feed a text or pre-tokenized prompt through the model, returning the
/// position generation continues from
fn prefill_text(
    model: &LlamaModel,
    ctx: &mut LlamaContext,
    prompt: &PromptInput,
    n_batch: usize,
) -> Result<i32, EngineError> {
    let tokens: Vec<LlamaToken> = match prompt {
        PromptInput::Text(text) => model
            .str_to_token(text, AddBos::Never)
            .map_err(|e| EngineError::Generate(e.to_string()))?,
        PromptInput::Tokens(ids) => ids.iter().map(|&id| LlamaToken(id as i32)).collect(),
    };
    if tokens.is_empty() {
        return Err(EngineError::Generate("empty prompt".to_string()));
    }

    let mut batch = LlamaBatch::new(n_batch, 1);
    let last_index = tokens.len() - 1;
    let mut n_past = 0i32;

    for chunk in tokens.chunks(n_batch) {
        batch.clear();
        for (offset, token) in chunk.iter().enumerate() {
            let position = n_past + offset as i32;
            let is_last = position as usize == last_index;
            batch
                .add(*token, position, &[0], is_last)
                .map_err(|e| EngineError::Generate(e.to_string()))?;
        }
        ctx.decode(&mut batch)
            .map_err(|e| EngineError::Generate(e.to_string()))?;
        n_past += chunk.len() as i32;
    }

    Ok(n_past)
}

/// Feed a prompt with audio attachments through the multimodal tokenizer
fn prefill_media(
    mtmd: &MtmdContext,
    ctx: &mut LlamaContext,
    prompt: &str,
    audio: &[AudioBuffer],
    scratch_dir: &Path,
    input_index: usize,
    n_batch: i32,
) -> Result<i32, EngineError> {
    let mut bitmaps = Vec::with_capacity(audio.len());
    for (clip_index, buffer) in audio.iter().enumerate() {
        let clip_path = scratch_dir.join(format!("clip-{input_index}-{clip_index}.wav"));
        write_wav(buffer, &clip_path)?;
        let bitmap = MtmdBitmap::from_file(mtmd, &clip_path.to_string_lossy())
            .map_err(|e| EngineError::Media(e.to_string()))?;
        bitmaps.push(bitmap);
    }

    let input_text = MtmdInputText {
        text: prompt.to_string(),
        add_special: true,
        parse_special: true,
    };
    let bitmap_refs: Vec<&MtmdBitmap> = bitmaps.iter().collect();

    let chunks = mtmd
        .tokenize(input_text, &bitmap_refs)
        .map_err(|e| EngineError::Media(e.to_string()))?;

    let n_past = chunks
        .eval_chunks(mtmd, ctx, 0, 0, n_batch, true)
        .map_err(|e| EngineError::Media(e.to_string()))?;

    Ok(n_past)
}

/// Sample tokens until EOG, a stop token, or the output budget
fn decode_loop(
    model: &LlamaModel,
    ctx: &mut LlamaContext,
    sampler: &mut LlamaSampler,
    mut n_past: i32,
    sampling: &SamplingOptions,
    stop_ids: &[u32],
) -> Result<(String, usize), EngineError> {
    let mut batch = LlamaBatch::new(1, 1);
    let mut text = String::new();
    let mut generated = 0usize;

    for _ in 0..sampling.max_tokens {
        let token = sampler.sample(ctx, -1);
        sampler.accept(token);

        if model.is_eog_token(token) {
            break;
        }
        if stop_ids.contains(&(token.0 as u32)) {
            break;
        }

        let piece = model
            .token_to_str(token, Special::Tokenize)
            .map_err(|e| EngineError::Detokenize(e.to_string()))?;
        text.push_str(&piece);
        generated += 1;

        batch.clear();
        batch
            .add(token, n_past, &[0], true)
            .map_err(|e| EngineError::Generate(e.to_string()))?;
        n_past += 1;
        ctx.decode(&mut batch)
            .map_err(|e| EngineError::Generate(e.to_string()))?;
    }

    Ok((text, generated))
}
