//! LLM inference engine
//!
//! This module handles all interaction with llama.cpp for model loading and
//! generation.

pub mod engine;
pub mod model;

// Re-export main types for convenience
pub use engine::{Engine, EngineError, GenerationInput, GenerationOutput};
pub use model::{validate_gguf, GgufMetadata, ModelError, GGUF_MAGIC};
