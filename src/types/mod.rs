//! Shared type definitions
//!
//! This module contains the data model shared between the prompt builders,
//! the runner, and the inference engine.

pub mod options;
pub mod request;

pub use options::{EffectiveLimits, EngineOptions, ModalityLimits, SamplingOptions};
pub use request::{LoraRequest, ModelRequestData, MultiModalData, PromptInput};
