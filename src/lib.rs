//! VoxRun Library
//!
//! Core library for the voxrun offline audio language model runner.

pub mod assets;
pub mod inference;
pub mod models;
pub mod runner;
pub mod storage;
pub mod types;
