//! External API integrations

pub mod bloom_model;

pub use bloom_model::{BloomModel, BloomModelClient, BloomModelError, PipelineStage};
