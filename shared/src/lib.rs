//! Shared types and models for the TerraView agricultural monitoring platform
//!
//! This crate contains the domain rules shared between the backend, the
//! dashboards (via WASM), and tests: contribution point values, level
//! thresholds, the badge catalog, ranking aggregation, and the prediction
//! cache freshness policy. It performs no I/O.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
