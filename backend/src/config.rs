//! Configuration management for the TerraView backend
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with TERRAVIEW_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::models::PredictionParams;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Log output format: "pretty" or "json"
    pub log_format: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT verification configuration
    pub jwt: JwtConfig,

    /// Bloom prediction service configuration
    pub bloom_model: BloomModelConfig,

    /// Prediction cache configuration
    pub prediction_cache: PredictionCacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Shared secret the auth provider signs access tokens with
    pub secret: String,

    /// Expected `aud` claim
    pub audience: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BloomModelConfig {
    /// Base URL of the prediction service
    pub base_url: String,

    /// Timeout for a single request to the service
    pub request_timeout_secs: u64,

    /// Timeout for the whole train/timeline/predict pipeline
    pub pipeline_timeout_secs: u64,

    pub start_year: i32,
    pub end_year: i32,
    pub prediction_year: i32,
    pub epochs: u32,
    pub batch_size: u32,
    pub model_type: String,
    pub history_days: u32,

    /// Crop season start as `MM-DD`
    pub season_start: String,
}

impl BloomModelConfig {
    /// Default pipeline parameters before per-request overrides
    pub fn default_params(&self) -> PredictionParams {
        PredictionParams {
            start_year: self.start_year,
            end_year: self.end_year,
            prediction_year: self.prediction_year,
            epochs: self.epochs,
            batch_size: self.batch_size,
            model_type: self.model_type.clone(),
            history_days: self.history_days,
            season_start: self.season_start.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictionCacheConfig {
    /// Predictions younger than this are served from storage
    pub freshness_days: i64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("TERRAVIEW_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("log_format", "pretty")?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.audience", "authenticated")?
            .set_default("bloom_model.base_url", "http://localhost:8000")?
            .set_default("bloom_model.request_timeout_secs", 300)?
            .set_default("bloom_model.pipeline_timeout_secs", 900)?
            .set_default("bloom_model.start_year", 2018)?
            .set_default("bloom_model.end_year", 2024)?
            .set_default("bloom_model.prediction_year", 2025)?
            .set_default("bloom_model.epochs", 100)?
            .set_default("bloom_model.batch_size", 32)?
            .set_default("bloom_model.model_type", "lstm")?
            .set_default("bloom_model.history_days", 30)?
            .set_default("bloom_model.season_start", "05-15")?
            .set_default(
                "prediction_cache.freshness_days",
                shared::models::DEFAULT_FRESHNESS_DAYS,
            )?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (TERRAVIEW_ prefix)
            .add_source(
                Environment::with_prefix("TERRAVIEW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
