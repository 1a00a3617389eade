//! Bloom prediction models and the cache policy

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Version tag stored with every prediction produced by the LSTM pipeline
pub const MODEL_VERSION: &str = "LSTM-v1.0";

/// Value of `metadata.analysis_type` on stored predictions
pub const COMPLETE_ANALYSIS: &str = "complete_ml_analysis";

/// Default cache freshness window
pub const DEFAULT_FRESHNESS_DAYS: i64 = 7;

/// Kind of chart/metrics block stored alongside a prediction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Training,
    Timeline,
    Phenology,
    Precipitation,
    Temperature,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Training => "training",
            AnalysisType::Timeline => "timeline",
            AnalysisType::Phenology => "phenology",
            AnalysisType::Precipitation => "precipitation",
            AnalysisType::Temperature => "temperature",
        }
    }
}

impl TryFrom<String> for AnalysisType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "training" => Ok(AnalysisType::Training),
            "timeline" => Ok(AnalysisType::Timeline),
            "phenology" => Ok(AnalysisType::Phenology),
            "precipitation" => Ok(AnalysisType::Precipitation),
            "temperature" => Ok(AnalysisType::Temperature),
            _ => Err(format!("unknown analysis type: {}", value)),
        }
    }
}

/// Which pipeline stage returned a satellite image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Timeline,
    Prediction,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Timeline => "timeline",
            ImageType::Prediction => "prediction",
        }
    }

    /// Value of `metadata.source` on stored images
    pub fn source(&self) -> &'static str {
        match self {
            ImageType::Timeline => "timeline_analysis",
            ImageType::Prediction => "prediction_analysis",
        }
    }
}

impl TryFrom<String> for ImageType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "timeline" => Ok(ImageType::Timeline),
            "prediction" => Ok(ImageType::Prediction),
            _ => Err(format!("unknown image type: {}", value)),
        }
    }
}

// ============================================================================
// Cache policy
// ============================================================================

/// Whether a response was served from stored results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Why the pipeline has to run
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    NoPrediction,
    Stale,
    Forced,
}

/// Outcome of the cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    Hit,
    Miss(MissReason),
}

impl CacheDecision {
    pub fn status(&self) -> CacheStatus {
        match self {
            CacheDecision::Hit => CacheStatus::Hit,
            CacheDecision::Miss(_) => CacheStatus::Miss,
        }
    }
}

/// A prediction created at or after `now - window` is fresh
///
/// Timestamps ahead of `now` (clock skew between hosts) also count as fresh.
pub fn is_fresh(created_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    created_at >= now - window
}

/// Decide between serving the newest stored prediction and recomputing
pub fn decide_cache(
    latest_created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
    force: bool,
) -> CacheDecision {
    if force {
        return CacheDecision::Miss(MissReason::Forced);
    }
    match latest_created_at {
        None => CacheDecision::Miss(MissReason::NoPrediction),
        Some(created_at) if is_fresh(created_at, now, window) => CacheDecision::Hit,
        Some(_) => CacheDecision::Miss(MissReason::Stale),
    }
}

// ============================================================================
// Pipeline parameters
// ============================================================================

/// Reference date the model analyses for a target year
///
/// Inside the growing season (May to September) today's month and day are
/// used; otherwise mid-July.
pub fn analysis_date_for(today: NaiveDate, year: i32) -> Option<NaiveDate> {
    let month = today.month();
    if (5..=9).contains(&month) {
        NaiveDate::from_ymd_opt(year, month, today.day())
    } else {
        NaiveDate::from_ymd_opt(year, 7, 15)
    }
}

/// Arithmetic mean of a series
pub fn series_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Largest value of a series
pub fn series_max(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| match acc {
        Some(m) if m >= v => Some(m),
        _ => Some(v),
    })
}

/// Parameters sent to the bloom model for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictionParams {
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

impl PredictionParams {
    /// Apply per-request year overrides and check the resulting range
    pub fn with_overrides(
        mut self,
        start_year: Option<i32>,
        end_year: Option<i32>,
        prediction_year: Option<i32>,
    ) -> Result<Self, &'static str> {
        if let Some(year) = start_year {
            self.start_year = year;
        }
        if let Some(year) = end_year {
            self.end_year = year;
        }
        if let Some(year) = prediction_year {
            self.prediction_year = year;
        }
        crate::validation::validate_prediction_years(
            self.start_year,
            self.end_year,
            self.prediction_year,
        )?;
        Ok(self)
    }
}

/// Request body for `POST /bloom-predictions`
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreatePredictionInput {
    #[validate(required)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub force_new_analysis: Option<bool>,
    #[validate(range(min = 1, max = 365))]
    pub freshness_days: Option<i64>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub prediction_year: Option<i32>,
}

impl CreatePredictionInput {
    pub fn force(&self) -> bool {
        self.force_new_analysis.unwrap_or(false)
    }

    pub fn freshness_window(&self, default_days: i64) -> Duration {
        Duration::days(self.freshness_days.unwrap_or(default_days))
    }
}
