//! Bloom Prediction Model Client
//!
//! Client for the LSTM bloom prediction service. The service exposes three
//! stages (train, flowering timeline, prediction) with Spanish field names.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage, reported when a call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Train,
    Timeline,
    Predict,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Train => "train",
            PipelineStage::Timeline => "timeline",
            PipelineStage::Predict => "predict",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            PipelineStage::Train => "entrenar",
            PipelineStage::Timeline => "timeline-floracion",
            PipelineStage::Predict => "predecir",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure talking to the prediction service
#[derive(Debug, Error)]
pub enum BloomModelError {
    #[error("bloom model {stage} stage timed out")]
    Timeout { stage: PipelineStage },

    #[error("bloom model {stage} stage returned an invalid response: {detail}")]
    BadResponse { stage: PipelineStage, detail: String },

    #[error("bloom model {stage} stage unavailable: {detail}")]
    Unavailable { stage: PipelineStage, detail: String },
}

impl BloomModelError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            BloomModelError::Timeout { stage }
            | BloomModelError::BadResponse { stage, .. }
            | BloomModelError::Unavailable { stage, .. } => *stage,
        }
    }
}

// ============================================================================
// Request/response payloads
// ============================================================================

/// Body of `POST /entrenar`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrainRequest {
    #[serde(rename = "latitud")]
    pub latitude: f64,
    #[serde(rename = "longitud")]
    pub longitude: f64,
    #[serde(rename = "año_inicio")]
    pub start_year: i32,
    #[serde(rename = "año_fin")]
    pub end_year: i32,
    pub epochs: u32,
    pub batch_size: u32,
    #[serde(rename = "tipo_modelo")]
    pub model_type: String,
}

/// Body of `POST /timeline-floracion` and `POST /predecir`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ForecastRequest {
    #[serde(rename = "latitud")]
    pub latitude: f64,
    #[serde(rename = "longitud")]
    pub longitude: f64,
    /// Analysis date, `YYYY-MM-DD`
    #[serde(rename = "fecha_actual")]
    pub analysis_date: String,
    #[serde(rename = "año_actual")]
    pub year: i32,
    #[serde(rename = "dias_historia")]
    pub history_days: u32,
    /// Crop season start, `MM-DD`
    #[serde(rename = "dia_inicio_cultivo")]
    pub season_start: String,
}

/// Convert a stored coordinate to the float the service expects
pub fn coordinate(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainMetrics {
    pub mae: f64,
    pub rmse: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingChart {
    #[serde(rename = "epocas")]
    pub epochs: Vec<f64>,
    pub loss_train: Vec<f64>,
    pub loss_val: Vec<f64>,
    pub mae_train: Vec<f64>,
    pub mae_val: Vec<f64>,
}

/// Response of `POST /entrenar`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainResult {
    #[serde(rename = "mensaje", default)]
    pub message: String,
    #[serde(rename = "metricas", default)]
    pub metrics: Option<TrainMetrics>,
    #[serde(rename = "mejor_epoca", default)]
    pub best_epoch: Option<i64>,
    #[serde(rename = "ruta_modelo", default)]
    pub model_path: Option<String>,
    #[serde(rename = "grafica_metricas", default)]
    pub chart: Option<TrainingChart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelinePoint {
    #[serde(rename = "fecha")]
    pub date: String,
    #[serde(rename = "probabilidad")]
    pub probability: f64,
    #[serde(rename = "gdc_proyectado")]
    pub projected_gdd: f64,
    #[serde(rename = "dia_del_anio")]
    pub day_of_year: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineChart {
    #[serde(rename = "fechas")]
    pub dates: Vec<String>,
    #[serde(rename = "probabilidades")]
    pub probabilities: Vec<f64>,
    #[serde(rename = "gdc_proyectado")]
    pub projected_gdd: Vec<f64>,
    #[serde(rename = "dias_del_anio")]
    pub days_of_year: Vec<i64>,
}

/// A satellite image returned by the timeline or prediction stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelImage {
    pub url: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "fecha_solicitada", default)]
    pub requested_date: Option<String>,
    #[serde(rename = "fecha_imagen", default)]
    pub image_date: Option<String>,
    #[serde(default)]
    pub cloud_cover: Option<f64>,
}

/// Response of `POST /timeline-floracion`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineResult {
    #[serde(rename = "fecha_pico_probabilidad")]
    pub peak_date: String,
    #[serde(rename = "probabilidad_maxima")]
    pub max_probability: f64,
    #[serde(default)]
    pub timeline: Vec<TimelinePoint>,
    #[serde(rename = "grafica_timeline", default)]
    pub chart: Option<TimelineChart>,
    #[serde(rename = "imagenes_satelitales", default)]
    pub images: Vec<ModelImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhenologyChart {
    #[serde(rename = "fechas")]
    pub dates: Vec<String>,
    #[serde(rename = "gdc_acumulado", default)]
    pub accumulated_gdd: Vec<f64>,
    #[serde(default)]
    pub ndvi: Vec<f64>,
    #[serde(rename = "precipitacion_mm", default, skip_serializing_if = "Option::is_none")]
    pub precipitation_mm: Option<Vec<f64>>,
    #[serde(rename = "precipitacion_acumulada", default, skip_serializing_if = "Option::is_none")]
    pub precipitation_accumulated: Option<Vec<f64>>,
    #[serde(rename = "temperatura_media", default, skip_serializing_if = "Option::is_none")]
    pub temperature_mean: Option<Vec<f64>>,
    #[serde(rename = "temperatura_max", default, skip_serializing_if = "Option::is_none")]
    pub temperature_max: Option<Vec<f64>>,
    #[serde(rename = "temperatura_min", default, skip_serializing_if = "Option::is_none")]
    pub temperature_min: Option<Vec<f64>>,
    #[serde(rename = "fecha_floracion_predicha", default, skip_serializing_if = "Option::is_none")]
    pub predicted_bloom_date: Option<String>,
}

/// Response of `POST /predecir`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResult {
    #[serde(rename = "fecha_actual")]
    pub analysis_date: String,
    #[serde(rename = "fecha_floracion_predicha")]
    pub predicted_bloom_date: String,
    #[serde(rename = "dias_hasta_floracion")]
    pub days_to_bloom: i32,
    #[serde(rename = "gdc_acumulado")]
    pub accumulated_gdd: f64,
    #[serde(rename = "ndvi_actual", default)]
    pub ndvi: Option<f64>,
    #[serde(rename = "grafica_analisis", default)]
    pub chart: Option<PhenologyChart>,
    #[serde(rename = "imagenes_satelitales", default)]
    pub images: Vec<ModelImage>,
}

// ============================================================================
// Client
// ============================================================================

/// The three calls of the bloom prediction pipeline
#[async_trait]
pub trait BloomModel: Send + Sync {
    async fn train(&self, request: &TrainRequest) -> Result<TrainResult, BloomModelError>;

    async fn timeline(&self, request: &ForecastRequest) -> Result<TimelineResult, BloomModelError>;

    async fn predict(&self, request: &ForecastRequest)
        -> Result<PredictionResult, BloomModelError>;
}

/// HTTP client for the bloom prediction service
#[derive(Clone)]
pub struct BloomModelClient {
    base_url: String,
    http_client: Client,
}

impl BloomModelClient {
    /// Create a client with a per-request timeout
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn call<Req, Res>(&self, stage: PipelineStage, body: &Req) -> Result<Res, BloomModelError>
    where
        Req: Serialize + Sync,
        Res: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, stage.path());
        tracing::debug!(stage = %stage, url = %url, "Calling bloom model");

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BloomModelError::Timeout { stage }
                } else {
                    BloomModelError::Unavailable {
                        stage,
                        detail: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let detail = format!("API returned {}: {}", status, body);
            return Err(if status.is_server_error() {
                BloomModelError::Unavailable { stage, detail }
            } else {
                BloomModelError::BadResponse { stage, detail }
            });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                BloomModelError::Timeout { stage }
            } else {
                BloomModelError::BadResponse {
                    stage,
                    detail: format!("Failed to parse response: {}", e),
                }
            }
        })
    }
}

#[async_trait]
impl BloomModel for BloomModelClient {
    async fn train(&self, request: &TrainRequest) -> Result<TrainResult, BloomModelError> {
        self.call(PipelineStage::Train, request).await
    }

    async fn timeline(&self, request: &ForecastRequest) -> Result<TimelineResult, BloomModelError> {
        self.call(PipelineStage::Timeline, request).await
    }

    async fn predict(
        &self,
        request: &ForecastRequest,
    ) -> Result<PredictionResult, BloomModelError> {
        self.call(PipelineStage::Predict, request).await
    }
}
