//! Bloom prediction cache
//!
//! A request is served from the newest stored prediction for the
//! (location, farmer) pair when it is inside the freshness window. Otherwise
//! the train, timeline, and predict stages run in order under one deadline,
//! and the result is stored together with its analyses and images in a
//! single transaction. A failed or timed-out stage stores nothing.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use shared::models::{
    analysis_date_for, decide_cache, series_max, series_mean, AnalysisType, CacheDecision,
    CacheStatus, CreatePredictionInput, ImageType, PredictionParams, COMPLETE_ANALYSIS,
    MODEL_VERSION,
};
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::external::bloom_model::{
    coordinate, BloomModel, BloomModelError, ForecastRequest, ModelImage, PipelineStage,
    PredictionResult, TimelineResult, TrainRequest, TrainResult,
};
use crate::services::location::FarmLocation;
use crate::AppState;

/// Most predictions returned by the list endpoint
pub const MAX_LISTED_PREDICTIONS: i64 = 50;

// ============================================================================
// Stored records
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BloomPrediction {
    pub id: Uuid,
    pub location_id: Uuid,
    pub farmer_id: Uuid,
    pub prediction_date: NaiveDate,
    pub analysis_date: NaiveDate,
    pub predicted_bloom_date: NaiveDate,
    pub days_to_bloom: i32,
    pub gdc_accumulated: f64,
    pub ndvi_value: Option<f64>,
    pub confidence_score: Option<f64>,
    pub temperature_avg: Option<f64>,
    pub precipitation_total: Option<f64>,
    pub model_version: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PredictionAnalysis {
    pub id: Uuid,
    pub prediction_id: Uuid,
    pub farmer_id: Uuid,
    #[sqlx(try_from = "String")]
    pub analysis_type: AnalysisType,
    pub chart_data: serde_json::Value,
    pub metrics: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SatelliteImage {
    pub id: Uuid,
    pub prediction_id: Uuid,
    pub farmer_id: Uuid,
    pub image_url: String,
    pub image_path: Option<String>,
    pub description: String,
    pub requested_date: Option<NaiveDate>,
    pub image_date: Option<NaiveDate>,
    pub cloud_cover: Option<f64>,
    #[sqlx(try_from = "String")]
    pub image_type: ImageType,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A prediction with everything stored alongside it
#[derive(Debug, Clone, Serialize)]
pub struct PredictionDetails {
    pub prediction: BloomPrediction,
    pub analyses: Vec<PredictionAnalysis>,
    pub images: Vec<SatelliteImage>,
}

// ============================================================================
// Records to insert
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysis {
    pub analysis_type: AnalysisType,
    pub chart_data: serde_json::Value,
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub image_url: String,
    pub description: String,
    pub requested_date: Option<NaiveDate>,
    pub image_date: Option<NaiveDate>,
    pub cloud_cover: Option<f64>,
    pub image_type: ImageType,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub location_id: Uuid,
    pub farmer_id: Uuid,
    pub analysis_date: NaiveDate,
    pub predicted_bloom_date: NaiveDate,
    pub days_to_bloom: i32,
    pub gdc_accumulated: f64,
    pub ndvi_value: Option<f64>,
    pub temperature_avg: Option<f64>,
    pub precipitation_total: Option<f64>,
    pub model_version: String,
    pub metadata: serde_json::Value,
    pub analyses: Vec<NewAnalysis>,
    pub images: Vec<NewImage>,
}

fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|v| NaiveDate::parse_from_str(v.get(..10).unwrap_or(v), "%Y-%m-%d").ok())
}

fn new_images(images: &[ModelImage], image_type: ImageType) -> impl Iterator<Item = NewImage> + '_ {
    images.iter().map(move |img| NewImage {
        image_url: img.url.clone(),
        description: img.description.clone(),
        requested_date: parse_date(img.requested_date.as_deref()),
        image_date: parse_date(img.image_date.as_deref()),
        cloud_cover: img.cloud_cover,
        image_type,
        metadata: serde_json::json!({ "source": image_type.source() }),
    })
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Turn the three stage results into the records to store
pub fn assemble_prediction(
    location_id: Uuid,
    farmer_id: Uuid,
    params: &PredictionParams,
    analysis_date: NaiveDate,
    train: &TrainResult,
    timeline: &TimelineResult,
    prediction: &PredictionResult,
) -> Result<NewPrediction, BloomModelError> {
    let predicted_bloom_date = parse_date(Some(&prediction.predicted_bloom_date)).ok_or_else(|| {
        BloomModelError::BadResponse {
            stage: PipelineStage::Predict,
            detail: format!(
                "Invalid predicted bloom date: {}",
                prediction.predicted_bloom_date
            ),
        }
    })?;

    let chart = prediction.chart.as_ref();
    let temperature_avg = chart
        .and_then(|c| c.temperature_mean.as_deref())
        .and_then(series_mean);
    let precipitation_total = chart
        .and_then(|c| c.precipitation_accumulated.as_deref())
        .and_then(series_max);

    let mut analyses = Vec::new();
    if let Some(training_chart) = &train.chart {
        analyses.push(NewAnalysis {
            analysis_type: AnalysisType::Training,
            chart_data: to_json(training_chart),
            metrics: train.metrics.as_ref().map(to_json),
        });
    }
    if let Some(timeline_chart) = &timeline.chart {
        analyses.push(NewAnalysis {
            analysis_type: AnalysisType::Timeline,
            chart_data: to_json(timeline_chart),
            metrics: Some(serde_json::json!({
                "fecha_pico_probabilidad": timeline.peak_date,
                "probabilidad_maxima": timeline.max_probability,
            })),
        });
    }
    if let Some(phenology) = chart {
        analyses.push(NewAnalysis {
            analysis_type: AnalysisType::Phenology,
            chart_data: to_json(phenology),
            metrics: None,
        });
        if let Some(precipitation_mm) = &phenology.precipitation_mm {
            analyses.push(NewAnalysis {
                analysis_type: AnalysisType::Precipitation,
                chart_data: serde_json::json!({
                    "fechas": phenology.dates,
                    "precipitacion_mm": precipitation_mm,
                    "precipitacion_acumulada": phenology.precipitation_accumulated,
                }),
                metrics: None,
            });
        }
        if let Some(temperature_mean) = &phenology.temperature_mean {
            analyses.push(NewAnalysis {
                analysis_type: AnalysisType::Temperature,
                chart_data: serde_json::json!({
                    "fechas": phenology.dates,
                    "temperatura_media": temperature_mean,
                    "temperatura_max": phenology.temperature_max,
                    "temperatura_min": phenology.temperature_min,
                }),
                metrics: None,
            });
        }
    }

    let images = new_images(&timeline.images, ImageType::Timeline)
        .chain(new_images(&prediction.images, ImageType::Prediction))
        .collect();

    Ok(NewPrediction {
        location_id,
        farmer_id,
        analysis_date,
        predicted_bloom_date,
        days_to_bloom: prediction.days_to_bloom,
        gdc_accumulated: prediction.accumulated_gdd,
        ndvi_value: prediction.ndvi,
        temperature_avg,
        precipitation_total,
        model_version: MODEL_VERSION.to_string(),
        metadata: serde_json::json!({
            "complete_params": params,
            "analysis_type": COMPLETE_ANALYSIS,
        }),
        analyses,
        images,
    })
}

// ============================================================================
// Storage
// ============================================================================

/// Persistence used by the prediction cache
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Newest prediction for a location owned by the farmer
    async fn latest(&self, location_id: Uuid, farmer_id: Uuid) -> AppResult<Option<BloomPrediction>>;

    async fn details(&self, prediction: BloomPrediction) -> AppResult<PredictionDetails>;

    /// Insert a prediction with its analyses and images, all or nothing
    async fn save(&self, new: NewPrediction) -> AppResult<PredictionDetails>;

    async fn list(
        &self,
        farmer_id: Uuid,
        location_id: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<BloomPrediction>>;

    async fn get(&self, farmer_id: Uuid, prediction_id: Uuid) -> AppResult<Option<BloomPrediction>>;

    /// Returns false when no owned prediction matched
    async fn delete(&self, farmer_id: Uuid, prediction_id: Uuid) -> AppResult<bool>;
}

/// PostgreSQL-backed prediction store
#[derive(Clone)]
pub struct PgPredictionStore {
    db: PgPool,
}

const PREDICTION_COLUMNS: &str = r#"
    id, location_id, farmer_id, prediction_date, analysis_date, predicted_bloom_date,
    days_to_bloom, gdc_accumulated, ndvi_value, confidence_score, temperature_avg,
    precipitation_total, model_version, metadata, created_at
"#;

const ANALYSIS_COLUMNS: &str =
    "id, prediction_id, farmer_id, analysis_type, chart_data, metrics, created_at";

const IMAGE_COLUMNS: &str = r#"
    id, prediction_id, farmer_id, image_url, image_path, description, requested_date,
    image_date, cloud_cover, image_type, metadata, created_at
"#;

impl PgPredictionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PredictionStore for PgPredictionStore {
    async fn latest(&self, location_id: Uuid, farmer_id: Uuid) -> AppResult<Option<BloomPrediction>> {
        let prediction = sqlx::query_as::<_, BloomPrediction>(&format!(
            r#"
            SELECT {}
            FROM bloom_predictions
            WHERE location_id = $1 AND farmer_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PREDICTION_COLUMNS
        ))
        .bind(location_id)
        .bind(farmer_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(prediction)
    }

    async fn details(&self, prediction: BloomPrediction) -> AppResult<PredictionDetails> {
        let analyses = sqlx::query_as::<_, PredictionAnalysis>(&format!(
            "SELECT {} FROM prediction_analysis WHERE prediction_id = $1 ORDER BY created_at, id",
            ANALYSIS_COLUMNS
        ))
        .bind(prediction.id)
        .fetch_all(&self.db)
        .await?;

        let images = sqlx::query_as::<_, SatelliteImage>(&format!(
            "SELECT {} FROM satellite_images WHERE prediction_id = $1 ORDER BY created_at, id",
            IMAGE_COLUMNS
        ))
        .bind(prediction.id)
        .fetch_all(&self.db)
        .await?;

        Ok(PredictionDetails {
            prediction,
            analyses,
            images,
        })
    }

    async fn save(&self, new: NewPrediction) -> AppResult<PredictionDetails> {
        let mut tx = self.db.begin().await?;

        let prediction = sqlx::query_as::<_, BloomPrediction>(&format!(
            r#"
            INSERT INTO bloom_predictions (
                location_id, farmer_id, analysis_date, predicted_bloom_date, days_to_bloom,
                gdc_accumulated, ndvi_value, temperature_avg, precipitation_total,
                model_version, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            PREDICTION_COLUMNS
        ))
        .bind(new.location_id)
        .bind(new.farmer_id)
        .bind(new.analysis_date)
        .bind(new.predicted_bloom_date)
        .bind(new.days_to_bloom)
        .bind(new.gdc_accumulated)
        .bind(new.ndvi_value)
        .bind(new.temperature_avg)
        .bind(new.precipitation_total)
        .bind(&new.model_version)
        .bind(&new.metadata)
        .fetch_one(&mut *tx)
        .await?;

        let mut analyses = Vec::with_capacity(new.analyses.len());
        for analysis in &new.analyses {
            let row = sqlx::query_as::<_, PredictionAnalysis>(&format!(
                r#"
                INSERT INTO prediction_analysis (prediction_id, farmer_id, analysis_type, chart_data, metrics)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {}
                "#,
                ANALYSIS_COLUMNS
            ))
            .bind(prediction.id)
            .bind(new.farmer_id)
            .bind(analysis.analysis_type.as_str())
            .bind(&analysis.chart_data)
            .bind(&analysis.metrics)
            .fetch_one(&mut *tx)
            .await?;
            analyses.push(row);
        }

        let mut images = Vec::with_capacity(new.images.len());
        for image in &new.images {
            let row = sqlx::query_as::<_, SatelliteImage>(&format!(
                r#"
                INSERT INTO satellite_images (
                    prediction_id, farmer_id, image_url, description, requested_date,
                    image_date, cloud_cover, image_type, metadata
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING {}
                "#,
                IMAGE_COLUMNS
            ))
            .bind(prediction.id)
            .bind(new.farmer_id)
            .bind(&image.image_url)
            .bind(&image.description)
            .bind(image.requested_date)
            .bind(image.image_date)
            .bind(image.cloud_cover)
            .bind(image.image_type.as_str())
            .bind(&image.metadata)
            .fetch_one(&mut *tx)
            .await?;
            images.push(row);
        }

        tx.commit().await?;

        Ok(PredictionDetails {
            prediction,
            analyses,
            images,
        })
    }

    async fn list(
        &self,
        farmer_id: Uuid,
        location_id: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<BloomPrediction>> {
        let predictions = sqlx::query_as::<_, BloomPrediction>(&format!(
            r#"
            SELECT {}
            FROM bloom_predictions
            WHERE farmer_id = $1 AND ($2::uuid IS NULL OR location_id = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
            PREDICTION_COLUMNS
        ))
        .bind(farmer_id)
        .bind(location_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(predictions)
    }

    async fn get(&self, farmer_id: Uuid, prediction_id: Uuid) -> AppResult<Option<BloomPrediction>> {
        let prediction = sqlx::query_as::<_, BloomPrediction>(&format!(
            "SELECT {} FROM bloom_predictions WHERE id = $1 AND farmer_id = $2",
            PREDICTION_COLUMNS
        ))
        .bind(prediction_id)
        .bind(farmer_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(prediction)
    }

    async fn delete(&self, farmer_id: Uuid, prediction_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM bloom_predictions WHERE id = $1 AND farmer_id = $2")
            .bind(prediction_id)
            .bind(farmer_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Service
// ============================================================================

/// Response to a prediction request
#[derive(Debug, Serialize)]
pub struct PredictionOutcome {
    pub cache: CacheStatus,
    #[serde(flatten)]
    pub details: PredictionDetails,
}

/// Prediction service combining the cache policy and the model pipeline
#[derive(Clone)]
pub struct PredictionService {
    store: Arc<dyn PredictionStore>,
    model: Arc<dyn BloomModel>,
    defaults: PredictionParams,
    freshness_days: i64,
    pipeline_timeout: Duration,
}

/// Run one stage, failing with a timeout for that stage at the deadline
async fn bounded<T, F>(deadline: Instant, stage: PipelineStage, call: F) -> Result<T, BloomModelError>
where
    F: Future<Output = Result<T, BloomModelError>>,
{
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(BloomModelError::Timeout { stage }),
    }
}

impl PredictionService {
    pub fn new(
        store: Arc<dyn PredictionStore>,
        model: Arc<dyn BloomModel>,
        defaults: PredictionParams,
        freshness_days: i64,
        pipeline_timeout: Duration,
    ) -> Self {
        Self {
            store,
            model,
            defaults,
            freshness_days,
            pipeline_timeout,
        }
    }

    /// Service backed by the application's database and model client
    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            Arc::new(PgPredictionStore::new(state.db.clone())),
            state.bloom_model.clone(),
            state.config.bloom_model.default_params(),
            state.config.prediction_cache.freshness_days,
            Duration::from_secs(state.config.bloom_model.pipeline_timeout_secs),
        )
    }

    /// Serve a cached prediction or compute and store a new one
    ///
    /// `location` must already be checked to belong to `farmer_id`.
    pub async fn request_prediction(
        &self,
        farmer_id: Uuid,
        location: &FarmLocation,
        input: &CreatePredictionInput,
    ) -> AppResult<PredictionOutcome> {
        input.validate()?;
        let params = self
            .defaults
            .clone()
            .with_overrides(input.start_year, input.end_year, input.prediction_year)
            .map_err(|msg| {
                AppError::validation(
                    "prediction_year",
                    msg,
                    "El rango de años de entrenamiento o predicción no es válido",
                )
            })?;

        let now = Utc::now();
        let latest = self.store.latest(location.id, farmer_id).await?;
        let decision = decide_cache(
            latest.as_ref().map(|p| p.created_at),
            now,
            input.freshness_window(self.freshness_days),
            input.force(),
        );

        if let (CacheDecision::Hit, Some(cached)) = (decision, latest) {
            tracing::info!(
                location_id = %location.id,
                prediction_id = %cached.id,
                "Serving cached bloom prediction"
            );
            let details = self.store.details(cached).await?;
            return Ok(PredictionOutcome {
                cache: CacheStatus::Hit,
                details,
            });
        }

        tracing::info!(location_id = %location.id, decision = ?decision, "Running bloom prediction pipeline");

        let analysis_date = analysis_date_for(now.date_naive(), params.prediction_year).ok_or_else(|| {
            AppError::validation(
                "prediction_year",
                "Prediction year is out of range",
                "El año de predicción está fuera de rango",
            )
        })?;

        let new = self.run_pipeline(farmer_id, location, &params, analysis_date).await?;
        let details = self.store.save(new).await?;

        tracing::info!(
            location_id = %location.id,
            prediction_id = %details.prediction.id,
            analyses = details.analyses.len(),
            images = details.images.len(),
            "Bloom prediction stored"
        );

        Ok(PredictionOutcome {
            cache: CacheStatus::Miss,
            details,
        })
    }

    async fn run_pipeline(
        &self,
        farmer_id: Uuid,
        location: &FarmLocation,
        params: &PredictionParams,
        analysis_date: NaiveDate,
    ) -> Result<NewPrediction, BloomModelError> {
        let deadline = Instant::now() + self.pipeline_timeout;
        let latitude = coordinate(location.latitude);
        let longitude = coordinate(location.longitude);

        let train_request = TrainRequest {
            latitude,
            longitude,
            start_year: params.start_year,
            end_year: params.end_year,
            epochs: params.epochs,
            batch_size: params.batch_size,
            model_type: params.model_type.clone(),
        };
        let forecast_request = ForecastRequest {
            latitude,
            longitude,
            analysis_date: analysis_date.format("%Y-%m-%d").to_string(),
            year: params.prediction_year,
            history_days: params.history_days,
            season_start: params.season_start.clone(),
        };

        let result = async {
            let train =
                bounded(deadline, PipelineStage::Train, self.model.train(&train_request)).await?;
            let timeline = bounded(
                deadline,
                PipelineStage::Timeline,
                self.model.timeline(&forecast_request),
            )
            .await?;
            let prediction = bounded(
                deadline,
                PipelineStage::Predict,
                self.model.predict(&forecast_request),
            )
            .await?;

            assemble_prediction(
                location.id,
                farmer_id,
                params,
                analysis_date,
                &train,
                &timeline,
                &prediction,
            )
        }
        .await;

        if let Err(err) = &result {
            tracing::error!(
                location_id = %location.id,
                stage = %err.stage(),
                error = %err,
                "Bloom prediction pipeline failed"
            );
        }

        result
    }

    /// Caller's predictions, newest first
    pub async fn list_predictions(
        &self,
        farmer_id: Uuid,
        location_id: Option<Uuid>,
    ) -> AppResult<Vec<BloomPrediction>> {
        self.store
            .list(farmer_id, location_id, MAX_LISTED_PREDICTIONS)
            .await
    }

    pub async fn get_prediction(&self, farmer_id: Uuid, prediction_id: Uuid) -> AppResult<PredictionDetails> {
        let prediction = self
            .store
            .get(farmer_id, prediction_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Bloom prediction".to_string()))?;

        self.store.details(prediction).await
    }

    /// Delete a prediction with its analyses and images
    pub async fn delete_prediction(&self, farmer_id: Uuid, prediction_id: Uuid) -> AppResult<()> {
        if !self.store.delete(farmer_id, prediction_id).await? {
            return Err(AppError::NotFound("Bloom prediction".to_string()));
        }
        tracing::info!(prediction_id = %prediction_id, farmer_id = %farmer_id, "Bloom prediction deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::bloom_model::{PhenologyChart, TimelineChart, TrainMetrics, TrainingChart};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct MockModel {
        calls: AtomicUsize,
        fail_at: Option<PipelineStage>,
        delay: Option<Duration>,
    }

    impl MockModel {
        fn failing_at(stage: PipelineStage) -> Self {
            Self {
                fail_at: Some(stage),
                ..Default::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn enter(&self, stage: PipelineStage) -> Result<(), BloomModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_at == Some(stage) {
                return Err(BloomModelError::Unavailable {
                    stage,
                    detail: "API returned 503 Service Unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    fn train_result() -> TrainResult {
        TrainResult {
            message: "Modelo entrenado".to_string(),
            metrics: Some(TrainMetrics { mae: 2.1, rmse: 3.4 }),
            best_epoch: Some(42),
            model_path: None,
            chart: Some(TrainingChart {
                epochs: vec![1.0, 2.0],
                loss_train: vec![0.9, 0.5],
                loss_val: vec![1.0, 0.6],
                mae_train: vec![3.0, 2.0],
                mae_val: vec![3.2, 2.1],
            }),
        }
    }

    fn image(url: &str) -> ModelImage {
        ModelImage {
            url: url.to_string(),
            description: "NDVI".to_string(),
            requested_date: Some("2025-07-15".to_string()),
            image_date: Some("2025-07-13".to_string()),
            cloud_cover: Some(4.5),
        }
    }

    fn timeline_result() -> TimelineResult {
        TimelineResult {
            peak_date: "2025-08-01".to_string(),
            max_probability: 0.87,
            timeline: Vec::new(),
            chart: Some(TimelineChart {
                dates: vec!["2025-07-31".to_string(), "2025-08-01".to_string()],
                probabilities: vec![0.8, 0.87],
                projected_gdd: vec![1300.0, 1320.0],
                days_of_year: vec![212, 213],
            }),
            images: vec![image("https://img.example/timeline.png")],
        }
    }

    fn prediction_result() -> PredictionResult {
        PredictionResult {
            analysis_date: "2025-07-15".to_string(),
            predicted_bloom_date: "2025-08-02".to_string(),
            days_to_bloom: 18,
            accumulated_gdd: 1234.5,
            ndvi: Some(0.62),
            chart: Some(PhenologyChart {
                dates: vec!["2025-07-14".to_string(), "2025-07-15".to_string()],
                accumulated_gdd: vec![1220.0, 1234.5],
                ndvi: vec![0.61, 0.62],
                precipitation_mm: None,
                precipitation_accumulated: Some(vec![310.0, 312.5]),
                temperature_mean: Some(vec![21.0, 23.0]),
                temperature_max: Some(vec![27.0, 29.0]),
                temperature_min: Some(vec![15.0, 17.0]),
                predicted_bloom_date: None,
            }),
            images: vec![
                image("https://img.example/a.png"),
                image("https://img.example/b.png"),
            ],
        }
    }

    #[async_trait]
    impl BloomModel for MockModel {
        async fn train(&self, _request: &TrainRequest) -> Result<TrainResult, BloomModelError> {
            self.enter(PipelineStage::Train).await?;
            Ok(train_result())
        }

        async fn timeline(&self, _request: &ForecastRequest) -> Result<TimelineResult, BloomModelError> {
            self.enter(PipelineStage::Timeline).await?;
            Ok(timeline_result())
        }

        async fn predict(&self, _request: &ForecastRequest) -> Result<PredictionResult, BloomModelError> {
            self.enter(PipelineStage::Predict).await?;
            Ok(prediction_result())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<PredictionDetails>>,
    }

    impl MemoryStore {
        fn count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        fn insert_at(&self, location_id: Uuid, farmer_id: Uuid, created_at: DateTime<Utc>) -> Uuid {
            let new = assemble_prediction(
                location_id,
                farmer_id,
                &defaults(),
                NaiveDate::from_ymd_opt(2025, 7, 15).unwrap(),
                &train_result(),
                &timeline_result(),
                &prediction_result(),
            )
            .unwrap();
            let mut details = materialize(new);
            details.prediction.created_at = created_at;
            let id = details.prediction.id;
            self.rows.lock().unwrap().push(details);
            id
        }
    }

    fn materialize(new: NewPrediction) -> PredictionDetails {
        let now = Utc::now();
        let id = Uuid::new_v4();
        PredictionDetails {
            prediction: BloomPrediction {
                id,
                location_id: new.location_id,
                farmer_id: new.farmer_id,
                prediction_date: now.date_naive(),
                analysis_date: new.analysis_date,
                predicted_bloom_date: new.predicted_bloom_date,
                days_to_bloom: new.days_to_bloom,
                gdc_accumulated: new.gdc_accumulated,
                ndvi_value: new.ndvi_value,
                confidence_score: None,
                temperature_avg: new.temperature_avg,
                precipitation_total: new.precipitation_total,
                model_version: new.model_version,
                metadata: new.metadata,
                created_at: now,
            },
            analyses: new
                .analyses
                .into_iter()
                .map(|a| PredictionAnalysis {
                    id: Uuid::new_v4(),
                    prediction_id: id,
                    farmer_id: new.farmer_id,
                    analysis_type: a.analysis_type,
                    chart_data: a.chart_data,
                    metrics: a.metrics,
                    created_at: now,
                })
                .collect(),
            images: new
                .images
                .into_iter()
                .map(|i| SatelliteImage {
                    id: Uuid::new_v4(),
                    prediction_id: id,
                    farmer_id: new.farmer_id,
                    image_url: i.image_url,
                    image_path: None,
                    description: i.description,
                    requested_date: i.requested_date,
                    image_date: i.image_date,
                    cloud_cover: i.cloud_cover,
                    image_type: i.image_type,
                    metadata: i.metadata,
                    created_at: now,
                })
                .collect(),
        }
    }

    #[async_trait]
    impl PredictionStore for MemoryStore {
        async fn latest(&self, location_id: Uuid, farmer_id: Uuid) -> AppResult<Option<BloomPrediction>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .map(|d| &d.prediction)
                .filter(|p| p.location_id == location_id && p.farmer_id == farmer_id)
                .max_by_key(|p| p.created_at)
                .cloned())
        }

        async fn details(&self, prediction: BloomPrediction) -> AppResult<PredictionDetails> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.prediction.id == prediction.id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Bloom prediction".to_string()))
        }

        async fn save(&self, new: NewPrediction) -> AppResult<PredictionDetails> {
            let details = materialize(new);
            self.rows.lock().unwrap().push(details.clone());
            Ok(details)
        }

        async fn list(
            &self,
            farmer_id: Uuid,
            location_id: Option<Uuid>,
            limit: i64,
        ) -> AppResult<Vec<BloomPrediction>> {
            let mut rows: Vec<BloomPrediction> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .map(|d| d.prediction.clone())
                .filter(|p| p.farmer_id == farmer_id && location_id.map_or(true, |l| p.location_id == l))
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            rows.truncate(limit as usize);
            Ok(rows)
        }

        async fn get(&self, farmer_id: Uuid, prediction_id: Uuid) -> AppResult<Option<BloomPrediction>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .map(|d| &d.prediction)
                .find(|p| p.id == prediction_id && p.farmer_id == farmer_id)
                .cloned())
        }

        async fn delete(&self, farmer_id: Uuid, prediction_id: Uuid) -> AppResult<bool> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|d| !(d.prediction.id == prediction_id && d.prediction.farmer_id == farmer_id));
            Ok(rows.len() < before)
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn defaults() -> PredictionParams {
        PredictionParams {
            start_year: 2018,
            end_year: 2024,
            prediction_year: 2025,
            epochs: 100,
            batch_size: 32,
            model_type: "lstm".to_string(),
            history_days: 30,
            season_start: "05-15".to_string(),
        }
    }

    fn farmer() -> Uuid {
        Uuid::from_u128(0xfa)
    }

    fn location() -> FarmLocation {
        FarmLocation {
            id: Uuid::from_u128(0x10),
            farmer_id: farmer(),
            name: "Parcela Norte".to_string(),
            description: None,
            latitude: Decimal::new(206736, 4),
            longitude: Decimal::new(-1033444, 4),
            hectares: None,
            crop_variety: None,
            planting_date: None,
            created_at: Utc::now(),
        }
    }

    fn service(store: Arc<MemoryStore>, model: Arc<MockModel>, timeout: Duration) -> PredictionService {
        PredictionService::new(store, model, defaults(), 7, timeout)
    }

    fn request() -> CreatePredictionInput {
        CreatePredictionInput {
            location_id: Some(location().id),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------------
    // Cache policy
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let store = Arc::new(MemoryStore::default());
        let model = Arc::new(MockModel::default());
        let svc = service(store.clone(), model.clone(), Duration::from_secs(5));

        let first = svc.request_prediction(farmer(), &location(), &request()).await.unwrap();
        assert_eq!(first.cache, CacheStatus::Miss);
        assert_eq!(model.calls(), 3);
        assert_eq!(store.count(), 1);

        let second = svc.request_prediction(farmer(), &location(), &request()).await.unwrap();
        assert_eq!(second.cache, CacheStatus::Hit);
        assert_eq!(second.details.prediction.id, first.details.prediction.id);
        assert_eq!(second.details.analyses.len(), first.details.analyses.len());
        assert_eq!(model.calls(), 3);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_stale_prediction_is_recomputed() {
        let store = Arc::new(MemoryStore::default());
        let stale_id = store.insert_at(location().id, farmer(), Utc::now() - chrono::Duration::days(8));
        let model = Arc::new(MockModel::default());
        let svc = service(store.clone(), model.clone(), Duration::from_secs(5));

        let outcome = svc.request_prediction(farmer(), &location(), &request()).await.unwrap();
        assert_eq!(outcome.cache, CacheStatus::Miss);
        assert_ne!(outcome.details.prediction.id, stale_id);
        assert_eq!(model.calls(), 3);
        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn test_custom_window_makes_recent_prediction_stale() {
        let store = Arc::new(MemoryStore::default());
        store.insert_at(location().id, farmer(), Utc::now() - chrono::Duration::days(3));
        let model = Arc::new(MockModel::default());
        let svc = service(store.clone(), model.clone(), Duration::from_secs(5));

        let input = CreatePredictionInput {
            freshness_days: Some(2),
            ..request()
        };
        let outcome = svc.request_prediction(farmer(), &location(), &input).await.unwrap();
        assert_eq!(outcome.cache, CacheStatus::Miss);
    }

    #[tokio::test]
    async fn test_force_bypasses_fresh_cache() {
        let store = Arc::new(MemoryStore::default());
        store.insert_at(location().id, farmer(), Utc::now());
        let model = Arc::new(MockModel::default());
        let svc = service(store.clone(), model.clone(), Duration::from_secs(5));

        let input = CreatePredictionInput {
            force_new_analysis: Some(true),
            ..request()
        };
        let outcome = svc.request_prediction(farmer(), &location(), &input).await.unwrap();
        assert_eq!(outcome.cache, CacheStatus::Miss);
        assert_eq!(model.calls(), 3);
        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn test_other_farmers_predictions_are_not_reused() {
        let store = Arc::new(MemoryStore::default());
        store.insert_at(location().id, Uuid::from_u128(0xbb), Utc::now());
        let model = Arc::new(MockModel::default());
        let svc = service(store.clone(), model.clone(), Duration::from_secs(5));

        let outcome = svc.request_prediction(farmer(), &location(), &request()).await.unwrap();
        assert_eq!(outcome.cache, CacheStatus::Miss);
    }

    // ------------------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_failed_stage_persists_nothing() {
        let store = Arc::new(MemoryStore::default());
        let model = Arc::new(MockModel::failing_at(PipelineStage::Timeline));
        let svc = service(store.clone(), model.clone(), Duration::from_secs(5));

        let err = svc
            .request_prediction(farmer(), &location(), &request())
            .await
            .unwrap_err();
        match err {
            AppError::BloomModel(e) => assert_eq!(e.stage(), PipelineStage::Timeline),
            other => panic!("unexpected error: {:?}", other),
        }
        // predict never ran
        assert_eq!(model.calls(), 2);
        assert_eq!(store.count(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_timeout_reports_stage() {
        let store = Arc::new(MemoryStore::default());
        let model = Arc::new(MockModel::slow(Duration::from_secs(5)));
        let svc = service(store.clone(), model.clone(), Duration::from_millis(50));

        let err = svc
            .request_prediction(farmer(), &location(), &request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::BloomModel(BloomModelError::Timeout {
                stage: PipelineStage::Train
            })
        ));
        assert_eq!(store.count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_year_override_is_rejected_before_calls() {
        let store = Arc::new(MemoryStore::default());
        let model = Arc::new(MockModel::default());
        let svc = service(store.clone(), model.clone(), Duration::from_secs(5));

        let input = CreatePredictionInput {
            prediction_year: Some(2020),
            ..request()
        };
        let err = svc.request_prediction(farmer(), &location(), &input).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(model.calls(), 0);
    }

    // ------------------------------------------------------------------------
    // Assembly
    // ------------------------------------------------------------------------

    #[test]
    fn test_assembled_records() {
        let new = assemble_prediction(
            location().id,
            farmer(),
            &defaults(),
            NaiveDate::from_ymd_opt(2025, 7, 15).unwrap(),
            &train_result(),
            &timeline_result(),
            &prediction_result(),
        )
        .unwrap();

        assert_eq!(new.model_version, "LSTM-v1.0");
        assert_eq!(new.predicted_bloom_date, NaiveDate::from_ymd_opt(2025, 8, 2).unwrap());
        assert_eq!(new.temperature_avg, Some(22.0));
        assert_eq!(new.precipitation_total, Some(312.5));
        assert_eq!(new.metadata["analysis_type"], "complete_ml_analysis");
        assert_eq!(new.metadata["complete_params"]["prediction_year"], 2025);

        let kinds: Vec<AnalysisType> = new.analyses.iter().map(|a| a.analysis_type).collect();
        // no precipitation_mm series, so no precipitation row
        assert_eq!(
            kinds,
            vec![
                AnalysisType::Training,
                AnalysisType::Timeline,
                AnalysisType::Phenology,
                AnalysisType::Temperature,
            ]
        );
        assert_eq!(new.analyses[0].metrics.as_ref().unwrap()["rmse"], 3.4);
        assert_eq!(new.analyses[1].metrics.as_ref().unwrap()["probabilidad_maxima"], 0.87);

        let tags: Vec<ImageType> = new.images.iter().map(|i| i.image_type).collect();
        assert_eq!(tags, vec![ImageType::Timeline, ImageType::Prediction, ImageType::Prediction]);
        assert_eq!(new.images[0].metadata["source"], "timeline_analysis");
        assert_eq!(new.images[0].image_date, NaiveDate::from_ymd_opt(2025, 7, 13));
    }

    #[test]
    fn test_missing_charts_produce_no_analyses() {
        let train = TrainResult {
            chart: None,
            ..train_result()
        };
        let timeline = TimelineResult {
            chart: None,
            images: Vec::new(),
            ..timeline_result()
        };
        let prediction = PredictionResult {
            chart: None,
            images: Vec::new(),
            ..prediction_result()
        };
        let new = assemble_prediction(
            location().id,
            farmer(),
            &defaults(),
            NaiveDate::from_ymd_opt(2025, 7, 15).unwrap(),
            &train,
            &timeline,
            &prediction,
        )
        .unwrap();
        assert!(new.analyses.is_empty());
        assert!(new.images.is_empty());
        assert_eq!(new.temperature_avg, None);
        assert_eq!(new.precipitation_total, None);
    }

    #[test]
    fn test_unparseable_bloom_date_is_a_bad_response() {
        let prediction = PredictionResult {
            predicted_bloom_date: "pronto".to_string(),
            ..prediction_result()
        };
        let err = assemble_prediction(
            location().id,
            farmer(),
            &defaults(),
            NaiveDate::from_ymd_opt(2025, 7, 15).unwrap(),
            &train_result(),
            &timeline_result(),
            &prediction,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BloomModelError::BadResponse {
                stage: PipelineStage::Predict,
                ..
            }
        ));
    }

    // ------------------------------------------------------------------------
    // Owner-scoped reads
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_get_and_delete_are_owner_scoped() {
        let store = Arc::new(MemoryStore::default());
        let id = store.insert_at(location().id, farmer(), Utc::now());
        let svc = service(store.clone(), Arc::new(MockModel::default()), Duration::from_secs(5));

        let stranger = Uuid::from_u128(0xbb);
        assert!(matches!(
            svc.get_prediction(stranger, id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.delete_prediction(stranger, id).await,
            Err(AppError::NotFound(_))
        ));

        let details = svc.get_prediction(farmer(), id).await.unwrap();
        assert_eq!(details.images.len(), 3);
        assert_eq!(svc.list_predictions(farmer(), None).await.unwrap().len(), 1);

        svc.delete_prediction(farmer(), id).await.unwrap();
        assert_eq!(store.count(), 0);
    }
}
