//! Bloom prediction handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::models::{CacheStatus, CreatePredictionInput, Operation};
use shared::types::ApiResponse;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::auth::{require, require_owner};
use crate::middleware::CurrentUser;
use crate::services::prediction::{BloomPrediction, PredictionDetails, PredictionOutcome};
use crate::services::{LocationService, PredictionService};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PredictionListQuery {
    pub location_id: Option<Uuid>,
}

/// Serve a cached prediction for a location or run the model pipeline
///
/// Responds 200 on a cache hit and 201 when a new prediction was stored.
pub async fn create_prediction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreatePredictionInput>,
) -> Result<(StatusCode, Json<ApiResponse<PredictionOutcome>>), AppError> {
    require(&user, Operation::RequestPrediction)?;
    input.validate()?;

    let location_id = input.location_id.ok_or_else(|| {
        AppError::validation(
            "location_id",
            "location_id is required",
            "location_id es obligatorio",
        )
    })?;
    let location = LocationService::new(state.db.clone())
        .get_location(location_id)
        .await?;
    require_owner(&user, location.farmer_id, "Farm location")?;

    let outcome = PredictionService::from_state(&state)
        .request_prediction(user.user_id, &location, &input)
        .await?;

    let (status, message) = match outcome.cache {
        CacheStatus::Hit => (StatusCode::OK, "Served from recent analysis"),
        CacheStatus::Miss => (StatusCode::CREATED, "New analysis completed"),
    };

    Ok((status, Json(ApiResponse::ok(outcome).with_message(message))))
}

/// The caller's predictions, newest first
pub async fn list_predictions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PredictionListQuery>,
) -> Result<Json<ApiResponse<Vec<BloomPrediction>>>, AppError> {
    let predictions = PredictionService::from_state(&state)
        .list_predictions(user.user_id, query.location_id)
        .await?;

    Ok(Json(ApiResponse::list(predictions)))
}

/// One of the caller's predictions with analyses and images
pub async fn get_prediction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(prediction_id): Path<Uuid>,
) -> Result<Json<ApiResponse<PredictionDetails>>, AppError> {
    let details = PredictionService::from_state(&state)
        .get_prediction(user.user_id, prediction_id)
        .await?;

    Ok(Json(ApiResponse::ok(details)))
}

pub async fn delete_prediction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(prediction_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    PredictionService::from_state(&state)
        .delete_prediction(user.user_id, prediction_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
