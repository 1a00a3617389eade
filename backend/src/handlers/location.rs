//! Farm location handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::models::{CreateFarmLocationInput, Operation};
use shared::types::ApiResponse;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{require, require_farmer};
use crate::middleware::CurrentUser;
use crate::services::location::FarmLocation;
use crate::services::LocationService;
use crate::AppState;

/// List the caller's locations
pub async fn list_locations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<Vec<FarmLocation>>>, AppError> {
    let service = LocationService::new(state.db.clone());
    let locations = service.list_locations(user.user_id).await?;

    Ok(Json(ApiResponse::list(locations)))
}

/// Register a new location
pub async fn create_location(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateFarmLocationInput>,
) -> Result<(StatusCode, Json<ApiResponse<FarmLocation>>), AppError> {
    require_farmer(&user)?;

    let service = LocationService::new(state.db.clone());
    let location = service.create_location(user.user_id, input).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(location))))
}

/// Delete one of the caller's locations
pub async fn delete_location(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(location_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require(&user, Operation::DeleteLocation)?;

    let service = LocationService::new(state.db.clone());
    service.delete_location(user.user_id, location_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
