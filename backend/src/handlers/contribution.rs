//! Contribution handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use shared::models::CreateContributionInput;
use shared::types::ApiResponse;

use crate::error::AppError;
use crate::middleware::auth::require_farmer;
use crate::middleware::CurrentUser;
use crate::services::contribution::{Contribution, ContributionFilter};
use crate::services::ContributionService;
use crate::AppState;

/// Submit a contribution as the calling farmer
pub async fn create_contribution(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateContributionInput>,
) -> Result<(StatusCode, Json<ApiResponse<Contribution>>), AppError> {
    require_farmer(&user)?;

    let service = ContributionService::new(state.db.clone());
    let contribution = service.create_contribution(user.user_id, input).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(contribution).with_message("Contribution submitted for verification")),
    ))
}

/// List contributions with optional filters
pub async fn list_contributions(
    State(state): State<AppState>,
    Query(filter): Query<ContributionFilter>,
) -> Result<Json<ApiResponse<Vec<Contribution>>>, AppError> {
    let service = ContributionService::new(state.db.clone());
    let contributions = service.list_contributions(filter).await?;

    Ok(Json(ApiResponse::list(contributions)))
}
