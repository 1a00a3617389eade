//! Caller profile handler

use axum::{extract::State, Json};
use shared::models::CallerProfile;
use shared::types::ApiResponse;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::ProfileService;
use crate::AppState;

/// Profile and roles of the authenticated caller
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<CallerProfile>>, AppError> {
    let service = ProfileService::new(state.db.clone());
    let profile = service.get_profile(user.user_id, user.email.clone()).await?;

    Ok(Json(ApiResponse::ok(profile)))
}
