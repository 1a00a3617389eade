//! Admin verification handlers
//!
//! Mounted behind the admin route layer; the role is checked again here.

use axum::{
    extract::{Path, State},
    Json,
};
use shared::models::{Operation, VerifyContributionInput};
use shared::types::ApiResponse;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{require, require_admin};
use crate::middleware::CurrentUser;
use crate::services::verification::{VerificationAudit, VerificationOutcome};
use crate::services::{ContributionService, VerificationService};
use crate::AppState;

/// Verify or revoke a contribution
pub async fn verify_contribution(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(contribution_id): Path<Uuid>,
    Json(input): Json<VerifyContributionInput>,
) -> Result<Json<ApiResponse<VerificationOutcome>>, AppError> {
    require_admin(&user)?;

    let service = VerificationService::from_state(&state);
    let outcome = service
        .verify_contribution(user.user_id, contribution_id, input)
        .await?;
    let message = outcome.message_en;

    Ok(Json(ApiResponse::ok(outcome).with_message(message)))
}

/// Audit history of a contribution
pub async fn verification_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(contribution_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<VerificationAudit>>>, AppError> {
    require(&user, Operation::ViewVerificationHistory)?;

    // 404 for an unknown contribution rather than an empty history
    ContributionService::new(state.db.clone())
        .get_contribution(contribution_id)
        .await?;

    let service = VerificationService::from_state(&state);
    let history = service.history(contribution_id).await?;

    Ok(Json(ApiResponse::list(history)))
}
