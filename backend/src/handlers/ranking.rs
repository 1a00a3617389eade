//! Public leaderboard handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use shared::types::ApiResponse;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::ranking::{Leaderboard, LeaderboardQuery, RankingDetail};
use crate::services::RankingService;
use crate::AppState;

/// Leaderboard ordered by points, optionally filtered by level
pub async fn list_rankings(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<ApiResponse<Leaderboard>>, AppError> {
    let service = RankingService::new(state.db.clone());
    let leaderboard = service.leaderboard(query).await?;

    Ok(Json(ApiResponse::ok(leaderboard)))
}

/// One farmer's ranking with progress to the next level
pub async fn get_ranking(
    State(state): State<AppState>,
    Path(farmer_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RankingDetail>>, AppError> {
    let service = RankingService::new(state.db.clone());
    let detail = service.get_ranking(farmer_id).await?;

    Ok(Json(ApiResponse::ok(detail)))
}
