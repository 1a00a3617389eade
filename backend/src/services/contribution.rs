//! Contribution submission and listing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::{ContributionType, CreateContributionInput};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::RankingService;

/// Contribution service for farmer reports
#[derive(Clone)]
pub struct ContributionService {
    db: PgPool,
}

/// A stored contribution
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Contribution {
    pub id: Uuid,
    pub farmer_id: Uuid,
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub contribution_type: ContributionType,
    pub points_earned: i32,
    pub description: String,
    pub verified: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for `GET /contributions`
#[derive(Debug, Default, Deserialize)]
pub struct ContributionFilter {
    #[serde(rename = "farmerId", alias = "farmer_id")]
    pub farmer_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub contribution_type: Option<String>,
    pub verified: Option<bool>,
    pub limit: Option<i64>,
}

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 500;

pub(crate) const CONTRIBUTION_COLUMNS: &str =
    "id, farmer_id, type, points_earned, description, verified, metadata, created_at, updated_at";

impl ContributionService {
    /// Create a new ContributionService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Submit a contribution as the calling farmer
    ///
    /// Points are fixed here from the type table and the record starts
    /// unverified, so the farmer's totals do not change.
    pub async fn create_contribution(
        &self,
        farmer_id: Uuid,
        input: CreateContributionInput,
    ) -> AppResult<Contribution> {
        input.validate()?;

        let contribution_type = input.parsed_type().map_err(|_| {
            AppError::validation("type", "Invalid contribution type", "Tipo de contribución inválido")
        })?;
        let description = input.description.as_deref().unwrap_or_default().trim().to_string();

        let mut tx = self.db.begin().await?;

        let contribution = sqlx::query_as::<_, Contribution>(&format!(
            r#"
            INSERT INTO contributions (farmer_id, type, points_earned, description, verified, metadata)
            VALUES ($1, $2, $3, $4, false, $5)
            RETURNING {}
            "#,
            CONTRIBUTION_COLUMNS
        ))
        .bind(farmer_id)
        .bind(contribution_type.as_str())
        .bind(contribution_type.points())
        .bind(&description)
        .bind(input.metadata_or_default())
        .fetch_one(&mut *tx)
        .await?;

        // First contribution provisions a zero ranking so the farmer is ranked
        RankingService::ensure_ranking(&mut *tx, farmer_id).await?;

        tx.commit().await?;

        tracing::info!(
            contribution_id = %contribution.id,
            farmer_id = %farmer_id,
            contribution_type = %contribution_type,
            points = contribution.points_earned,
            "Contribution submitted"
        );

        Ok(contribution)
    }

    /// List contributions, newest first
    pub async fn list_contributions(&self, filter: ContributionFilter) -> AppResult<Vec<Contribution>> {
        let contribution_type = match filter.contribution_type.as_deref() {
            Some(raw) => Some(raw.parse::<ContributionType>().map_err(|_| {
                AppError::validation("type", "Invalid contribution type", "Tipo de contribución inválido")
            })?),
            None => None,
        };
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let contributions = sqlx::query_as::<_, Contribution>(&format!(
            r#"
            SELECT {}
            FROM contributions
            WHERE ($1::uuid IS NULL OR farmer_id = $1)
              AND ($2::text IS NULL OR type = $2)
              AND ($3::boolean IS NULL OR verified = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
            CONTRIBUTION_COLUMNS
        ))
        .bind(filter.farmer_id)
        .bind(contribution_type.map(|t| t.as_str()))
        .bind(filter.verified)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(contributions)
    }

    /// Get a contribution by ID
    pub async fn get_contribution(&self, contribution_id: Uuid) -> AppResult<Contribution> {
        sqlx::query_as::<_, Contribution>(&format!(
            "SELECT {} FROM contributions WHERE id = $1",
            CONTRIBUTION_COLUMNS
        ))
        .bind(contribution_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Contribution".to_string()))
    }
}
