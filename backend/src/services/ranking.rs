//! Farmer ranking service
//!
//! `farmer_rankings` is a read cache of [`RankingSummary`] per farmer. It is
//! rebuilt from the farmer's verified contributions on every refresh, never
//! adjusted incrementally, so a refresh can be repeated safely. Rank
//! positions are never stored; they are assigned at read time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::{
    assign_rank_positions, ContributionTally, ContributionType, FarmerLevel, LeaderboardStats,
    LevelProgress, Ranked, RankingSummary,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::followup::{FollowUp, FollowUpHandler};
use crate::services::ProfileService;

/// Default and maximum leaderboard sizes
pub const DEFAULT_LEADERBOARD_LIMIT: i64 = 100;
pub const MAX_LEADERBOARD_LIMIT: i64 = 1000;

/// Ranking service for leaderboard reads and refreshes
#[derive(Clone)]
pub struct RankingService {
    db: PgPool,
}

/// A farmer's stored ranking with its read-time position
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FarmerRanking {
    pub farmer_id: Uuid,
    pub farmer_name: Option<String>,
    pub total_points: i64,
    #[sqlx(try_from = "String")]
    pub level: FarmerLevel,
    pub contributions_count: i64,
    pub drought_reports: i64,
    pub pest_reports: i64,
    pub sustainable_practices: i64,
    pub crop_data_shared: i64,
    pub weather_data_shared: i64,
    pub badges: Vec<String>,
    #[sqlx(skip)]
    pub rank_position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ranked for FarmerRanking {
    fn farmer_id(&self) -> Uuid {
        self.farmer_id
    }

    fn total_points(&self) -> i64 {
        self.total_points
    }

    fn ranked_since(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_rank_position(&mut self, position: i64) {
        self.rank_position = position;
    }
}

/// Query parameters for `GET /rankings`
#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
    pub level: Option<String>,
}

/// Leaderboard page with summary figures
#[derive(Debug, Serialize)]
pub struct Leaderboard {
    pub rankings: Vec<FarmerRanking>,
    #[serde(flatten)]
    pub stats: LeaderboardStats,
}

/// One farmer's ranking with level progress
#[derive(Debug, Serialize)]
pub struct RankingDetail {
    #[serde(flatten)]
    pub ranking: FarmerRanking,
    pub next_level: Option<FarmerLevel>,
    pub points_to_next_level: Option<i64>,
}

const RANKING_COLUMNS: &str = r#"
    farmer_id, farmer_name, total_points, level, contributions_count,
    drought_reports, pest_reports, sustainable_practices, crop_data_shared,
    weather_data_shared, badges, created_at, updated_at
"#;

/// Filter, order, and truncate a full leaderboard
///
/// Positions are assigned over every farmer before filtering by level, so a
/// filtered page keeps each farmer's global position.
pub fn build_leaderboard(
    mut all: Vec<FarmerRanking>,
    level: Option<FarmerLevel>,
    limit: usize,
) -> Leaderboard {
    assign_rank_positions(&mut all);

    let rankings: Vec<FarmerRanking> = all
        .into_iter()
        .filter(|r| level.map_or(true, |l| r.level == l))
        .take(limit)
        .collect();

    let stats =
        LeaderboardStats::from_entries(rankings.iter().map(|r| (r.total_points, r.contributions_count)));

    Leaderboard { rankings, stats }
}

impl RankingService {
    /// Create a new RankingService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Public leaderboard
    pub async fn leaderboard(&self, query: LeaderboardQuery) -> AppResult<Leaderboard> {
        let level = match query.level.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            Some(name) => Some(name.parse::<FarmerLevel>().map_err(|_| {
                AppError::validation("level", "Unknown level", "Nivel desconocido")
            })?),
            None => None,
        };
        let limit = query
            .limit
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
            .clamp(1, MAX_LEADERBOARD_LIMIT) as usize;

        let all = sqlx::query_as::<_, FarmerRanking>(&format!(
            "SELECT {} FROM farmer_rankings ORDER BY total_points DESC, created_at ASC, farmer_id ASC",
            RANKING_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(build_leaderboard(all, level, limit))
    }

    /// One farmer's ranking; 404 when the farmer is unranked
    pub async fn get_ranking(&self, farmer_id: Uuid) -> AppResult<RankingDetail> {
        let mut ranking = sqlx::query_as::<_, FarmerRanking>(&format!(
            "SELECT {} FROM farmer_rankings WHERE farmer_id = $1",
            RANKING_COLUMNS
        ))
        .bind(farmer_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ranking".to_string()))?;

        // Same order as the leaderboard: points, then earliest entry, then id
        let ahead = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM farmer_rankings
            WHERE total_points > $1
               OR (total_points = $1 AND created_at < $2)
               OR (total_points = $1 AND created_at = $2 AND farmer_id < $3)
            "#,
        )
        .bind(ranking.total_points)
        .bind(ranking.created_at)
        .bind(ranking.farmer_id)
        .fetch_one(&self.db)
        .await?;
        ranking.rank_position = ahead + 1;

        let progress = LevelProgress::for_points(ranking.total_points);
        Ok(RankingDetail {
            ranking,
            next_level: progress.next_level,
            points_to_next_level: progress.points_to_next_level,
        })
    }

    /// Make sure a farmer has a ranking row, without touching its totals
    pub async fn ensure_ranking<'e, E>(executor: E, farmer_id: Uuid) -> AppResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO farmer_rankings (farmer_id, farmer_name)
            SELECT $1, COALESCE(NULLIF(btrim(full_name), ''), email)
            FROM profiles WHERE id = $1
            ON CONFLICT (farmer_id) DO NOTHING
            "#,
        )
        .bind(farmer_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Rebuild a farmer's ranking from their verified contributions
    pub async fn recompute_for_farmer(&self, farmer_id: Uuid) -> AppResult<RankingSummary> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT type, COUNT(*)::BIGINT, COALESCE(SUM(points_earned), 0)::BIGINT
            FROM contributions
            WHERE farmer_id = $1 AND verified = true
            GROUP BY type
            "#,
        )
        .bind(farmer_id)
        .fetch_all(&self.db)
        .await?;

        let tallies: Vec<ContributionTally> = rows
            .into_iter()
            .filter_map(|(kind, count, points)| match kind.parse::<ContributionType>() {
                Ok(contribution_type) => Some(ContributionTally {
                    contribution_type,
                    count,
                    points,
                }),
                Err(err) => {
                    tracing::warn!(farmer_id = %farmer_id, error = %err, "Skipping contributions of unknown type");
                    None
                }
            })
            .collect();

        let summary = RankingSummary::from_tallies(&tallies);
        let farmer_name = ProfileService::new(self.db.clone())
            .display_name(farmer_id)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO farmer_rankings (
                farmer_id, farmer_name, total_points, level, contributions_count,
                drought_reports, pest_reports, sustainable_practices, crop_data_shared,
                weather_data_shared, badges
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (farmer_id) DO UPDATE SET
                farmer_name = EXCLUDED.farmer_name,
                total_points = EXCLUDED.total_points,
                level = EXCLUDED.level,
                contributions_count = EXCLUDED.contributions_count,
                drought_reports = EXCLUDED.drought_reports,
                pest_reports = EXCLUDED.pest_reports,
                sustainable_practices = EXCLUDED.sustainable_practices,
                crop_data_shared = EXCLUDED.crop_data_shared,
                weather_data_shared = EXCLUDED.weather_data_shared,
                badges = EXCLUDED.badges,
                updated_at = now()
            "#,
        )
        .bind(farmer_id)
        .bind(&farmer_name)
        .bind(summary.total_points)
        .bind(summary.level.as_str())
        .bind(summary.contributions_count)
        .bind(summary.counts.drought_reports)
        .bind(summary.counts.pest_reports)
        .bind(summary.counts.sustainable_practices)
        .bind(summary.counts.crop_data_shared)
        .bind(summary.counts.weather_data_shared)
        .bind(&summary.badges)
        .execute(&self.db)
        .await?;

        tracing::info!(
            farmer_id = %farmer_id,
            total_points = summary.total_points,
            level = %summary.level,
            badges = summary.badges.len(),
            "Ranking recomputed"
        );

        Ok(summary)
    }
}

#[async_trait]
impl FollowUpHandler for RankingService {
    async fn handle(&self, task: &FollowUp) -> AppResult<()> {
        match task {
            FollowUp::RefreshRanking { farmer_id } => {
                self.recompute_for_farmer(*farmer_id).await.map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ranking(id: u128, points: i64, day: u32) -> FarmerRanking {
        let since = Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap();
        FarmerRanking {
            farmer_id: Uuid::from_u128(id),
            farmer_name: None,
            total_points: points,
            level: FarmerLevel::for_points(points),
            contributions_count: points / 40,
            drought_reports: 0,
            pest_reports: points / 40,
            sustainable_practices: 0,
            crop_data_shared: 0,
            weather_data_shared: 0,
            badges: Vec::new(),
            rank_position: 0,
            created_at: since,
            updated_at: since,
        }
    }

    #[test]
    fn test_leaderboard_positions_and_stats() {
        let board = build_leaderboard(
            vec![ranking(1, 40, 3), ranking(2, 600, 2), ranking(3, 0, 1)],
            None,
            100,
        );
        let order: Vec<(u128, i64)> = board
            .rankings
            .iter()
            .map(|r| (r.farmer_id.as_u128(), r.rank_position))
            .collect();
        assert_eq!(order, vec![(2, 1), (1, 2), (3, 3)]);
        assert_eq!(board.stats.total_farmers, 3);
        assert_eq!(board.stats.average_points, 213);
    }

    #[test]
    fn test_zero_point_farmer_is_ranked() {
        let board = build_leaderboard(vec![ranking(9, 0, 1)], None, 100);
        assert_eq!(board.rankings[0].rank_position, 1);
    }

    #[test]
    fn test_level_filter_keeps_global_position() {
        let board = build_leaderboard(
            vec![ranking(1, 40, 1), ranking(2, 600, 1), ranking(3, 120, 1)],
            Some(FarmerLevel::Cultivador),
            100,
        );
        assert_eq!(board.rankings.len(), 1);
        assert_eq!(board.rankings[0].farmer_id, Uuid::from_u128(3));
        assert_eq!(board.rankings[0].rank_position, 2);
    }

    #[test]
    fn test_limit_truncates() {
        let board = build_leaderboard(
            (1..=5).map(|i| ranking(i, i as i64 * 10, 1)).collect(),
            None,
            2,
        );
        assert_eq!(board.rankings.len(), 2);
        assert_eq!(board.rankings[0].total_points, 50);
    }
}
