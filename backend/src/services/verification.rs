//! Admin verification of contributions
//!
//! The status change is the only part that can fail the request. The audit
//! append and the ranking refresh run after it has been applied and are
//! logged on failure instead of being propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::models::{VerificationTransition, VerifyContributionInput};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::contribution::{Contribution, CONTRIBUTION_COLUMNS};
use crate::services::followup::{FollowUp, FollowUpQueue};
use crate::AppState;

/// Storage used by the verification workflow
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Current verified flag, `None` if the contribution does not exist
    async fn current_status(&self, contribution_id: Uuid) -> AppResult<Option<bool>>;

    /// Set the flag only if it still equals `expected`; `None` when it did not
    async fn set_status_if(
        &self,
        contribution_id: Uuid,
        expected: bool,
        new_status: bool,
    ) -> AppResult<Option<Contribution>>;

    async fn append_audit(
        &self,
        contribution_id: Uuid,
        admin_id: Uuid,
        transition: VerificationTransition,
        notes: Option<&str>,
    ) -> AppResult<()>;

    /// Audit rows, newest first
    async fn history(&self, contribution_id: Uuid) -> AppResult<Vec<VerificationAudit>>;
}

/// PostgreSQL-backed verification store
#[derive(Clone)]
pub struct PgVerificationStore {
    db: PgPool,
}

impl PgVerificationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VerificationStore for PgVerificationStore {
    async fn current_status(&self, contribution_id: Uuid) -> AppResult<Option<bool>> {
        let status =
            sqlx::query_scalar::<_, bool>("SELECT verified FROM contributions WHERE id = $1")
                .bind(contribution_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(status)
    }

    async fn set_status_if(
        &self,
        contribution_id: Uuid,
        expected: bool,
        new_status: bool,
    ) -> AppResult<Option<Contribution>> {
        let contribution = sqlx::query_as::<_, Contribution>(&format!(
            r#"
            UPDATE contributions
            SET verified = $1, updated_at = now()
            WHERE id = $2 AND verified = $3
            RETURNING {}
            "#,
            CONTRIBUTION_COLUMNS
        ))
        .bind(new_status)
        .bind(contribution_id)
        .bind(expected)
        .fetch_optional(&self.db)
        .await?;

        Ok(contribution)
    }

    async fn append_audit(
        &self,
        contribution_id: Uuid,
        admin_id: Uuid,
        transition: VerificationTransition,
        notes: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contribution_verifications
                (contribution_id, verified_by, previous_status, new_status, notes)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(contribution_id)
        .bind(admin_id)
        .bind(transition.previous_status)
        .bind(transition.new_status)
        .bind(notes)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn history(&self, contribution_id: Uuid) -> AppResult<Vec<VerificationAudit>> {
        let rows = sqlx::query_as::<_, VerificationAudit>(
            r#"
            SELECT v.id, v.contribution_id, v.verified_by,
                   COALESCE(NULLIF(btrim(p.full_name), ''), p.email) AS verifier_name,
                   v.previous_status, v.new_status, v.notes, v.created_at
            FROM contribution_verifications v
            LEFT JOIN profiles p ON p.id = v.verified_by
            WHERE v.contribution_id = $1
            ORDER BY v.created_at DESC, v.id DESC
            "#,
        )
        .bind(contribution_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}

/// Verification service for admin review
#[derive(Clone)]
pub struct VerificationService {
    store: Arc<dyn VerificationStore>,
    followups: FollowUpQueue,
}

/// One append-only audit row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VerificationAudit {
    pub id: Uuid,
    pub contribution_id: Uuid,
    pub verified_by: Uuid,
    pub verifier_name: Option<String>,
    pub previous_status: bool,
    pub new_status: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of a verification action
#[derive(Debug, Serialize)]
pub struct VerificationOutcome {
    pub contribution: Contribution,
    pub previous_status: bool,
    pub new_status: bool,
    /// Change to the owner's total points once the ranking refresh runs
    pub points_delta: i64,
    pub audit_recorded: bool,
    pub ranking_refresh_queued: bool,
    pub message_en: &'static str,
    pub message_es: &'static str,
}

impl VerificationService {
    pub fn new(store: Arc<dyn VerificationStore>, followups: FollowUpQueue) -> Self {
        Self { store, followups }
    }

    /// Service backed by the application's database and follow-up queue
    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            Arc::new(PgVerificationStore::new(state.db.clone())),
            state.followups.clone(),
        )
    }

    /// Set a contribution's verified status
    ///
    /// The update only applies if the status is still the one read at the
    /// start; a concurrent change by another admin yields a conflict.
    pub async fn verify_contribution(
        &self,
        admin_id: Uuid,
        contribution_id: Uuid,
        input: VerifyContributionInput,
    ) -> AppResult<VerificationOutcome> {
        input.validate()?;
        let new_status = input.verified_flag().ok_or_else(|| {
            AppError::validation(
                "verified",
                "verified must be a boolean",
                "verified debe ser un valor booleano",
            )
        })?;
        let notes = input.trimmed_notes();

        let previous_status = self
            .store
            .current_status(contribution_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Contribution".to_string()))?;

        let contribution = self
            .store
            .set_status_if(contribution_id, previous_status, new_status)
            .await?
            .ok_or_else(|| AppError::Conflict {
                resource: "contribution".to_string(),
                message: "The contribution was changed by another administrator, reload and retry"
                    .to_string(),
                message_es:
                    "La contribución fue modificada por otro administrador, recarga e intenta de nuevo"
                        .to_string(),
            })?;

        let transition = VerificationTransition::new(previous_status, new_status);

        let audit_recorded = match self
            .store
            .append_audit(contribution_id, admin_id, transition, notes.as_deref())
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    contribution_id = %contribution_id,
                    admin_id = %admin_id,
                    error = %err,
                    "Failed to record verification audit"
                );
                false
            }
        };

        let ranking_refresh_queued = transition.changes_status()
            && self.followups.dispatch(FollowUp::RefreshRanking {
                farmer_id: contribution.farmer_id,
            });

        tracing::info!(
            contribution_id = %contribution_id,
            admin_id = %admin_id,
            previous_status,
            new_status,
            "Contribution verification updated"
        );

        let (message_en, message_es) = transition.message();
        Ok(VerificationOutcome {
            points_delta: transition.points_delta(contribution.points_earned),
            contribution,
            previous_status,
            new_status,
            audit_recorded,
            ranking_refresh_queued,
            message_en,
            message_es,
        })
    }

    /// Audit history of a contribution, newest first
    pub async fn history(&self, contribution_id: Uuid) -> AppResult<Vec<VerificationAudit>> {
        self.store.history(contribution_id).await
    }
}
