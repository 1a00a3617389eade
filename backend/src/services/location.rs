//! Farm location management

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::CreateFarmLocationInput;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Location service for a farmer's fields
#[derive(Clone)]
pub struct LocationService {
    db: PgPool,
}

/// A registered field
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FarmLocation {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub hectares: Option<Decimal>,
    pub crop_variety: Option<String>,
    pub planting_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

const LOCATION_COLUMNS: &str = r#"
    id, farmer_id, name, description, latitude, longitude, hectares,
    crop_variety, planting_date, created_at
"#;

impl LocationService {
    /// Create a new LocationService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Locations owned by the caller, newest first
    pub async fn list_locations(&self, farmer_id: Uuid) -> AppResult<Vec<FarmLocation>> {
        let locations = sqlx::query_as::<_, FarmLocation>(&format!(
            "SELECT {} FROM farm_locations WHERE farmer_id = $1 ORDER BY created_at DESC",
            LOCATION_COLUMNS
        ))
        .bind(farmer_id)
        .fetch_all(&self.db)
        .await?;

        Ok(locations)
    }

    /// Get a location by ID; ownership is checked by the caller
    pub async fn get_location(&self, location_id: Uuid) -> AppResult<FarmLocation> {
        sqlx::query_as::<_, FarmLocation>(&format!(
            "SELECT {} FROM farm_locations WHERE id = $1",
            LOCATION_COLUMNS
        ))
        .bind(location_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Farm location".to_string()))
    }

    /// Register a location for the calling farmer
    pub async fn create_location(
        &self,
        farmer_id: Uuid,
        input: CreateFarmLocationInput,
    ) -> AppResult<FarmLocation> {
        input.validate()?;

        let name = input.trimmed_name();
        if name.is_empty() {
            return Err(AppError::validation(
                "name",
                "Location name cannot be empty",
                "El nombre de la ubicación no puede estar vacío",
            ));
        }

        if let Some(planting_date) = input.planting_date {
            shared::validation::validate_planting_date(planting_date, Utc::now().date_naive())
                .map_err(|msg| {
                    AppError::validation(
                        "planting_date",
                        msg,
                        "La fecha de siembra no puede estar en el futuro",
                    )
                })?;
        }

        let coordinates = input.coordinates().ok_or_else(|| {
            AppError::validation(
                "latitude",
                "Latitude and longitude are required",
                "La latitud y la longitud son obligatorias",
            )
        })?;

        let location = sqlx::query_as::<_, FarmLocation>(&format!(
            r#"
            INSERT INTO farm_locations
                (farmer_id, name, description, latitude, longitude, hectares, crop_variety, planting_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            LOCATION_COLUMNS
        ))
        .bind(farmer_id)
        .bind(&name)
        .bind(&input.description)
        .bind(coordinates.latitude)
        .bind(coordinates.longitude)
        .bind(input.hectares)
        .bind(&input.crop_variety)
        .bind(input.planting_date)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(location_id = %location.id, farmer_id = %farmer_id, "Farm location created");

        Ok(location)
    }

    /// Delete a location owned by the caller
    ///
    /// Predictions, analyses, and images for the location go with it
    /// (`ON DELETE CASCADE`).
    pub async fn delete_location(&self, farmer_id: Uuid, location_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM farm_locations WHERE id = $1 AND farmer_id = $2")
            .bind(location_id)
            .bind(farmer_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Farm location".to_string()));
        }

        tracing::info!(location_id = %location_id, farmer_id = %farmer_id, "Farm location deleted");
        Ok(())
    }
}
