//! Validation utilities for the TerraView platform
//!
//! Plain functions returning `Result<(), &'static str>` so that the backend,
//! the WASM module, and the `validator` derive rules can all share them.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::MIN_DESCRIPTION_CHARS;

// ============================================================================
// Location Validations
// ============================================================================

/// Validate latitude is within [-90, 90]
pub fn validate_latitude(latitude: Decimal) -> Result<(), &'static str> {
    if latitude < Decimal::from(-90) || latitude > Decimal::from(90) {
        return Err("Latitude must be between -90 and 90");
    }
    Ok(())
}

/// Validate longitude is within [-180, 180]
pub fn validate_longitude(longitude: Decimal) -> Result<(), &'static str> {
    if longitude < Decimal::from(-180) || longitude > Decimal::from(180) {
        return Err("Longitude must be between -180 and 180");
    }
    Ok(())
}

/// Validate field area in hectares
pub fn validate_hectares(hectares: Decimal) -> Result<(), &'static str> {
    if hectares <= Decimal::ZERO {
        return Err("Hectares must be greater than zero");
    }
    Ok(())
}

/// Validate a planting date is not in the future
pub fn validate_planting_date(planting_date: NaiveDate, today: NaiveDate) -> Result<(), &'static str> {
    if planting_date > today {
        return Err("Planting date cannot be in the future");
    }
    Ok(())
}

// ============================================================================
// Contribution Validations
// ============================================================================

/// Validate a contribution description (at least 10 characters once trimmed)
pub fn validate_description(description: &str) -> Result<(), &'static str> {
    if description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
        return Err("Description is required and must be at least 10 characters");
    }
    Ok(())
}

// ============================================================================
// Prediction Validations
// ============================================================================

/// Earliest year with usable satellite/climate history for model training
pub const MIN_TRAINING_YEAR: i32 = 2000;

/// Validate the training year range and the year being predicted
pub fn validate_prediction_years(
    start_year: i32,
    end_year: i32,
    prediction_year: i32,
) -> Result<(), &'static str> {
    if start_year < MIN_TRAINING_YEAR {
        return Err("Training start year is too early");
    }
    if start_year > end_year {
        return Err("Training start year must not be after the end year");
    }
    if prediction_year <= end_year {
        return Err("Prediction year must be after the training period");
    }
    Ok(())
}
