//! WebAssembly module for the TerraView dashboards
//!
//! Provides client-side computation for:
//! - Points awarded per contribution type
//! - Farmer levels and progress toward the next level
//! - Badge unlocks and badge catalog lookups
//! - Coordinate validation before a location is submitted

use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Points for a contribution type, or 0 for an unknown type
#[wasm_bindgen]
pub fn points_for_contribution_type(contribution_type: &str) -> i32 {
    contribution_type
        .parse::<ContributionType>()
        .map(|t| t.points())
        .unwrap_or(0)
}

/// Level name for a points total
#[wasm_bindgen]
pub fn level_for_points(total_points: i64) -> String {
    FarmerLevel::for_points(total_points).to_string()
}

/// Level progress as JSON: `{level, next_level, points_to_next_level}`
#[wasm_bindgen]
pub fn level_progress(total_points: i64) -> Result<String, JsValue> {
    serde_json::to_string(&LevelProgress::for_points(total_points))
        .map_err(|e| JsValue::from_str(&format!("Failed to encode progress: {}", e)))
}

/// Ids of the badges unlocked by the given category counts
///
/// `counts_json` has the shape of a ranking's category counts, e.g.
/// `{"drought_reports": 3, "pest_reports": 12, ...}`.
#[wasm_bindgen]
pub fn unlocked_badges(counts_json: &str, total_points: i64) -> Result<String, JsValue> {
    let counts: CategoryCounts = serde_json::from_str(counts_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid counts JSON: {}", e)))?;

    let ids: Vec<&str> = AVAILABLE_BADGES
        .iter()
        .filter(|badge| badge.is_unlocked(&counts, total_points))
        .map(|badge| badge.id)
        .collect();

    serde_json::to_string(&ids)
        .map_err(|e| JsValue::from_str(&format!("Failed to encode badges: {}", e)))
}

/// Catalog entry for a badge id as JSON
#[wasm_bindgen]
pub fn badge_details(badge_id: &str) -> Result<String, JsValue> {
    let badge = find_badge(badge_id)
        .ok_or_else(|| JsValue::from_str(&format!("Unknown badge: {}", badge_id)))?;

    serde_json::to_string(badge)
        .map_err(|e| JsValue::from_str(&format!("Failed to encode badge: {}", e)))
}

/// Check a latitude/longitude pair before submitting a location
#[wasm_bindgen]
pub fn validate_coordinates(latitude: f64, longitude: f64) -> bool {
    match (Decimal::try_from(latitude), Decimal::try_from(longitude)) {
        (Ok(lat), Ok(lng)) => GpsCoordinates::new(lat, lng).is_valid(),
        _ => false,
    }
}
