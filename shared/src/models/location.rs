//! Farm location models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::types::GpsCoordinates;

/// Input for registering a farm location
///
/// Required fields are optional at the serde level so that a missing value is
/// reported as a field validation error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateFarmLocationInput {
    #[validate(required, length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(required, custom = "latitude_rule")]
    pub latitude: Option<Decimal>,
    #[validate(required, custom = "longitude_rule")]
    pub longitude: Option<Decimal>,
    #[validate(custom = "hectares_rule")]
    pub hectares: Option<Decimal>,
    #[validate(length(max = 120))]
    pub crop_variety: Option<String>,
    pub planting_date: Option<NaiveDate>,
}

impl CreateFarmLocationInput {
    /// Coordinates of the location, once `validate()` has passed
    pub fn coordinates(&self) -> Option<GpsCoordinates> {
        Some(GpsCoordinates::new(self.latitude?, self.longitude?))
    }

    /// Name with surrounding whitespace removed
    pub fn trimmed_name(&self) -> String {
        self.name.as_deref().unwrap_or_default().trim().to_string()
    }
}

fn latitude_rule(value: &Decimal) -> Result<(), ValidationError> {
    crate::validation::validate_latitude(*value).map_err(|msg| rule_error("latitude_range", msg))
}

fn longitude_rule(value: &Decimal) -> Result<(), ValidationError> {
    crate::validation::validate_longitude(*value).map_err(|msg| rule_error("longitude_range", msg))
}

fn hectares_rule(value: &Decimal) -> Result<(), ValidationError> {
    crate::validation::validate_hectares(*value).map_err(|msg| rule_error("hectares_range", msg))
}

fn rule_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn jalisco() -> CreateFarmLocationInput {
        CreateFarmLocationInput {
            name: Some("Parcela Norte".to_string()),
            description: None,
            latitude: Some(Decimal::from_str("20.6736").unwrap()),
            longitude: Some(Decimal::from_str("-103.3444").unwrap()),
            hectares: Some(Decimal::from(4)),
            crop_variety: Some("Agave azul".to_string()),
            planting_date: None,
        }
    }

    #[test]
    fn test_valid_location() {
        let input = jalisco();
        assert!(input.validate().is_ok());
        assert!(input.coordinates().unwrap().is_valid());
    }

    #[test]
    fn test_out_of_range_coordinates() {
        let input = CreateFarmLocationInput {
            latitude: Some(Decimal::from(95)),
            ..jalisco()
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("latitude"));

        let input = CreateFarmLocationInput {
            longitude: Some(Decimal::from(-200)),
            ..jalisco()
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("longitude"));
    }

    #[test]
    fn test_zero_coordinates_are_valid() {
        let input = CreateFarmLocationInput {
            latitude: Some(Decimal::ZERO),
            longitude: Some(Decimal::ZERO),
            ..jalisco()
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_missing_required_fields() {
        let errors = CreateFarmLocationInput::default().validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("latitude"));
        assert!(fields.contains_key("longitude"));
    }

    #[test]
    fn test_non_positive_hectares() {
        let input = CreateFarmLocationInput {
            hectares: Some(Decimal::ZERO),
            ..jalisco()
        };
        assert!(input.validate().is_err());
    }
}
