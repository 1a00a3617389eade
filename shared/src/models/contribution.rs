//! Farmer contribution models and the point table

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Minimum number of characters in a trimmed contribution description
pub const MIN_DESCRIPTION_CHARS: usize = 10;

/// Kinds of field reports a farmer can submit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContributionType {
    DroughtReport,
    PestReport,
    SustainablePractice,
    CropData,
    WeatherData,
}

/// Error for a contribution type outside the fixed enumeration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown contribution type: {0}")]
pub struct UnknownContributionType(pub String);

impl ContributionType {
    /// Every contribution type, in catalog order
    pub const ALL: [ContributionType; 5] = [
        ContributionType::DroughtReport,
        ContributionType::PestReport,
        ContributionType::SustainablePractice,
        ContributionType::CropData,
        ContributionType::WeatherData,
    ];

    /// Points awarded once a contribution of this type is verified
    pub fn points(&self) -> i32 {
        match self {
            ContributionType::DroughtReport => 50,
            ContributionType::PestReport => 40,
            ContributionType::SustainablePractice => 60,
            ContributionType::CropData => 30,
            ContributionType::WeatherData => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionType::DroughtReport => "drought_report",
            ContributionType::PestReport => "pest_report",
            ContributionType::SustainablePractice => "sustainable_practice",
            ContributionType::CropData => "crop_data",
            ContributionType::WeatherData => "weather_data",
        }
    }
}

impl std::fmt::Display for ContributionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContributionType {
    type Err = UnknownContributionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContributionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownContributionType(s.to_string()))
    }
}

impl TryFrom<String> for ContributionType {
    type Error = UnknownContributionType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Request body for submitting a contribution
///
/// `type` is kept as a raw string so an unknown value is reported as a
/// validation error instead of a body deserialization failure.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateContributionInput {
    #[serde(rename = "type", default)]
    #[validate(required, custom = "validate_contribution_type")]
    pub contribution_type: Option<String>,
    #[serde(default)]
    #[validate(required, custom = "validate_description_rule")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl CreateContributionInput {
    /// Parsed contribution type, once `validate()` has passed
    pub fn parsed_type(&self) -> Result<ContributionType, UnknownContributionType> {
        self.contribution_type.as_deref().unwrap_or_default().parse()
    }

    /// Metadata to store; a missing or null value becomes an empty object
    pub fn metadata_or_default(&self) -> serde_json::Value {
        match &self.metadata {
            Some(serde_json::Value::Null) | None => serde_json::json!({}),
            Some(value) => value.clone(),
        }
    }
}

fn validate_contribution_type(value: &str) -> Result<(), ValidationError> {
    value.parse::<ContributionType>().map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("contribution_type");
        err.message = Some("Invalid contribution type".into());
        err
    })
}

fn validate_description_rule(value: &str) -> Result<(), ValidationError> {
    crate::validation::validate_description(value).map_err(|msg| {
        let mut err = ValidationError::new("description_length");
        err.message = Some(msg.into());
        err
    })
}

/// Request body for an admin verification decision
///
/// `verified` is left untyped so that a non-boolean value can be rejected
/// with a field-level validation error.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct VerifyContributionInput {
    #[serde(default)]
    pub verified: Option<serde_json::Value>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl VerifyContributionInput {
    /// The requested status, if `verified` is a JSON boolean
    pub fn verified_flag(&self) -> Option<bool> {
        self.verified.as_ref().and_then(serde_json::Value::as_bool)
    }

    /// Notes with surrounding whitespace removed; blank notes become `None`
    pub fn trimmed_notes(&self) -> Option<String> {
        self.notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

/// A single verified/unverified transition applied by an administrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTransition {
    pub previous_status: bool,
    pub new_status: bool,
}

impl VerificationTransition {
    pub fn new(previous_status: bool, new_status: bool) -> Self {
        Self {
            previous_status,
            new_status,
        }
    }

    /// Whether the counted status actually changed
    pub fn changes_status(&self) -> bool {
        self.previous_status != self.new_status
    }

    /// Newly counted: false -> true
    pub fn is_verification(&self) -> bool {
        !self.previous_status && self.new_status
    }

    /// No longer counted: true -> false
    pub fn is_revocation(&self) -> bool {
        self.previous_status && !self.new_status
    }

    /// Change to the owner's total points caused by this transition
    pub fn points_delta(&self, points_earned: i32) -> i64 {
        if self.is_verification() {
            i64::from(points_earned)
        } else if self.is_revocation() {
            -i64::from(points_earned)
        } else {
            0
        }
    }

    /// Message returned to the administrator
    pub fn message(&self) -> (&'static str, &'static str) {
        if self.new_status {
            (
                "Contribution verified successfully",
                "Contribución verificada exitosamente",
            )
        } else {
            (
                "Verification removed successfully",
                "Verificación removida exitosamente",
            )
        }
    }
}
