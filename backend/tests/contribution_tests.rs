//! Contribution and verification tests
//!
//! Property-based and unit tests for:
//! - Property: Fixed point table per contribution type
//! - Property: Descriptions shorter than 10 trimmed characters are rejected
//! - Property: Verify then revoke leaves the farmer's points unchanged

use proptest::prelude::*;
use shared::models::{
    ContributionType, CreateContributionInput, VerificationTransition, VerifyContributionInput,
};
use validator::Validate;

// ============================================================================
// Property Test Strategies
// ============================================================================

fn contribution_type_strategy() -> impl Strategy<Value = ContributionType> {
    prop::sample::select(ContributionType::ALL.to_vec())
}

/// Descriptions that stay under 10 characters after trimming
fn short_description_strategy() -> impl Strategy<Value = String> {
    ("[a-z ]{0,9}", "[ \t\n]{0,6}", "[ \t\n]{0,6}")
        .prop_filter("trimmed length under 10", |(core, _, _)| core.trim().chars().count() < 10)
        .prop_map(|(core, lead, trail)| format!("{}{}{}", lead, core, trail))
}

fn input(contribution_type: ContributionType, description: &str) -> CreateContributionInput {
    CreateContributionInput {
        contribution_type: Some(contribution_type.as_str().to_string()),
        description: Some(description.to_string()),
        metadata: None,
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    /// Points come from the type table and are always positive
    #[test]
    fn test_points_follow_type(contribution_type in contribution_type_strategy()) {
        let expected = match contribution_type {
            ContributionType::DroughtReport => 50,
            ContributionType::PestReport => 40,
            ContributionType::SustainablePractice => 60,
            ContributionType::CropData => 30,
            ContributionType::WeatherData => 20,
        };
        prop_assert_eq!(contribution_type.points(), expected);
        let parsed: ContributionType = contribution_type.as_str().parse().unwrap();
        prop_assert_eq!(parsed, contribution_type);
    }

    #[test]
    fn test_short_descriptions_rejected(
        contribution_type in contribution_type_strategy(),
        description in short_description_strategy(),
    ) {
        let errors = input(contribution_type, &description).validate().unwrap_err();
        prop_assert!(errors.field_errors().contains_key("description"));
    }

    #[test]
    fn test_long_descriptions_accepted(
        contribution_type in contribution_type_strategy(),
        description in "[a-zA-Z][a-zA-Z ]{8,80}[a-zA-Z]",
    ) {
        prop_assert!(input(contribution_type, &description).validate().is_ok());
    }

    /// Verifying and then revoking nets to zero
    #[test]
    fn test_verify_then_revoke_nets_zero(contribution_type in contribution_type_strategy()) {
        let points = contribution_type.points();
        let verify = VerificationTransition::new(false, true);
        let revoke = VerificationTransition::new(true, false);

        prop_assert_eq!(verify.points_delta(points), i64::from(points));
        prop_assert_eq!(revoke.points_delta(points), -i64::from(points));
        prop_assert_eq!(verify.points_delta(points) + revoke.points_delta(points), 0);
    }

    /// Re-applying the current status changes nothing
    #[test]
    fn test_same_status_is_a_no_op(status in any::<bool>(), points in 0i32..1000) {
        let transition = VerificationTransition::new(status, status);
        prop_assert!(!transition.changes_status());
        prop_assert_eq!(transition.points_delta(points), 0);
    }
}

// ============================================================================
// Unit Tests: Request Bodies
// ============================================================================

#[cfg(test)]
mod request_tests {
    use super::*;

    #[test]
    fn test_unknown_type_is_a_field_error() {
        let body = CreateContributionInput {
            contribution_type: Some("flood_report".to_string()),
            description: Some("River overflowed into the east field".to_string()),
            metadata: None,
        };
        let errors = body.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("type"));
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let errors = CreateContributionInput::default().validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("type"));
        assert!(fields.contains_key("description"));
    }

    #[test]
    fn test_verified_must_be_boolean() {
        let body: VerifyContributionInput =
            serde_json::from_str(r#"{"verified": "yes"}"#).unwrap();
        assert_eq!(body.verified_flag(), None);

        let body: VerifyContributionInput =
            serde_json::from_str(r#"{"verified": false, "notes": "  "}"#).unwrap();
        assert_eq!(body.verified_flag(), Some(false));
        assert_eq!(body.trimmed_notes(), None);
    }

    #[test]
    fn test_transition_messages() {
        let (en, es) = VerificationTransition::new(false, true).message();
        assert_eq!(en, "Contribution verified successfully");
        assert_eq!(es, "Contribución verificada exitosamente");

        let (en, _) = VerificationTransition::new(true, false).message();
        assert_eq!(en, "Verification removed successfully");
    }
}
