//! Prediction cache policy tests
//!
//! Property-based tests for:
//! - Property: A prediction inside the freshness window is reused
//! - Property: An older prediction, or a forced request, recomputes
//! - Property: The analysis date always falls in the prediction year

use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use shared::models::{
    analysis_date_for, decide_cache, CacheDecision, CacheStatus, MissReason, PredictionParams,
};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
}

fn defaults() -> PredictionParams {
    PredictionParams {
        start_year: 2018,
        end_year: 2024,
        prediction_year: 2025,
        epochs: 100,
        batch_size: 32,
        model_type: "lstm".to_string(),
        history_days: 30,
        season_start: "05-15".to_string(),
    }
}

proptest! {
    #[test]
    fn test_fresh_prediction_is_reused(window_days in 1i64..=365, age_secs in 0i64..86_400) {
        let window = Duration::days(window_days);
        let age = Duration::seconds(age_secs.min(window.num_seconds()));
        let decision = decide_cache(Some(now() - age), now(), window, false);
        prop_assert_eq!(decision, CacheDecision::Hit);
        prop_assert_eq!(decision.status(), CacheStatus::Hit);
    }

    #[test]
    fn test_old_prediction_is_recomputed(window_days in 1i64..=365, extra_secs in 1i64..1_000_000) {
        let window = Duration::days(window_days);
        let created = now() - window - Duration::seconds(extra_secs);
        prop_assert_eq!(
            decide_cache(Some(created), now(), window, false),
            CacheDecision::Miss(MissReason::Stale)
        );
    }

    #[test]
    fn test_force_always_recomputes(window_days in 1i64..=365, age_secs in -3600i64..10_000_000) {
        let created = now() - Duration::seconds(age_secs);
        prop_assert_eq!(
            decide_cache(Some(created), now(), Duration::days(window_days), true),
            CacheDecision::Miss(MissReason::Forced)
        );
    }

    #[test]
    fn test_analysis_date_in_prediction_year(day_offset in 0i64..730, year in 2020i32..2040) {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(day_offset);
        let date = analysis_date_for(today, year).unwrap();
        prop_assert_eq!(date.year(), year);
        if (5..=9).contains(&today.month()) {
            prop_assert_eq!((date.month(), date.day()), (today.month(), today.day()));
        } else {
            prop_assert_eq!((date.month(), date.day()), (7, 15));
        }
    }

    #[test]
    fn test_prediction_year_must_follow_training(prediction_year in 2000i32..2040) {
        let result = defaults().with_overrides(None, None, Some(prediction_year));
        prop_assert_eq!(result.is_ok(), prediction_year > 2024);
    }
}

#[test]
fn test_missing_prediction_is_computed() {
    assert_eq!(
        decide_cache(None, now(), Duration::days(7), false),
        CacheDecision::Miss(MissReason::NoPrediction)
    );
}
