//! HTTP handlers

pub mod contribution;
pub mod health;
pub mod location;
pub mod prediction;
pub mod profile;
pub mod ranking;
pub mod verification;

pub use contribution::{create_contribution, list_contributions};
pub use health::health_check;
pub use location::{create_location, delete_location, list_locations};
pub use prediction::{create_prediction, delete_prediction, get_prediction, list_predictions};
pub use profile::me;
pub use ranking::{get_ranking, list_rankings};
pub use verification::{verification_history, verify_contribution};
