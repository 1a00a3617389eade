//! Business logic services for the TerraView platform

pub mod contribution;
pub mod followup;
pub mod location;
pub mod prediction;
pub mod profile;
pub mod ranking;
pub mod verification;

pub use contribution::ContributionService;
pub use followup::FollowUpQueue;
pub use location::LocationService;
pub use prediction::PredictionService;
pub use profile::ProfileService;
pub use ranking::RankingService;
pub use verification::VerificationService;
