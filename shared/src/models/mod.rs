//! Domain models for the TerraView platform

mod contribution;
mod location;
mod prediction;
mod ranking;
mod user;

pub use contribution::*;
pub use location::*;
pub use prediction::*;
pub use ranking::*;
pub use user::*;
