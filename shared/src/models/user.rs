//! User profile and role models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role chosen on the user's profile
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRole {
    Farmer,
    Researcher,
}

impl ProfileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRole::Farmer => "farmer",
            ProfileRole::Researcher => "researcher",
        }
    }
}

impl TryFrom<String> for ProfileRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "farmer" => Ok(ProfileRole::Farmer),
            "researcher" => Ok(ProfileRole::Researcher),
            _ => Err(format!("unknown profile role: {}", value)),
        }
    }
}

/// Role granted in the `user_roles` table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppRole {
    Admin,
    Farmer,
    Researcher,
}

impl AppRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppRole::Admin => "admin",
            AppRole::Farmer => "farmer",
            AppRole::Researcher => "researcher",
        }
    }
}

impl TryFrom<String> for AppRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "admin" => Ok(AppRole::Admin),
            "farmer" => Ok(AppRole::Farmer),
            "researcher" => Ok(AppRole::Researcher),
            _ => Err(format!("unknown app role: {}", value)),
        }
    }
}

/// Operations guarded by a role check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateLocation,
    DeleteLocation,
    CreateContribution,
    RequestPrediction,
    VerifyContribution,
    ViewVerificationHistory,
}

/// What the caller must be to perform an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Farmer,
    Admin,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::CreateLocation,
        Operation::DeleteLocation,
        Operation::CreateContribution,
        Operation::RequestPrediction,
        Operation::VerifyContribution,
        Operation::ViewVerificationHistory,
    ];

    pub fn requirement(&self) -> Requirement {
        match self {
            Operation::CreateLocation
            | Operation::DeleteLocation
            | Operation::CreateContribution
            | Operation::RequestPrediction => Requirement::Farmer,
            Operation::VerifyContribution | Operation::ViewVerificationHistory => {
                Requirement::Admin
            }
        }
    }
}

/// Roles of an authenticated caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerRoles {
    pub profile_role: Option<ProfileRole>,
    pub is_admin: bool,
}

impl CallerRoles {
    pub fn is_farmer(&self) -> bool {
        self.profile_role == Some(ProfileRole::Farmer)
    }

    /// Role check only; ownership is checked separately for mutations
    pub fn can(&self, operation: Operation) -> bool {
        match operation.requirement() {
            Requirement::Farmer => self.is_farmer(),
            Requirement::Admin => self.is_admin,
        }
    }
}

/// Response of `GET /me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub profile_role: Option<ProfileRole>,
    pub is_admin: bool,
    pub roles: Vec<AppRole>,
}
