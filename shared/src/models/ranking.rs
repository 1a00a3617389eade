//! Farmer ranking: levels, badges, and rank ordering
//!
//! A ranking is derived entirely from a farmer's verified contributions.
//! Nothing here is stored independently of that set; the backend persists
//! the summary only as a read cache and computes rank positions at query
//! time.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::contribution::ContributionType;

/// Named tiers unlocked by cumulative points
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FarmerLevel {
    #[serde(rename = "Aprendiz")]
    Aprendiz,
    #[serde(rename = "Cultivador")]
    Cultivador,
    #[serde(rename = "Agricultor Experimentado")]
    AgricultorExperimentado,
    #[serde(rename = "Maestro Agricultor")]
    MaestroAgricultor,
    #[serde(rename = "Gran Maestro")]
    GranMaestro,
    #[serde(rename = "Leyenda del Campo")]
    LeyendaDelCampo,
}

/// Level thresholds, ascending
pub const LEVEL_REQUIREMENTS: [(FarmerLevel, i64); 6] = [
    (FarmerLevel::Aprendiz, 0),
    (FarmerLevel::Cultivador, 100),
    (FarmerLevel::AgricultorExperimentado, 500),
    (FarmerLevel::MaestroAgricultor, 1500),
    (FarmerLevel::GranMaestro, 5000),
    (FarmerLevel::LeyendaDelCampo, 10000),
];

/// Error for a level name that is not in the table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown farmer level: {0}")]
pub struct UnknownFarmerLevel(pub String);

impl FarmerLevel {
    /// Highest level whose threshold does not exceed `total_points`
    pub fn for_points(total_points: i64) -> FarmerLevel {
        LEVEL_REQUIREMENTS
            .iter()
            .rev()
            .find(|(_, min)| *min <= total_points)
            .map(|(level, _)| *level)
            .unwrap_or(FarmerLevel::Aprendiz)
    }

    /// Minimum cumulative points for this level
    pub fn min_points(&self) -> i64 {
        LEVEL_REQUIREMENTS
            .iter()
            .find(|(level, _)| level == self)
            .map(|(_, min)| *min)
            .unwrap_or(0)
    }

    /// The next level up, if any
    pub fn next(&self) -> Option<FarmerLevel> {
        LEVEL_REQUIREMENTS
            .iter()
            .map(|(level, _)| *level)
            .find(|level| level > self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FarmerLevel::Aprendiz => "Aprendiz",
            FarmerLevel::Cultivador => "Cultivador",
            FarmerLevel::AgricultorExperimentado => "Agricultor Experimentado",
            FarmerLevel::MaestroAgricultor => "Maestro Agricultor",
            FarmerLevel::GranMaestro => "Gran Maestro",
            FarmerLevel::LeyendaDelCampo => "Leyenda del Campo",
        }
    }
}

impl std::fmt::Display for FarmerLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FarmerLevel {
    type Err = UnknownFarmerLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LEVEL_REQUIREMENTS
            .iter()
            .map(|(level, _)| *level)
            .find(|level| level.as_str() == s)
            .ok_or_else(|| UnknownFarmerLevel(s.to_string()))
    }
}

impl TryFrom<String> for FarmerLevel {
    type Error = UnknownFarmerLevel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Progress toward the next level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelProgress {
    pub level: FarmerLevel,
    pub next_level: Option<FarmerLevel>,
    pub points_to_next_level: Option<i64>,
}

impl LevelProgress {
    pub fn for_points(total_points: i64) -> Self {
        let level = FarmerLevel::for_points(total_points);
        let next_level = level.next();
        Self {
            level,
            next_level,
            points_to_next_level: next_level.map(|next| next.min_points() - total_points),
        }
    }
}

// ============================================================================
// Badges
// ============================================================================

/// Condition that unlocks a badge
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BadgeRequirement {
    /// Verified contributions of any type
    TotalContributions { count: i64 },
    /// Verified contributions of one type
    ContributionsOfType { contribution_type: ContributionType, count: i64 },
    /// Cumulative verified points
    TotalPoints { points: i64 },
}

/// An achievement shown on the leaderboard
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Badge {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub requirement: BadgeRequirement,
}

/// The badge catalog
pub const AVAILABLE_BADGES: [Badge; 7] = [
    Badge {
        id: "first_contribution",
        name: "Primera Contribución",
        description: "Realizó su primera contribución",
        icon: "🌱",
        color: "green",
        requirement: BadgeRequirement::TotalContributions { count: 1 },
    },
    Badge {
        id: "drought_expert",
        name: "Experto en Sequías",
        description: "Reportó 10+ sequías",
        icon: "☀️",
        color: "orange",
        requirement: BadgeRequirement::ContributionsOfType {
            contribution_type: ContributionType::DroughtReport,
            count: 10,
        },
    },
    Badge {
        id: "pest_hunter",
        name: "Cazador de Plagas",
        description: "Reportó 10+ plagas",
        icon: "🐛",
        color: "red",
        requirement: BadgeRequirement::ContributionsOfType {
            contribution_type: ContributionType::PestReport,
            count: 10,
        },
    },
    Badge {
        id: "eco_warrior",
        name: "Guerrero Ecológico",
        description: "Practica agricultura sostenible",
        icon: "♻️",
        color: "emerald",
        requirement: BadgeRequirement::ContributionsOfType {
            contribution_type: ContributionType::SustainablePractice,
            count: 5,
        },
    },
    Badge {
        id: "data_champion",
        name: "Campeón de Datos",
        description: "Compartió 50+ datos",
        icon: "📊",
        color: "blue",
        requirement: BadgeRequirement::TotalPoints { points: 1000 },
    },
    Badge {
        id: "master_farmer",
        name: "Maestro Agricultor",
        description: "Alcanzó nivel Maestro",
        icon: "👨‍🌾",
        color: "purple",
        requirement: BadgeRequirement::TotalPoints { points: 1500 },
    },
    Badge {
        id: "legend",
        name: "Leyenda Viva",
        description: "Alcanzó el nivel máximo",
        icon: "🏆",
        color: "yellow",
        requirement: BadgeRequirement::TotalPoints { points: 10000 },
    },
];

/// Look up a badge by id
pub fn find_badge(id: &str) -> Option<&'static Badge> {
    AVAILABLE_BADGES.iter().find(|b| b.id == id)
}

impl Badge {
    pub fn is_unlocked(&self, counts: &CategoryCounts, total_points: i64) -> bool {
        match self.requirement {
            BadgeRequirement::TotalContributions { count } => counts.total() >= count,
            BadgeRequirement::ContributionsOfType {
                contribution_type,
                count,
            } => counts.get(contribution_type) >= count,
            BadgeRequirement::TotalPoints { points } => total_points >= points,
        }
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Verified contribution counts per category
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CategoryCounts {
    pub drought_reports: i64,
    pub pest_reports: i64,
    pub sustainable_practices: i64,
    pub crop_data_shared: i64,
    pub weather_data_shared: i64,
}

impl CategoryCounts {
    pub fn get(&self, contribution_type: ContributionType) -> i64 {
        match contribution_type {
            ContributionType::DroughtReport => self.drought_reports,
            ContributionType::PestReport => self.pest_reports,
            ContributionType::SustainablePractice => self.sustainable_practices,
            ContributionType::CropData => self.crop_data_shared,
            ContributionType::WeatherData => self.weather_data_shared,
        }
    }

    pub fn add(&mut self, contribution_type: ContributionType, count: i64) {
        let slot = match contribution_type {
            ContributionType::DroughtReport => &mut self.drought_reports,
            ContributionType::PestReport => &mut self.pest_reports,
            ContributionType::SustainablePractice => &mut self.sustainable_practices,
            ContributionType::CropData => &mut self.crop_data_shared,
            ContributionType::WeatherData => &mut self.weather_data_shared,
        };
        *slot += count;
    }

    pub fn total(&self) -> i64 {
        ContributionType::ALL.iter().map(|t| self.get(*t)).sum()
    }
}

/// Per-type aggregate of a farmer's verified contributions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContributionTally {
    pub contribution_type: ContributionType,
    pub count: i64,
    pub points: i64,
}

/// Everything about a farmer's standing except the global position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankingSummary {
    pub total_points: i64,
    pub level: FarmerLevel,
    pub contributions_count: i64,
    #[serde(flatten)]
    pub counts: CategoryCounts,
    pub badges: Vec<String>,
}

impl RankingSummary {
    /// Summary of a farmer with no verified contributions
    pub fn empty() -> Self {
        Self::from_tallies(&[])
    }

    /// Build from per-type tallies (one per type, as produced by a GROUP BY)
    pub fn from_tallies(tallies: &[ContributionTally]) -> Self {
        let mut counts = CategoryCounts::default();
        let mut total_points = 0;
        for tally in tallies {
            counts.add(tally.contribution_type, tally.count);
            total_points += tally.points;
        }

        let badges = AVAILABLE_BADGES
            .iter()
            .filter(|badge| badge.is_unlocked(&counts, total_points))
            .map(|badge| badge.id.to_string())
            .collect();

        Self {
            total_points,
            level: FarmerLevel::for_points(total_points),
            contributions_count: counts.total(),
            counts,
            badges,
        }
    }

    /// Build from individual contributions, counting only verified ones
    pub fn from_contributions<I>(contributions: I) -> Self
    where
        I: IntoIterator<Item = (ContributionType, i32, bool)>,
    {
        let mut tallies: Vec<ContributionTally> = Vec::new();
        for (contribution_type, points, verified) in contributions {
            if !verified {
                continue;
            }
            match tallies
                .iter_mut()
                .find(|t| t.contribution_type == contribution_type)
            {
                Some(tally) => {
                    tally.count += 1;
                    tally.points += i64::from(points);
                }
                None => tallies.push(ContributionTally {
                    contribution_type,
                    count: 1,
                    points: i64::from(points),
                }),
            }
        }
        Self::from_tallies(&tallies)
    }

    pub fn has_badge(&self, id: &str) -> bool {
        self.badges.iter().any(|b| b == id)
    }
}

// ============================================================================
// Rank ordering
// ============================================================================

/// A leaderboard entry that can receive a global position
pub trait Ranked {
    fn farmer_id(&self) -> Uuid;
    fn total_points(&self) -> i64;
    /// When the farmer first entered the ranking; earlier wins ties
    fn ranked_since(&self) -> DateTime<Utc>;
    fn set_rank_position(&mut self, position: i64);
}

/// Leaderboard order: points descending, then earliest entry, then farmer id
pub fn rank_order<T: Ranked>(a: &T, b: &T) -> Ordering {
    b.total_points()
        .cmp(&a.total_points())
        .then_with(|| a.ranked_since().cmp(&b.ranked_since()))
        .then_with(|| a.farmer_id().cmp(&b.farmer_id()))
}

/// Sort entries into leaderboard order and assign 1-based positions
pub fn assign_rank_positions<T: Ranked>(entries: &mut [T]) {
    entries.sort_by(rank_order);
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.set_rank_position(index as i64 + 1);
    }
}

/// Aggregate figures shown above the leaderboard
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardStats {
    pub total_farmers: i64,
    pub total_contributions: i64,
    pub average_points: i64,
}

impl LeaderboardStats {
    /// Compute from `(total_points, contributions_count)` pairs
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        let mut stats = LeaderboardStats::default();
        let mut points_sum: i64 = 0;
        for (points, contributions) in entries {
            stats.total_farmers += 1;
            stats.total_contributions += contributions;
            points_sum += points;
        }
        if stats.total_farmers > 0 {
            // round half up
            stats.average_points = (2 * points_sum + stats.total_farmers) / (2 * stats.total_farmers);
        }
        stats
    }
}
