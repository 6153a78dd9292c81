//! Injury-driven Elo adjustments.
//!
//! This module provides:
//! - Injury report types and the `InjurySource` feed trait
//! - Player importance tiers
//! - Severity-weighted Elo deltas per team
//! - A TTL cache with stale fallback that never fails a prediction

pub mod cache;
pub mod impact;
pub mod importance;
pub mod source;

use serde::{Deserialize, Serialize};

pub use cache::{
    AdjustmentSource, CacheStats, InjuryAdjustment, InjuryAdjustmentCache,
    InjuryAdjustmentProvider, NoInjuryAdjustments,
};
pub use impact::{calculate_impact, TeamInjuryImpact};
pub use importance::{normalize_player_name, PlayerImportanceClassifier, PlayerTier};
pub use source::{InjurySource, LeagueInjuries, SourceUnavailable};

/// Availability designation from an injury report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InjuryStatus {
    Out,
    Doubtful,
    Questionable,
    #[serde(rename = "Day-To-Day")]
    DayToDay,
}

impl InjuryStatus {
    /// Parse a feed status string. Statuses that do not affect availability
    /// ("Probable", "Active", suspensions) return `None`.
    pub fn parse(status: &str) -> Option<Self> {
        let normalized = status.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "out" | "o" | "out for season" | "injured reserve" => Some(InjuryStatus::Out),
            "doubtful" | "d" => Some(InjuryStatus::Doubtful),
            "questionable" | "q" | "game time decision" => Some(InjuryStatus::Questionable),
            "day to day" | "dtd" => Some(InjuryStatus::DayToDay),
            _ => None,
        }
    }

    /// Probability-like weight of missing the game
    pub fn severity(&self) -> f64 {
        match self {
            InjuryStatus::Out => 1.0,
            InjuryStatus::Doubtful => 0.75,
            InjuryStatus::Questionable => 0.5,
            InjuryStatus::DayToDay => 0.25,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InjuryStatus::Out => "Out",
            InjuryStatus::Doubtful => "Doubtful",
            InjuryStatus::Questionable => "Questionable",
            InjuryStatus::DayToDay => "Day-To-Day",
        }
    }
}

/// One player on a team's injury report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryEntry {
    pub player_name: String,
    pub status: InjuryStatus,
    pub injury_type: Option<String>,
}

impl InjuryEntry {
    pub fn new(player_name: impl Into<String>, status: InjuryStatus) -> Self {
        Self {
            player_name: player_name.into(),
            status,
            injury_type: None,
        }
    }

    pub fn with_injury_type(mut self, injury_type: impl Into<String>) -> Self {
        self.injury_type = Some(injury_type.into());
        self
    }
}
