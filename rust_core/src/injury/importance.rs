//! Player importance tiers.
//!
//! Losing an All-Star moves a line far more than losing a rotation player.
//! The curated list below is refreshed at the start of each season; anyone
//! not on it is treated as a starter, which overestimates rather than
//! underestimates the impact of an unknown name.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::TierMultipliers;

/// 2025-26 All-Star pool: recent All-Star and All-NBA selections plus
/// established high-impact players.
pub static ALL_STAR_PLAYERS: &[&str] = &[
    // East
    "Giannis Antetokounmpo",
    "Joel Embiid",
    "Jayson Tatum",
    "Jaylen Brown",
    "Damian Lillard",
    "Donovan Mitchell",
    "Darius Garland",
    "Trae Young",
    "Jimmy Butler",
    "Bam Adebayo",
    "Tyrese Haliburton",
    "Paolo Banchero",
    "Franz Wagner",
    "Jalen Brunson",
    "Julius Randle",
    "Scottie Barnes",
    "DeMar DeRozan",
    "LaMelo Ball",
    "Cade Cunningham",
    // West
    "Nikola Jokic",
    "Luka Doncic",
    "Shai Gilgeous-Alexander",
    "Kevin Durant",
    "Devin Booker",
    "Stephen Curry",
    "LeBron James",
    "Anthony Davis",
    "Kawhi Leonard",
    "Paul George",
    "Anthony Edwards",
    "Karl-Anthony Towns",
    "Ja Morant",
    "Zion Williamson",
    "Brandon Ingram",
    "Domantas Sabonis",
    "De'Aaron Fox",
    "Victor Wembanyama",
    "Alperen Sengun",
    "Lauri Markkanen",
    // Rising
    "Tyrese Maxey",
    "Desmond Bane",
    "Jaren Jackson Jr.",
    "Evan Mobley",
    "Jalen Williams",
    "Mikal Bridges",
    "OG Anunoby",
    "Kristaps Porzingis",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerTier {
    AllStar,
    Starter,
    Bench,
}

/// Lowercase, drop apostrophes and periods, collapse whitespace.
pub fn normalize_player_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '\'' && *c != '.' && *c != '\u{2019}')
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Name-to-tier lookup built once at construction
#[derive(Debug, Clone)]
pub struct PlayerImportanceClassifier {
    all_stars: FxHashSet<String>,
    bench: FxHashSet<String>,
    multipliers: TierMultipliers,
}

impl Default for PlayerImportanceClassifier {
    fn default() -> Self {
        Self::new(TierMultipliers::default())
    }
}

impl PlayerImportanceClassifier {
    /// Classifier over the curated All-Star pool
    pub fn new(multipliers: TierMultipliers) -> Self {
        Self::with_roster(ALL_STAR_PLAYERS.iter().copied(), std::iter::empty(), multipliers)
    }

    /// Classifier over explicit All-Star and bench lists
    pub fn with_roster<'a>(
        all_stars: impl IntoIterator<Item = &'a str>,
        bench: impl IntoIterator<Item = &'a str>,
        multipliers: TierMultipliers,
    ) -> Self {
        Self {
            all_stars: all_stars.into_iter().map(normalize_player_name).collect(),
            bench: bench.into_iter().map(normalize_player_name).collect(),
            multipliers,
        }
    }

    pub fn tier(&self, player_name: &str) -> PlayerTier {
        let normalized = normalize_player_name(player_name);
        if self.all_stars.contains(&normalized) {
            PlayerTier::AllStar
        } else if self.bench.contains(&normalized) {
            PlayerTier::Bench
        } else {
            PlayerTier::Starter
        }
    }

    pub fn tier_multiplier(&self, tier: PlayerTier) -> f64 {
        match tier {
            PlayerTier::AllStar => self.multipliers.all_star,
            PlayerTier::Starter => self.multipliers.starter,
            PlayerTier::Bench => self.multipliers.bench,
        }
    }

    pub fn multiplier(&self, player_name: &str) -> f64 {
        self.tier_multiplier(self.tier(player_name))
    }

    pub fn is_all_star(&self, player_name: &str) -> bool {
        self.tier(player_name) == PlayerTier::AllStar
    }

    pub fn all_star_count(&self) -> usize {
        self.all_stars.len()
    }
}
