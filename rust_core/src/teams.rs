//! NBA team directory.
//!
//! This module provides:
//! - The static table of all 30 franchises with their NBA team ids
//! - Name resolution for feed display names (ESPN, sportsbooks)

use std::collections::HashMap;
use std::sync::OnceLock;

use strsim::jaro_winkler;

use crate::types::TeamId;

/// Minimum Jaro-Winkler similarity accepted by the fuzzy fallback
pub const FUZZY_MATCH_THRESHOLD: f64 = 0.92;

/// One franchise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamInfo {
    pub id: TeamId,
    /// Full name as used by stats.nba.com (e.g., "Los Angeles Lakers")
    pub full_name: &'static str,
    pub abbreviation: &'static str,
    pub nickname: &'static str,
    pub city: &'static str,
}

const fn team(
    id: u32,
    full_name: &'static str,
    abbreviation: &'static str,
    nickname: &'static str,
    city: &'static str,
) -> TeamInfo {
    TeamInfo {
        id: TeamId(id),
        full_name,
        abbreviation,
        nickname,
        city,
    }
}

/// All NBA franchises, ordered by team id.
pub static NBA_TEAMS: &[TeamInfo] = &[
    team(1610612737, "Atlanta Hawks", "ATL", "Hawks", "Atlanta"),
    team(1610612738, "Boston Celtics", "BOS", "Celtics", "Boston"),
    team(1610612739, "Cleveland Cavaliers", "CLE", "Cavaliers", "Cleveland"),
    team(1610612740, "New Orleans Pelicans", "NOP", "Pelicans", "New Orleans"),
    team(1610612741, "Chicago Bulls", "CHI", "Bulls", "Chicago"),
    team(1610612742, "Dallas Mavericks", "DAL", "Mavericks", "Dallas"),
    team(1610612743, "Denver Nuggets", "DEN", "Nuggets", "Denver"),
    team(1610612744, "Golden State Warriors", "GSW", "Warriors", "Golden State"),
    team(1610612745, "Houston Rockets", "HOU", "Rockets", "Houston"),
    team(1610612746, "Los Angeles Clippers", "LAC", "Clippers", "Los Angeles"),
    team(1610612747, "Los Angeles Lakers", "LAL", "Lakers", "Los Angeles"),
    team(1610612748, "Miami Heat", "MIA", "Heat", "Miami"),
    team(1610612749, "Milwaukee Bucks", "MIL", "Bucks", "Milwaukee"),
    team(1610612750, "Minnesota Timberwolves", "MIN", "Timberwolves", "Minnesota"),
    team(1610612751, "Brooklyn Nets", "BKN", "Nets", "Brooklyn"),
    team(1610612752, "New York Knicks", "NYK", "Knicks", "New York"),
    team(1610612753, "Orlando Magic", "ORL", "Magic", "Orlando"),
    team(1610612754, "Indiana Pacers", "IND", "Pacers", "Indiana"),
    team(1610612755, "Philadelphia 76ers", "PHI", "76ers", "Philadelphia"),
    team(1610612756, "Phoenix Suns", "PHX", "Suns", "Phoenix"),
    team(1610612757, "Portland Trail Blazers", "POR", "Trail Blazers", "Portland"),
    team(1610612758, "Sacramento Kings", "SAC", "Kings", "Sacramento"),
    team(1610612759, "San Antonio Spurs", "SAS", "Spurs", "San Antonio"),
    team(1610612760, "Oklahoma City Thunder", "OKC", "Thunder", "Oklahoma City"),
    team(1610612761, "Toronto Raptors", "TOR", "Raptors", "Toronto"),
    team(1610612762, "Utah Jazz", "UTA", "Jazz", "Utah"),
    team(1610612763, "Memphis Grizzlies", "MEM", "Grizzlies", "Memphis"),
    team(1610612764, "Washington Wizards", "WAS", "Wizards", "Washington"),
    team(1610612765, "Detroit Pistons", "DET", "Pistons", "Detroit"),
    team(1610612766, "Charlotte Hornets", "CHA", "Hornets", "Charlotte"),
];

/// Spellings used by feeds that differ from the official names
static FEED_ALIASES: &[(&str, u32)] = &[
    ("la clippers", 1610612746),
    ("la lakers", 1610612747),
    ("gs warriors", 1610612744),
    ("golden st warriors", 1610612744),
    ("ny knicks", 1610612752),
    ("okc thunder", 1610612760),
    ("sixers", 1610612755),
    ("philadelphia sixers", 1610612755),
    ("blazers", 1610612757),
    ("portland blazers", 1610612757),
    ("cavs", 1610612739),
    ("mavs", 1610612742),
    ("wolves", 1610612750),
    ("pels", 1610612740),
    ("gsw", 1610612744),
    ("nop", 1610612740),
    ("no pelicans", 1610612740),
    ("sa spurs", 1610612759),
    ("utah", 1610612762),
    ("gs", 1610612744),
    ("no", 1610612740),
    ("ny", 1610612752),
    ("sa", 1610612759),
    ("wsh", 1610612764),
    ("uth", 1610612762),
    ("bkn nets", 1610612751),
];

/// Normalized exact-match index: full name, abbreviation, nickname, aliases
static NAME_INDEX: OnceLock<HashMap<String, TeamId>> = OnceLock::new();

fn name_index() -> &'static HashMap<String, TeamId> {
    NAME_INDEX.get_or_init(|| {
        let mut index = HashMap::new();
        for info in NBA_TEAMS {
            index.insert(normalize(info.full_name), info.id);
            index.insert(normalize(info.abbreviation), info.id);
            index.insert(normalize(info.nickname), info.id);
        }
        for (alias, id) in FEED_ALIASES {
            index.insert(normalize(alias), TeamId(*id));
        }
        index
    })
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lookup over the NBA team table.
#[derive(Debug, Clone, Copy)]
pub struct TeamDirectory {
    teams: &'static [TeamInfo],
}

impl Default for TeamDirectory {
    fn default() -> Self {
        Self::nba()
    }
}

impl TeamDirectory {
    pub fn nba() -> Self {
        Self { teams: NBA_TEAMS }
    }

    pub fn team(&self, team_id: TeamId) -> Option<&'static TeamInfo> {
        self.teams.iter().find(|t| t.id == team_id)
    }

    pub fn name(&self, team_id: TeamId) -> Option<&'static str> {
        self.team(team_id).map(|t| t.full_name)
    }

    pub fn abbreviation(&self, team_id: TeamId) -> Option<&'static str> {
        self.team(team_id).map(|t| t.abbreviation)
    }

    pub fn team_ids(&self) -> impl Iterator<Item = TeamId> + '_ {
        self.teams.iter().map(|t| t.id)
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Resolve a feed display name to a team id.
    ///
    /// Tries, in order: exact normalized name/abbreviation/nickname/alias,
    /// a city that belongs to exactly one team, unambiguous containment in
    /// either direction, then Jaro-Winkler similarity against full names.
    pub fn resolve(&self, name: &str) -> Option<TeamId> {
        let needle = normalize(name);
        if needle.is_empty() {
            return None;
        }

        if let Some(id) = name_index().get(&needle) {
            return Some(*id);
        }

        let by_city: Vec<TeamId> = self
            .teams
            .iter()
            .filter(|t| normalize(t.city) == needle)
            .map(|t| t.id)
            .collect();
        if by_city.len() == 1 {
            return Some(by_city[0]);
        }

        if needle.len() >= 4 {
            let contained: Vec<TeamId> = self
                .teams
                .iter()
                .filter(|t| {
                    let full = normalize(t.full_name);
                    full.contains(&needle) || needle.contains(&full)
                })
                .map(|t| t.id)
                .collect();
            if contained.len() == 1 {
                return Some(contained[0]);
            }
        }

        let mut scored: Vec<(TeamId, f64)> = self
            .teams
            .iter()
            .map(|t| (t.id, jaro_winkler(&needle, &normalize(t.full_name))))
            .filter(|(_, score)| *score >= FUZZY_MATCH_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        match scored.as_slice() {
            [] => None,
            [(id, _)] => Some(*id),
            // Tied best scores ("Los Angeles" vs both LA teams) are ambiguous
            [(id, best), (_, second), ..] if best - second > 1e-9 => Some(*id),
            _ => None,
        }
    }
}
