//! Rolling form tracker.
//!
//! Keeps the last W games per team, most recent first, and answers
//! "what did this team look like going into date D" without ever looking at
//! games played on or after D.

use std::collections::VecDeque;

use chrono::NaiveDate;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::FormConfig;
use crate::types::{GameResult, TeamId};

/// League-average points used when a team has no prior games
pub const NEUTRAL_POINTS: f64 = 110.0;

/// One game from a single team's perspective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormEntry {
    pub date: NaiveDate,
    pub points_for: u16,
    pub points_against: u16,
    pub won: bool,
    pub margin: i32,
    /// Days since the previous recorded game, `None` for the first one
    pub rest_days_before: Option<i64>,
}

/// Input to [`FormWindow::record_game`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSummary {
    pub date: NaiveDate,
    pub points_for: u16,
    pub points_against: u16,
}

impl GameSummary {
    pub fn home_side(game: &GameResult) -> Self {
        Self {
            date: game.date,
            points_for: game.home_score,
            points_against: game.away_score,
        }
    }

    pub fn away_side(game: &GameResult) -> Self {
        Self {
            date: game.date,
            points_for: game.away_score,
            points_against: game.home_score,
        }
    }
}

/// Aggregates over a team's window as of a date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingStats {
    pub avg_points_for: f64,
    pub avg_points_against: f64,
    pub win_pct: f64,
    pub avg_margin: f64,
    pub games_in_window: usize,
    pub rest_days: i64,
    pub back_to_back: bool,
}

impl RollingStats {
    /// Priors for a team with nothing on record
    pub fn neutral(rest_days: i64) -> Self {
        Self {
            avg_points_for: NEUTRAL_POINTS,
            avg_points_against: NEUTRAL_POINTS,
            win_pct: 0.5,
            avg_margin: 0.0,
            games_in_window: 0,
            rest_days,
            back_to_back: false,
        }
    }
}

pub struct FormWindow {
    config: FormConfig,
    teams: RwLock<FxHashMap<TeamId, VecDeque<FormEntry>>>,
}

impl Default for FormWindow {
    fn default() -> Self {
        Self::new(FormConfig::default())
    }
}

impl FormWindow {
    pub fn new(config: FormConfig) -> Self {
        Self {
            config,
            teams: RwLock::new(FxHashMap::default()),
        }
    }

    /// Rebuild from persisted histories. Entries are re-sorted and capped.
    pub fn from_history(
        config: FormConfig,
        history: impl IntoIterator<Item = (TeamId, Vec<FormEntry>)>,
    ) -> Self {
        let mut teams = FxHashMap::default();
        for (team_id, mut entries) in history {
            entries.sort_by(|a, b| b.date.cmp(&a.date));
            entries.truncate(config.window_size);
            teams.insert(team_id, VecDeque::from(entries));
        }
        Self {
            config,
            teams: RwLock::new(teams),
        }
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn record_game(&self, team_id: TeamId, summary: GameSummary) {
        let mut teams = self.teams.write();
        let window = teams.entry(team_id).or_default();
        insert_entry(window, summary, self.config.window_size);
    }

    /// Record both sides of a game under one write lock
    pub fn record_result(&self, game: &GameResult) {
        let mut teams = self.teams.write();
        insert_entry(
            teams.entry(game.home_id).or_default(),
            GameSummary::home_side(game),
            self.config.window_size,
        );
        insert_entry(
            teams.entry(game.away_id).or_default(),
            GameSummary::away_side(game),
            self.config.window_size,
        );
    }

    /// Rolling stats over games dated strictly before `as_of`.
    pub fn get_rolling(&self, team_id: TeamId, as_of: NaiveDate) -> RollingStats {
        let teams = self.teams.read();
        let prior: Vec<&FormEntry> = teams
            .get(&team_id)
            .map(|w| {
                w.iter()
                    .filter(|e| e.date < as_of)
                    .take(self.config.window_size)
                    .collect()
            })
            .unwrap_or_default();

        let Some(latest) = prior.first() else {
            return RollingStats::neutral(self.config.default_rest_days);
        };

        let rest_days = (as_of - latest.date)
            .num_days()
            .clamp(0, self.config.max_rest_days);

        let n = prior.len() as f64;
        RollingStats {
            avg_points_for: prior.iter().map(|e| e.points_for as f64).sum::<f64>() / n,
            avg_points_against: prior.iter().map(|e| e.points_against as f64).sum::<f64>() / n,
            win_pct: prior.iter().filter(|e| e.won).count() as f64 / n,
            avg_margin: prior.iter().map(|e| e.margin as f64).sum::<f64>() / n,
            games_in_window: prior.len(),
            rest_days,
            back_to_back: rest_days == 1,
        }
    }

    /// Retained entries for a team, most recent first
    pub fn history(&self, team_id: TeamId) -> Vec<FormEntry> {
        self.teams
            .read()
            .get(&team_id)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All retained histories, ordered by team id
    pub fn snapshot(&self) -> Vec<(TeamId, Vec<FormEntry>)> {
        let mut all: Vec<(TeamId, Vec<FormEntry>)> = self
            .teams
            .read()
            .iter()
            .map(|(id, w)| (*id, w.iter().cloned().collect()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub fn team_count(&self) -> usize {
        self.teams.read().len()
    }
}

/// Insert keeping most-recent-first order, then evict the oldest beyond `cap`.
fn insert_entry(window: &mut VecDeque<FormEntry>, summary: GameSummary, cap: usize) {
    let pos = window
        .iter()
        .position(|e| e.date <= summary.date)
        .unwrap_or(window.len());

    let rest_days_before = window
        .get(pos)
        .map(|older| (summary.date - older.date).num_days());

    window.insert(
        pos,
        FormEntry {
            date: summary.date,
            points_for: summary.points_for,
            points_against: summary.points_against,
            won: summary.points_for > summary.points_against,
            margin: summary.points_for as i32 - summary.points_against as i32,
            rest_days_before,
        },
    );

    // A late-arriving game changes the gap for the next-newer entry
    if pos > 0 {
        let inserted = summary.date;
        if let Some(newer) = window.get_mut(pos - 1) {
            newer.rest_days_before = Some((newer.date - inserted).num_days());
        }
    }

    window.truncate(cap);
}
