//! Elo rating tracker.
//!
//! This module provides:
//! - Per-team ratings with a 1500 default for unseen teams
//! - Home-court adjusted expected score
//! - Zero-sum post-game updates applied under one write lock
//! - Lazy regression toward the league mean at each season boundary

use chrono::NaiveDate;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EloConfig;
use crate::types::{GameResult, TeamId};

/// Probability that the home side wins, given both ratings and the home bonus.
pub fn expected_home_score(home_rating: f64, away_rating: f64, home_advantage: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(-(home_rating + home_advantage - away_rating) / 400.0))
}

/// Rating record for one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRating {
    pub team_id: TeamId,
    pub rating: f64,
    pub last_updated: Option<NaiveDate>,
    /// Season the rating was last carried into. `None` until the team plays.
    pub season: Option<i32>,
}

impl TeamRating {
    pub fn new(team_id: TeamId, rating: f64) -> Self {
        Self {
            team_id,
            rating,
            last_updated: None,
            season: None,
        }
    }
}

/// Before/after view of one game's rating change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EloProjection {
    /// Home rating going into the game, after any season regression
    pub home_before: f64,
    pub away_before: f64,
    pub expected_home: f64,
    /// Points moved from away to home (negative when the home side loses)
    pub delta: f64,
}

impl EloProjection {
    pub fn home_after(&self) -> f64 {
        self.home_before + self.delta
    }

    pub fn away_after(&self) -> f64 {
        self.away_before - self.delta
    }
}

/// Thread-safe rating store.
///
/// Reads never fail: an unknown team reads as the initial rating. Whether a
/// team is legitimately part of the league is a separate question answered
/// by [`RatingStore::is_known`].
pub struct RatingStore {
    config: EloConfig,
    ratings: RwLock<FxHashMap<TeamId, TeamRating>>,
}

impl Default for RatingStore {
    fn default() -> Self {
        Self::new(EloConfig::default())
    }
}

impl RatingStore {
    pub fn new(config: EloConfig) -> Self {
        Self {
            config,
            ratings: RwLock::new(FxHashMap::default()),
        }
    }

    /// Rebuild a store from persisted ratings
    pub fn from_ratings(config: EloConfig, ratings: impl IntoIterator<Item = TeamRating>) -> Self {
        let map = ratings.into_iter().map(|r| (r.team_id, r)).collect();
        Self {
            config,
            ratings: RwLock::new(map),
        }
    }

    pub fn config(&self) -> &EloConfig {
        &self.config
    }

    pub fn get_rating(&self, team_id: TeamId) -> f64 {
        self.ratings
            .read()
            .get(&team_id)
            .map(|r| r.rating)
            .unwrap_or(self.config.initial_rating)
    }

    pub fn get(&self, team_id: TeamId) -> Option<TeamRating> {
        self.ratings.read().get(&team_id).cloned()
    }

    pub fn is_known(&self, team_id: TeamId) -> bool {
        self.ratings.read().contains_key(&team_id)
    }

    /// Add a team at the initial rating. Returns false if it already existed.
    pub fn register_team(&self, team_id: TeamId) -> bool {
        let mut ratings = self.ratings.write();
        if ratings.contains_key(&team_id) {
            return false;
        }
        ratings.insert(team_id, TeamRating::new(team_id, self.config.initial_rating));
        debug!("Registered team {} at {}", team_id, self.config.initial_rating);
        true
    }

    pub fn expected_home(&self, home_id: TeamId, away_id: TeamId) -> f64 {
        let ratings = self.ratings.read();
        let home = ratings.get(&home_id).map_or(self.config.initial_rating, |r| r.rating);
        let away = ratings.get(&away_id).map_or(self.config.initial_rating, |r| r.rating);
        expected_home_score(home, away, self.config.home_advantage)
    }

    /// Compute the rating change a game would cause without applying it.
    pub fn project(&self, game: &GameResult) -> EloProjection {
        let ratings = self.ratings.read();
        self.project_with(&ratings, game)
    }

    /// Apply a completed game. Returns the new (home, away) ratings.
    pub fn update(&self, game: &GameResult) -> (f64, f64) {
        let season = game.season();
        let mut ratings = self.ratings.write();
        let projection = self.project_with(&ratings, game);

        for (team_id, rating) in [
            (game.home_id, projection.home_after()),
            (game.away_id, projection.away_after()),
        ] {
            let entry = ratings
                .entry(team_id)
                .or_insert_with(|| TeamRating::new(team_id, self.config.initial_rating));
            entry.rating = rating;
            entry.last_updated = Some(game.date);
            // A late final from last season must not pull the marker back
            entry.season = Some(entry.season.map_or(season, |s| s.max(season)));
        }

        debug!(
            "Elo {} vs {} on {}: {:.1}/{:.1} -> {:.1}/{:.1}",
            game.home_id,
            game.away_id,
            game.date,
            projection.home_before,
            projection.away_before,
            projection.home_after(),
            projection.away_after()
        );

        (projection.home_after(), projection.away_after())
    }

    /// Regress every team carried from an earlier season into `season`.
    ///
    /// Safe to call repeatedly; each team regresses once per boundary.
    /// Returns the number of teams regressed.
    pub fn apply_season_regression(&self, season: i32) -> usize {
        let mut ratings = self.ratings.write();
        let mut regressed = 0;
        for entry in ratings.values_mut() {
            match entry.season {
                Some(s) if s < season => {
                    entry.rating = self.regress(entry.rating);
                    entry.season = Some(season);
                    regressed += 1;
                }
                None => entry.season = Some(season),
                _ => {}
            }
        }
        if regressed > 0 {
            info!("Season {} regression applied to {} teams", season, regressed);
        }
        regressed
    }

    /// All ratings, ordered by team id
    pub fn snapshot(&self) -> Vec<TeamRating> {
        let mut all: Vec<TeamRating> = self.ratings.read().values().cloned().collect();
        all.sort_by_key(|r| r.team_id);
        all
    }

    pub fn len(&self) -> usize {
        self.ratings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.read().is_empty()
    }

    fn regress(&self, rating: f64) -> f64 {
        let base = self.config.initial_rating;
        base + self.config.season_carryover * (rating - base)
    }

    /// Rating a team carries into a game of `season`. Regresses only when
    /// the team's marker is older than the game.
    fn pre_game_rating(&self, entry: Option<&TeamRating>, season: i32) -> f64 {
        match entry {
            None => self.config.initial_rating,
            Some(r) => match r.season {
                Some(s) if s < season => self.regress(r.rating),
                _ => r.rating,
            },
        }
    }

    fn project_with(&self, ratings: &FxHashMap<TeamId, TeamRating>, game: &GameResult) -> EloProjection {
        let season = game.season();
        let home_before = self.pre_game_rating(ratings.get(&game.home_id), season);
        let away_before = self.pre_game_rating(ratings.get(&game.away_id), season);
        let expected_home = expected_home_score(home_before, away_before, self.config.home_advantage);
        let actual = if game.home_won() { 1.0 } else { 0.0 };

        EloProjection {
            home_before,
            away_before,
            expected_home,
            delta: self.config.k_factor * (actual - expected_home),
        }
    }
}
