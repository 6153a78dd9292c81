//! Completed-game ingestion.
//!
//! The only writer of ratings and form. Games are applied strictly in date
//! order, each exactly once, so that a prediction as of date D only ever
//! sees games from before D.

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::elo::RatingStore;
use crate::error::{PipelineError, Result};
use crate::form::FormWindow;
use crate::types::{GameResult, TeamId};

/// Identity of a game for de-duplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameKey {
    pub date: NaiveDate,
    pub home_id: TeamId,
    pub away_id: TeamId,
}

impl From<&GameResult> for GameKey {
    fn from(game: &GameResult) -> Self {
        Self {
            date: game.date,
            home_id: game.home_id,
            away_id: game.away_id,
        }
    }
}

/// Ingestion progress that survives a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestCheckpoint {
    pub last_processed_date: Option<NaiveDate>,
    pub games_processed_total: u64,
    /// Games already applied on `last_processed_date`
    #[serde(default)]
    pub last_date_games: Vec<GameKey>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    Applied { home_rating: f64, away_rating: f64 },
    Duplicate,
}

/// What applying a game would do
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GamePreview {
    pub home_id: TeamId,
    pub away_id: TeamId,
    pub home_won: bool,
    pub already_processed: bool,
    pub current_home_elo: f64,
    pub current_away_elo: f64,
    pub elo_change_home: f64,
    pub new_home_elo: f64,
    pub new_away_elo: f64,
}

#[derive(Debug, Default)]
struct IngestState {
    processed: FxHashSet<GameKey>,
    last_processed_date: Option<NaiveDate>,
    games_processed_total: u64,
}

pub struct GameIngestor {
    ratings: Arc<RatingStore>,
    form: Arc<FormWindow>,
    state: Mutex<IngestState>,
}

impl GameIngestor {
    pub fn new(ratings: Arc<RatingStore>, form: Arc<FormWindow>) -> Self {
        Self::with_checkpoint(ratings, form, IngestCheckpoint::default())
    }

    pub fn with_checkpoint(
        ratings: Arc<RatingStore>,
        form: Arc<FormWindow>,
        checkpoint: IngestCheckpoint,
    ) -> Self {
        Self {
            ratings,
            form,
            state: Mutex::new(IngestState {
                processed: checkpoint.last_date_games.into_iter().collect(),
                last_processed_date: checkpoint.last_processed_date,
                games_processed_total: checkpoint.games_processed_total,
            }),
        }
    }

    /// Apply a completed game unless it was already applied.
    pub fn process_game(&self, game: &GameResult) -> Result<IngestOutcome> {
        self.apply(game, false)
    }

    /// Apply even if the same (date, home, away) was seen before
    pub fn process_game_forced(&self, game: &GameResult) -> Result<IngestOutcome> {
        self.apply(game, true)
    }

    /// Apply a batch in date order. Invalid and out-of-order games are logged
    /// and skipped. Returns the number applied.
    pub fn process_games(&self, games: &[GameResult]) -> usize {
        let mut ordered: Vec<&GameResult> = games.iter().collect();
        ordered.sort_by_key(|g| g.date);

        let mut applied = 0;
        for game in ordered {
            match self.process_game(game) {
                Ok(IngestOutcome::Applied { .. }) => applied += 1,
                Ok(IngestOutcome::Duplicate) => {}
                Err(e) => warn!("Skipping game {} vs {}: {}", game.home_id, game.away_id, e),
            }
        }
        if applied > 0 {
            info!("Ingested {} of {} games", applied, games.len());
        }
        applied
    }

    /// Rating change the game would cause, without applying it
    pub fn preview(&self, game: &GameResult) -> Result<GamePreview> {
        game.validate()?;
        let projection = self.ratings.project(game);
        Ok(GamePreview {
            home_id: game.home_id,
            away_id: game.away_id,
            home_won: game.home_won(),
            already_processed: self.state.lock().processed.contains(&GameKey::from(game)),
            current_home_elo: projection.home_before,
            current_away_elo: projection.away_before,
            elo_change_home: projection.delta,
            new_home_elo: projection.home_after(),
            new_away_elo: projection.away_after(),
        })
    }

    pub fn last_processed_date(&self) -> Option<NaiveDate> {
        self.state.lock().last_processed_date
    }

    pub fn games_processed(&self) -> u64 {
        self.state.lock().games_processed_total
    }

    pub fn checkpoint(&self) -> IngestCheckpoint {
        let state = self.state.lock();
        let mut last_date_games: Vec<GameKey> = state
            .processed
            .iter()
            .filter(|k| Some(k.date) == state.last_processed_date)
            .copied()
            .collect();
        last_date_games.sort();
        IngestCheckpoint {
            last_processed_date: state.last_processed_date,
            games_processed_total: state.games_processed_total,
            last_date_games,
        }
    }

    fn apply(&self, game: &GameResult, force: bool) -> Result<IngestOutcome> {
        game.validate()?;
        let key = GameKey::from(game);

        // Held for the whole update: one writer at a time
        let mut state = self.state.lock();

        if !force && state.processed.contains(&key) {
            debug!("Duplicate game {:?}, skipping", key);
            return Ok(IngestOutcome::Duplicate);
        }
        if let Some(last) = state.last_processed_date {
            if game.date < last {
                return Err(PipelineError::OutOfOrderGame {
                    date: game.date,
                    last,
                });
            }
        }

        let (home_rating, away_rating) = self.ratings.update(game);
        self.form.record_result(game);

        // Earlier dates are rejected as out of order, so their keys can go
        if state.last_processed_date.map_or(false, |last| game.date > last) {
            state.processed.retain(|k| k.date >= game.date);
        }
        state.processed.insert(key);
        state.last_processed_date = Some(game.date);
        state.games_processed_total += 1;

        Ok(IngestOutcome::Applied {
            home_rating,
            away_rating,
        })
    }
}
