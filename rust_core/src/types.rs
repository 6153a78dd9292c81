//! Value types shared by every stage of the pipeline.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

/// NBA team identifier (e.g. 1610612747 for the Lakers)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side of a matchup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

/// A completed game. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub home_id: TeamId,
    pub away_id: TeamId,
    pub home_score: u16,
    pub away_score: u16,
    pub date: NaiveDate,
}

impl GameResult {
    pub fn new(
        home_id: TeamId,
        away_id: TeamId,
        home_score: u16,
        away_score: u16,
        date: NaiveDate,
    ) -> Self {
        Self {
            home_id,
            away_id,
            home_score,
            away_score,
            date,
        }
    }

    pub fn home_won(&self) -> bool {
        self.home_score > self.away_score
    }

    /// Season this game belongs to (see [`season_for_date`])
    pub fn season(&self) -> i32 {
        season_for_date(self.date)
    }

    /// Reject results that cannot come from a real NBA game.
    pub fn validate(&self) -> Result<()> {
        if self.home_id == self.away_id {
            return Err(PipelineError::InvalidGame(format!(
                "team {} listed as both home and away on {}",
                self.home_id, self.date
            )));
        }
        if self.home_score == self.away_score {
            return Err(PipelineError::InvalidGame(format!(
                "tied final {}-{} between {} and {} on {}",
                self.home_score, self.away_score, self.home_id, self.away_id, self.date
            )));
        }
        Ok(())
    }
}

/// NBA season label for a date.
///
/// Seasons start in October, so anything from August onward belongs to the
/// season starting that calendar year; January-July belongs to the previous one.
pub fn season_for_date(date: NaiveDate) -> i32 {
    if date.month() >= 8 {
        date.year()
    } else {
        date.year() - 1
    }
}
