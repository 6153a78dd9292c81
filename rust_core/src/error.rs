//! Typed failures for the rating, form and prediction path.
//!
//! Injury feed problems are deliberately absent: they are absorbed by the
//! injury cache and never reach a caller.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::TeamId;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Team id was never registered nor seen in a game
    #[error("unknown team id {0}: never registered or observed in a game")]
    UnknownTeam(TeamId),

    #[error("invalid matchup: team {0} cannot play itself")]
    InvalidMatchup(TeamId),

    #[error("invalid game result: {0}")]
    InvalidGame(String),

    /// Ingestion must be sequential by date
    #[error("game dated {date} arrived after games from {last} were already ingested")]
    OutOfOrderGame { date: NaiveDate, last: NaiveDate },

    /// Model was trained on a different feature layout. Fatal.
    #[error("feature schema mismatch: pipeline produces {expected:?}, model expects {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid model artifact: {0}")]
    ModelArtifact(String),

    #[error("invalid calibrator: {0}")]
    Calibrator(String),

    #[error("corrupt state file: {0}")]
    CorruptState(String),

    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
