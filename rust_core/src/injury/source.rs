//! Injury feed seam.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::InjuryEntry;
use crate::types::TeamId;

/// League-wide injury report keyed by team
pub type LeagueInjuries = HashMap<TeamId, Vec<InjuryEntry>>;

/// Why a feed could not produce a report. Always recoverable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceUnavailable {
    #[error("injury feed timed out after {0:?}")]
    Timeout(Duration),
    #[error("injury feed request failed: {0}")]
    Http(String),
    #[error("malformed injury payload: {0}")]
    Malformed(String),
    #[error("injury feed circuit breaker is open")]
    CircuitOpen,
}

/// Anything that can produce a league-wide injury report.
#[async_trait]
pub trait InjurySource: Send + Sync {
    /// Fetch the current report for every team that has one
    async fn fetch_league_injuries(&self) -> Result<LeagueInjuries, SourceUnavailable>;

    /// Source name for logging
    fn source_name(&self) -> &str;
}
