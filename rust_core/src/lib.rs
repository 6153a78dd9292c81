//! Hoopcast Core - live NBA win probability features.
//!
//! This module provides:
//! - Elo ratings with home advantage and season regression
//! - Rolling team form over the last N games, with rest and back-to-back flags
//! - Injury-driven Elo adjustments behind a TTL cache with stale fallback
//! - Fixed-order feature vectors for a pre-trained model
//! - Calibrated predictions with confidence tiers
//! - Ordered, idempotent ingestion of completed games
//! - Durable state and the ESPN feed client

pub mod calibration;
pub mod circuit_breaker;
pub mod clients;
pub mod config;
pub mod elo;
pub mod error;
pub mod features;
pub mod form;
pub mod ingest;
pub mod injury;
pub mod model;
pub mod predictor;
pub mod state;
pub mod teams;
mod types;

pub use calibration::Calibrator;
pub use config::{EloConfig, FormConfig, InjuryConfig, PipelineConfig, TierMultipliers};
pub use elo::{expected_home_score, RatingStore, TeamRating};
pub use error::{PipelineError, Result};
pub use features::{FeatureAssembler, FeatureVector, Moneylines, FEATURE_COLUMNS, FEATURE_COUNT};
pub use form::{FormWindow, RollingStats};
pub use ingest::{GameIngestor, IngestCheckpoint, IngestOutcome};
pub use injury::{
    AdjustmentSource, InjuryAdjustment, InjuryAdjustmentCache, InjuryAdjustmentProvider,
    InjuryEntry, InjurySource, InjuryStatus,
};
pub use model::{EloBaselineModel, LogisticModel, WinProbabilityModel};
pub use predictor::{ConfidenceTier, GamePrediction, MatchupRequest, Prediction, Predictor};
pub use state::{LoadedState, StateStore};
pub use teams::TeamDirectory;
pub use types::*;
