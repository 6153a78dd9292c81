//! Prediction service: keeps pipeline state current from the ESPN
//! scoreboard and publishes win probabilities for each day's slate.

pub mod config;
pub mod cycle;

pub use config::ServiceConfig;
pub use cycle::{CycleReport, PredictionService, ScoreboardSource};
