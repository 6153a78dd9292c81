//! Service configuration
//!
//! Pipeline settings come from `PipelineConfig`; this adds where state and
//! model artifacts live and how often the daily cycle runs.

use std::env;
use std::path::PathBuf;

use chrono::NaiveDate;
use hoopcast_core::config::PipelineConfig;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding state.json and metadata.json (default: state)
    pub state_dir: PathBuf,
    /// Logistic model artifact; the Elo baseline is used when unset
    pub model_path: Option<PathBuf>,
    /// Calibrator artifact; identity when unset
    pub calibrator_path: Option<PathBuf>,
    /// Fixed slate date (YYYY-MM-DD) instead of today
    pub prediction_date: Option<NaiveDate>,
    /// Days of finals to re-check before the slate date (default: 1)
    pub ingest_lookback_days: i64,
    /// Seconds between cycles; 0 runs a single cycle (default: 0)
    pub cycle_interval_secs: u64,
    pub pipeline: PipelineConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        Self {
            state_dir: path("STATE_DIR").unwrap_or_else(|| PathBuf::from("state")),
            model_path: path("MODEL_PATH"),
            calibrator_path: path("CALIBRATOR_PATH"),
            prediction_date: lookup("PREDICTION_DATE")
                .and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok()),
            ingest_lookback_days: lookup("INGEST_LOOKBACK_DAYS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(1)
                .max(0),
            cycle_interval_secs: lookup("CYCLE_INTERVAL_SECS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
            pipeline: PipelineConfig::from_lookup(&lookup),
        }
    }

    pub fn log_config(&self) {
        info!("Service configuration:");
        info!("  State dir: {:?}", self.state_dir);
        match &self.model_path {
            Some(path) => info!("  Model: logistic ({:?})", path),
            None => info!("  Model: elo_baseline"),
        }
        match &self.calibrator_path {
            Some(path) => info!("  Calibrator: {:?}", path),
            None => info!("  Calibrator: identity"),
        }
        if let Some(date) = self.prediction_date {
            info!("  Prediction date pinned to {}", date);
        }
        info!("  Ingest lookback: {} days", self.ingest_lookback_days);
        if self.cycle_interval_secs == 0 {
            info!("  Mode: single cycle");
        } else {
            info!("  Mode: every {}s", self.cycle_interval_secs);
        }
        self.pipeline.log_config();
    }
}
