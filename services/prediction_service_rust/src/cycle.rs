//! The daily prediction cycle.
//!
//! One cycle: ingest finals since the last processed date, regress ratings
//! if the slate opens a new season, predict the slate with market odds where
//! listed, then flush state to disk.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};
use hoopcast_core::calibration::Calibrator;
use hoopcast_core::clients::{EspnClient, ScoreboardGame};
use hoopcast_core::features::FeatureAssembler;
use hoopcast_core::ingest::GameIngestor;
use hoopcast_core::injury::InjuryAdjustmentProvider;
use hoopcast_core::model::{EloBaselineModel, LogisticModel, WinProbabilityModel};
use hoopcast_core::predictor::{GamePrediction, MatchupRequest, Predictor};
use hoopcast_core::state::StateStore;
use hoopcast_core::teams::TeamDirectory;
use hoopcast_core::{season_for_date, GameResult};
use tracing::{info, warn};

use crate::config::ServiceConfig;

/// Where finals and the upcoming slate come from
#[async_trait]
pub trait ScoreboardSource: Send + Sync {
    async fn completed_games(&self, date: NaiveDate) -> Result<Vec<GameResult>>;
    async fn scheduled_games(&self, date: NaiveDate) -> Result<Vec<ScoreboardGame>>;
}

#[async_trait]
impl ScoreboardSource for EspnClient {
    async fn completed_games(&self, date: NaiveDate) -> Result<Vec<GameResult>> {
        EspnClient::completed_games(self, date).await
    }

    async fn scheduled_games(&self, date: NaiveDate) -> Result<Vec<ScoreboardGame>> {
        EspnClient::scheduled_games(self, date).await
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub date: NaiveDate,
    pub games_ingested: usize,
    pub predictions: Vec<GamePrediction>,
    pub failed_predictions: usize,
}

pub struct PredictionService {
    config: ServiceConfig,
    store: StateStore,
    ingestor: GameIngestor,
    predictor: Predictor,
    scoreboard: Arc<dyn ScoreboardSource>,
}

impl PredictionService {
    /// Load state and model artifacts. Every NBA franchise is registered so
    /// the first slate of a fresh deployment can be predicted.
    pub fn new(
        config: ServiceConfig,
        scoreboard: Arc<dyn ScoreboardSource>,
        injuries: Arc<dyn InjuryAdjustmentProvider>,
    ) -> Result<Self> {
        let store = StateStore::new(config.state_dir.clone());
        let loaded = store
            .load(config.pipeline.elo.clone(), config.pipeline.form.clone())
            .with_context(|| format!("Failed to load state from {:?}", config.state_dir))?;

        let ratings = Arc::new(loaded.ratings);
        let form = Arc::new(loaded.form);
        let registered = TeamDirectory::nba()
            .team_ids()
            .filter(|id| ratings.register_team(*id))
            .count();
        if registered > 0 {
            info!("Registered {} teams at the initial rating", registered);
        }

        let model: Arc<dyn WinProbabilityModel> = match &config.model_path {
            Some(path) => Arc::new(
                LogisticModel::from_file(path).context("Failed to load model artifact")?,
            ),
            None => Arc::new(EloBaselineModel::new()),
        };
        let calibrator = match &config.calibrator_path {
            Some(path) => Calibrator::from_file(path).context("Failed to load calibrator")?,
            None => Calibrator::Identity,
        };

        let ingestor =
            GameIngestor::with_checkpoint(ratings.clone(), form.clone(), loaded.metadata.checkpoint);
        let assembler = FeatureAssembler::new(ratings, form, injuries);
        let predictor = Predictor::new(assembler, model, calibrator)?;

        Ok(Self {
            config,
            store,
            ingestor,
            predictor,
            scoreboard,
        })
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn ingestor(&self) -> &GameIngestor {
        &self.ingestor
    }

    /// Slate date: pinned by config, otherwise the local calendar day
    pub fn slate_date(&self) -> NaiveDate {
        self.config
            .prediction_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    pub async fn run_cycle(&self, date: NaiveDate) -> Result<CycleReport> {
        // Backlog finals may still belong to the previous season
        let games_ingested = self.ingest_until(date).await;

        let ratings = self.predictor.assembler().ratings();
        ratings.apply_season_regression(season_for_date(date));

        let slate = match self.scoreboard.scheduled_games(date).await {
            Ok(slate) => slate,
            Err(e) => {
                warn!("No slate for {}: {:#}", date, e);
                Vec::new()
            }
        };
        let requests: Vec<MatchupRequest> = slate
            .iter()
            .filter_map(|g| {
                Some(MatchupRequest {
                    home_id: g.home_id?,
                    away_id: g.away_id?,
                    game_date: date,
                    market: Some(g.moneylines()),
                })
            })
            .collect();

        let mut predictions = Vec::with_capacity(requests.len());
        let mut failed_predictions = 0;
        for (request, result) in requests.iter().zip(self.predictor.predict_batch(&requests).await) {
            match result {
                Ok(prediction) => {
                    info!("{}", serde_json::to_string(&prediction)?);
                    predictions.push(prediction);
                }
                Err(e) => {
                    failed_predictions += 1;
                    warn!(
                        "Prediction failed for {} vs {}: {}",
                        request.home_id, request.away_id, e
                    );
                }
            }
        }

        self.store
            .save(
                ratings,
                self.predictor.assembler().form(),
                self.ingestor.checkpoint(),
            )
            .context("Failed to save state")?;

        info!(
            "Cycle {} complete: {} games ingested, {} predictions, {} failed",
            date,
            games_ingested,
            predictions.len(),
            failed_predictions
        );
        Ok(CycleReport {
            date,
            games_ingested,
            predictions,
            failed_predictions,
        })
    }

    /// Run once, or forever on the configured interval
    pub async fn run(&self) -> Result<()> {
        if self.config.cycle_interval_secs == 0 {
            self.run_cycle(self.slate_date()).await?;
            return Ok(());
        }

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.cycle_interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = self.run_cycle(self.slate_date()).await {
                warn!("Cycle failed: {:#}", e);
            }
        }
    }

    /// Ingest finals through the day before `date`, starting from the last
    /// processed date (its games dedup) or, on fresh state, the lookback
    /// window. Stops at the first date the scoreboard cannot be read so
    /// ordering is preserved.
    async fn ingest_until(&self, date: NaiveDate) -> usize {
        let mut day = match self.ingestor.last_processed_date() {
            Some(last) => last,
            None => date
                .checked_sub_days(Days::new(self.config.ingest_lookback_days as u64))
                .unwrap_or(date),
        };

        let mut applied = 0;
        while day < date {
            match self.scoreboard.completed_games(day).await {
                Ok(games) => applied += self.ingestor.process_games(&games),
                Err(e) => {
                    warn!("Stopping ingestion at {}: {:#}", day, e);
                    break;
                }
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        applied
    }
}
