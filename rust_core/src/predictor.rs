//! Game predictions.
//!
//! Ties the pipeline together: assemble features, run the model, calibrate,
//! and label the result with a confidence tier from the home side's view.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibration::Calibrator;
use crate::error::Result;
use crate::features::{Assembly, FeatureAssembler, Moneylines};
use crate::injury::InjuryAdjustment;
use crate::model::{verify_schema, WinProbabilityModel};
use crate::types::{Side, TeamId};

/// Below this many prior games a team's form features are mostly priors
pub const MIN_HISTORY_GAMES: usize = 3;

/// Strength of the home side's position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceTier {
    #[serde(rename = "Heavy Favorite")]
    HeavyFavorite,
    #[serde(rename = "Moderate Favorite")]
    ModerateFavorite,
    #[serde(rename = "Lean Favorite")]
    LeanFavorite,
    #[serde(rename = "Toss-Up")]
    TossUp,
    #[serde(rename = "Lean Underdog")]
    LeanUnderdog,
    #[serde(rename = "Moderate Underdog")]
    ModerateUnderdog,
    #[serde(rename = "Heavy Underdog")]
    HeavyUnderdog,
}

impl ConfidenceTier {
    /// Bucket the home probability; each band includes its lower edge.
    pub fn from_home_probability(p_home: f64) -> Self {
        match p_home {
            p if p >= 0.75 => ConfidenceTier::HeavyFavorite,
            p if p >= 0.65 => ConfidenceTier::ModerateFavorite,
            p if p >= 0.55 => ConfidenceTier::LeanFavorite,
            p if p >= 0.45 => ConfidenceTier::TossUp,
            p if p >= 0.35 => ConfidenceTier::LeanUnderdog,
            p if p >= 0.25 => ConfidenceTier::ModerateUnderdog,
            _ => ConfidenceTier::HeavyUnderdog,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceTier::HeavyFavorite => "Heavy Favorite",
            ConfidenceTier::ModerateFavorite => "Moderate Favorite",
            ConfidenceTier::LeanFavorite => "Lean Favorite",
            ConfidenceTier::TossUp => "Toss-Up",
            ConfidenceTier::LeanUnderdog => "Lean Underdog",
            ConfidenceTier::ModerateUnderdog => "Moderate Underdog",
            ConfidenceTier::HeavyUnderdog => "Heavy Underdog",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub home_win_prob: f64,
    pub away_win_prob: f64,
    pub confidence_tier: ConfidenceTier,
}

impl Prediction {
    fn from_home_probability(p_home: f64) -> Self {
        Self {
            home_win_prob: p_home,
            away_win_prob: 1.0 - p_home,
            confidence_tier: ConfidenceTier::from_home_probability(p_home),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryAdjustments {
    pub home: InjuryAdjustment,
    pub away: InjuryAdjustment,
}

/// Prediction plus the context behind it, as served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePrediction {
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub game_date: NaiveDate,
    pub home_win_prob: f64,
    pub away_win_prob: f64,
    pub confidence_tier: ConfidenceTier,
    pub favored: Side,
    pub effective_elo_home: f64,
    pub effective_elo_away: f64,
    pub injury_adjustments: InjuryAdjustments,
    pub games_in_window_home: usize,
    pub games_in_window_away: usize,
    /// Either team has fewer than [`MIN_HISTORY_GAMES`] prior games
    pub limited_history: bool,
    pub is_calibrated: bool,
    pub model: String,
}

/// One game to predict in a batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchupRequest {
    pub home_id: TeamId,
    pub away_id: TeamId,
    pub game_date: NaiveDate,
    pub market: Option<Moneylines>,
}

pub struct Predictor {
    assembler: FeatureAssembler,
    model: Arc<dyn WinProbabilityModel>,
    calibrator: Calibrator,
}

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor")
            .field("model", &self.model.model_name())
            .field("calibrator", &self.calibrator)
            .finish()
    }
}

impl Predictor {
    /// Fails with `SchemaMismatch` if the model was trained on other columns.
    pub fn new(
        assembler: FeatureAssembler,
        model: Arc<dyn WinProbabilityModel>,
        calibrator: Calibrator,
    ) -> Result<Self> {
        verify_schema(model.as_ref())?;
        info!(
            "Predictor ready: model={}, calibrated={}",
            model.model_name(),
            !calibrator.is_identity()
        );
        Ok(Self {
            assembler,
            model,
            calibrator,
        })
    }

    pub fn assembler(&self) -> &FeatureAssembler {
        &self.assembler
    }

    pub async fn predict(&self, home_id: TeamId, away_id: TeamId, game_date: NaiveDate) -> Result<Prediction> {
        let assembly = self
            .assembler
            .assemble_at(home_id, away_id, game_date, None, Utc::now())
            .await?;
        Ok(Prediction::from_home_probability(self.home_probability(&assembly)))
    }

    pub async fn predict_game(
        &self,
        home_id: TeamId,
        away_id: TeamId,
        game_date: NaiveDate,
        market: Option<Moneylines>,
    ) -> Result<GamePrediction> {
        self.predict_game_at(home_id, away_id, game_date, market, Utc::now())
            .await
    }

    /// [`Predictor::predict_game`] with an explicit clock for injury freshness
    pub async fn predict_game_at(
        &self,
        home_id: TeamId,
        away_id: TeamId,
        game_date: NaiveDate,
        market: Option<Moneylines>,
        now: DateTime<Utc>,
    ) -> Result<GamePrediction> {
        let assembly = self
            .assembler
            .assemble_at(home_id, away_id, game_date, market, now)
            .await?;
        let p_home = self.home_probability(&assembly);
        let prediction = Prediction::from_home_probability(p_home);

        let home_games = assembly.home.form.games_in_window;
        let away_games = assembly.away.form.games_in_window;

        debug!(
            "{} vs {} on {}: p_home={:.3} ({})",
            home_id, away_id, game_date, p_home, prediction.confidence_tier
        );

        Ok(GamePrediction {
            home_team_id: home_id,
            away_team_id: away_id,
            game_date,
            home_win_prob: prediction.home_win_prob,
            away_win_prob: prediction.away_win_prob,
            confidence_tier: prediction.confidence_tier,
            favored: if p_home >= 0.5 { Side::Home } else { Side::Away },
            effective_elo_home: assembly.home.elo.effective,
            effective_elo_away: assembly.away.elo.effective,
            injury_adjustments: InjuryAdjustments {
                home: assembly.home.elo.injury,
                away: assembly.away.elo.injury,
            },
            games_in_window_home: home_games,
            games_in_window_away: away_games,
            limited_history: home_games < MIN_HISTORY_GAMES || away_games < MIN_HISTORY_GAMES,
            is_calibrated: !self.calibrator.is_identity(),
            model: self.model.model_name().to_string(),
        })
    }

    /// Predict a slate concurrently. Results are in request order.
    pub async fn predict_batch(&self, games: &[MatchupRequest]) -> Vec<Result<GamePrediction>> {
        let now = Utc::now();
        join_all(games.iter().map(|g| {
            self.predict_game_at(g.home_id, g.away_id, g.game_date, g.market, now)
        }))
        .await
    }

    fn home_probability(&self, assembly: &Assembly) -> f64 {
        let raw = self.model.predict_raw(&assembly.features).clamp(0.0, 1.0);
        self.calibrator.calibrate(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_home_favored() {
        assert_eq!(ConfidenceTier::from_home_probability(0.75), ConfidenceTier::HeavyFavorite);
        assert_eq!(ConfidenceTier::from_home_probability(0.7499), ConfidenceTier::ModerateFavorite);
        assert_eq!(ConfidenceTier::from_home_probability(0.65), ConfidenceTier::ModerateFavorite);
        assert_eq!(ConfidenceTier::from_home_probability(0.55), ConfidenceTier::LeanFavorite);
        assert_eq!(ConfidenceTier::from_home_probability(0.5499), ConfidenceTier::TossUp);
        assert_eq!(ConfidenceTier::from_home_probability(0.5), ConfidenceTier::TossUp);
    }

    #[test]
    fn test_tier_boundaries_away_favored() {
        assert_eq!(ConfidenceTier::from_home_probability(0.20), ConfidenceTier::HeavyUnderdog);
        assert_eq!(ConfidenceTier::from_home_probability(0.30), ConfidenceTier::ModerateUnderdog);
        assert_eq!(ConfidenceTier::from_home_probability(0.40), ConfidenceTier::LeanUnderdog);
        assert_eq!(ConfidenceTier::from_home_probability(0.47), ConfidenceTier::TossUp);
    }

    #[test]
    fn test_tier_underdog_edges_are_lower_inclusive() {
        assert_eq!(ConfidenceTier::from_home_probability(0.45), ConfidenceTier::TossUp);
        assert_eq!(ConfidenceTier::from_home_probability(0.4499), ConfidenceTier::LeanUnderdog);
        assert_eq!(ConfidenceTier::from_home_probability(0.35), ConfidenceTier::LeanUnderdog);
        assert_eq!(ConfidenceTier::from_home_probability(0.3499), ConfidenceTier::ModerateUnderdog);
        assert_eq!(ConfidenceTier::from_home_probability(0.25), ConfidenceTier::ModerateUnderdog);
        assert_eq!(ConfidenceTier::from_home_probability(0.2499), ConfidenceTier::HeavyUnderdog);
        assert_eq!(ConfidenceTier::from_home_probability(0.0), ConfidenceTier::HeavyUnderdog);
    }

    #[test]
    fn test_tier_serializes_as_label() {
        let json = serde_json::to_string(&ConfidenceTier::ModerateUnderdog).unwrap();
        assert_eq!(json, "\"Moderate Underdog\"");
        assert_eq!(ConfidenceTier::TossUp.to_string(), "Toss-Up");
    }

    #[test]
    fn test_prediction_probabilities_sum_to_one() {
        let p = Prediction::from_home_probability(0.618);
        assert!((p.home_win_prob + p.away_win_prob - 1.0).abs() < 1e-12);
    }
}
