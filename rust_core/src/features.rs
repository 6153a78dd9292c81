//! Feature assembly.
//!
//! Combines injury-adjusted Elo, rolling form, rest and market odds into
//! the fixed-order vector the win-probability model was trained on. The
//! column order below is the model's contract; never reorder it.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::elo::{expected_home_score, RatingStore};
use crate::error::{PipelineError, Result};
use crate::form::{FormWindow, RollingStats};
use crate::injury::{InjuryAdjustment, InjuryAdjustmentProvider};
use crate::types::TeamId;

pub const FEATURE_COUNT: usize = 25;

/// Model input columns, in order
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "elo_home",
    "elo_away",
    "elo_diff",
    "elo_prob",
    "pf_roll_home",
    "pf_roll_away",
    "pf_roll_diff",
    "pa_roll_home",
    "pa_roll_away",
    "pa_roll_diff",
    "win_roll_home",
    "win_roll_away",
    "win_roll_diff",
    "margin_roll_home",
    "margin_roll_away",
    "margin_roll_diff",
    "games_in_window_home",
    "games_in_window_away",
    "home_rest_days",
    "away_rest_days",
    "home_b2b",
    "away_b2b",
    "rest_diff",
    "market_prob_home",
    "market_prob_away",
];

/// Index of `elo_prob` in [`FEATURE_COLUMNS`]
pub const ELO_PROB_INDEX: usize = 3;

/// Owned column names, for comparing against a model's schema
pub fn feature_names() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// American moneylines for both sides, when a market exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Moneylines {
    pub home: Option<f64>,
    pub away: Option<f64>,
}

/// Implied probability of an American moneyline; 0.5 without a line.
///
/// +150 -> 100/250 = 0.40, -150 -> 150/250 = 0.60
pub fn implied_probability(moneyline: Option<f64>) -> f64 {
    match moneyline {
        Some(ml) if ml > 0.0 => 100.0 / (ml + 100.0),
        Some(ml) if ml < 0.0 => ml.abs() / (ml.abs() + 100.0),
        _ => 0.5,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn names(&self) -> &'static [&'static str] {
        &FEATURE_COLUMNS
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_COLUMNS
            .iter()
            .position(|c| *c == name)
            .map(|i| self.values[i])
    }

    pub fn elo_prob(&self) -> f64 {
        self.values[ELO_PROB_INDEX]
    }

    /// (name, value) pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_COLUMNS.iter().copied().zip(self.values.iter().copied())
    }
}

/// Base rating, the injury adjustment behind it, and their sum
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveElo {
    pub base: f64,
    pub injury: InjuryAdjustment,
    pub effective: f64,
}

/// Everything known about one side going into the game
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideContext {
    pub team_id: TeamId,
    pub elo: EffectiveElo,
    pub form: RollingStats,
}

/// Feature vector plus the per-side context it was built from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assembly {
    pub features: FeatureVector,
    pub home: SideContext,
    pub away: SideContext,
}

/// Builds feature vectors from live pipeline state.
///
/// Reads ratings and form (never mutates them) and consults the injury
/// provider, which may refresh its cache.
#[derive(Clone)]
pub struct FeatureAssembler {
    ratings: Arc<RatingStore>,
    form: Arc<FormWindow>,
    injuries: Arc<dyn InjuryAdjustmentProvider>,
}

impl FeatureAssembler {
    pub fn new(
        ratings: Arc<RatingStore>,
        form: Arc<FormWindow>,
        injuries: Arc<dyn InjuryAdjustmentProvider>,
    ) -> Self {
        Self {
            ratings,
            form,
            injuries,
        }
    }

    pub fn ratings(&self) -> &Arc<RatingStore> {
        &self.ratings
    }

    pub fn form(&self) -> &Arc<FormWindow> {
        &self.form
    }

    pub async fn build(&self, home_id: TeamId, away_id: TeamId, game_date: NaiveDate) -> Result<FeatureVector> {
        self.build_with_market(home_id, away_id, game_date, None).await
    }

    pub async fn build_with_market(
        &self,
        home_id: TeamId,
        away_id: TeamId,
        game_date: NaiveDate,
        market: Option<Moneylines>,
    ) -> Result<FeatureVector> {
        Ok(self
            .assemble_at(home_id, away_id, game_date, market, Utc::now())
            .await?
            .features)
    }

    /// Full assembly with an explicit clock for injury freshness.
    pub async fn assemble_at(
        &self,
        home_id: TeamId,
        away_id: TeamId,
        game_date: NaiveDate,
        market: Option<Moneylines>,
        now: DateTime<Utc>,
    ) -> Result<Assembly> {
        if home_id == away_id {
            return Err(PipelineError::InvalidMatchup(home_id));
        }
        for team_id in [home_id, away_id] {
            if !self.ratings.is_known(team_id) {
                return Err(PipelineError::UnknownTeam(team_id));
            }
        }

        let (home_injury, away_injury) = tokio::join!(
            self.injuries.adjustment(home_id, now),
            self.injuries.adjustment(away_id, now)
        );

        let home_base = self.ratings.get_rating(home_id);
        let away_base = self.ratings.get_rating(away_id);
        let home_elo = home_base + home_injury.elo_delta;
        let away_elo = away_base + away_injury.elo_delta;
        let elo_prob = expected_home_score(home_elo, away_elo, self.ratings.config().home_advantage);

        let home_form = self.form.get_rolling(home_id, game_date);
        let away_form = self.form.get_rolling(away_id, game_date);

        let market = market.unwrap_or_default();
        let flag = |b: bool| if b { 1.0 } else { 0.0 };

        let features = FeatureVector::from_values([
            home_elo,
            away_elo,
            home_elo - away_elo,
            elo_prob,
            home_form.avg_points_for,
            away_form.avg_points_for,
            home_form.avg_points_for - away_form.avg_points_for,
            home_form.avg_points_against,
            away_form.avg_points_against,
            home_form.avg_points_against - away_form.avg_points_against,
            home_form.win_pct,
            away_form.win_pct,
            home_form.win_pct - away_form.win_pct,
            home_form.avg_margin,
            away_form.avg_margin,
            home_form.avg_margin - away_form.avg_margin,
            home_form.games_in_window as f64,
            away_form.games_in_window as f64,
            home_form.rest_days as f64,
            away_form.rest_days as f64,
            flag(home_form.back_to_back),
            flag(away_form.back_to_back),
            (home_form.rest_days - away_form.rest_days) as f64,
            implied_probability(market.home),
            implied_probability(market.away),
        ]);

        Ok(Assembly {
            features,
            home: SideContext {
                team_id: home_id,
                elo: EffectiveElo {
                    base: home_base,
                    injury: home_injury,
                    effective: home_elo,
                },
                form: home_form,
            },
            away: SideContext {
                team_id: away_id,
                elo: EffectiveElo {
                    base: away_base,
                    injury: away_injury,
                    effective: away_elo,
                },
                form: away_form,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EloConfig, FormConfig};
    use crate::elo::TeamRating;
    use crate::form::GameSummary;
    use crate::injury::NoInjuryAdjustments;

    const HOME: TeamId = TeamId(1610612747);
    const AWAY: TeamId = TeamId(1610612738);

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn assembler(home_rating: f64, away_rating: f64) -> FeatureAssembler {
        let ratings = RatingStore::from_ratings(
            EloConfig::default(),
            vec![TeamRating::new(HOME, home_rating), TeamRating::new(AWAY, away_rating)],
        );
        let form = FormWindow::new(FormConfig::default());
        form.record_game(HOME, GameSummary { date: day(10), points_for: 120, points_against: 110 });
        form.record_game(HOME, GameSummary { date: day(13), points_for: 100, points_against: 104 });
        form.record_game(AWAY, GameSummary { date: day(12), points_for: 112, points_against: 100 });
        FeatureAssembler::new(Arc::new(ratings), Arc::new(form), Arc::new(NoInjuryAdjustments))
    }

    #[test]
    fn test_column_layout() {
        assert_eq!(FEATURE_COLUMNS.len(), 25);
        assert_eq!(FEATURE_COLUMNS[ELO_PROB_INDEX], "elo_prob");
        assert_eq!(FEATURE_COLUMNS[0], "elo_home");
        assert_eq!(FEATURE_COLUMNS[24], "market_prob_away");
    }

    #[test]
    fn test_implied_probability() {
        assert!((implied_probability(Some(150.0)) - 0.4).abs() < 1e-12);
        assert!((implied_probability(Some(-150.0)) - 0.6).abs() < 1e-12);
        assert_eq!(implied_probability(Some(100.0)), 0.5);
        assert_eq!(implied_probability(None), 0.5);
    }

    #[tokio::test]
    async fn test_build_layout_and_values() {
        let features = assembler(1650.0, 1580.0).build(HOME, AWAY, day(14)).await.unwrap();

        assert_eq!(features.values().len(), FEATURE_COUNT);
        assert_eq!(features.get("elo_home"), Some(1650.0));
        assert_eq!(features.get("elo_diff"), Some(70.0));
        assert!(features.elo_prob() > 0.5);
        assert_eq!(features.get("pf_roll_home"), Some(110.0));
        assert_eq!(features.get("pf_roll_away"), Some(112.0));
        assert_eq!(features.get("games_in_window_home"), Some(2.0));
        assert_eq!(features.get("home_rest_days"), Some(1.0));
        assert_eq!(features.get("home_b2b"), Some(1.0));
        assert_eq!(features.get("away_rest_days"), Some(2.0));
        assert_eq!(features.get("rest_diff"), Some(-1.0));
        assert_eq!(features.get("market_prob_home"), Some(0.5));
        assert_eq!(features.get("nonexistent"), None);
    }

    #[tokio::test]
    async fn test_build_is_deterministic() {
        let assembler = assembler(1600.0, 1550.0);
        let now = Utc::now();
        let market = Some(Moneylines { home: Some(-140.0), away: Some(120.0) });
        let a = assembler.assemble_at(HOME, AWAY, day(14), market, now).await.unwrap();
        let b = assembler.assemble_at(HOME, AWAY, day(14), market, now).await.unwrap();
        let bits = |v: &FeatureVector| v.values().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a.features), bits(&b.features));
    }

    #[tokio::test]
    async fn test_rejects_unknown_and_self_matchups() {
        let assembler = assembler(1500.0, 1500.0);
        let err = assembler.build(HOME, TeamId(999), day(14)).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTeam(TeamId(999))));

        let err = assembler.build(HOME, HOME, day(14)).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidMatchup(_)));
    }
}
