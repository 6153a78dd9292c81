//! Severity-weighted Elo impact of a team's injury report.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::importance::{normalize_player_name, PlayerImportanceClassifier};
use super::InjuryEntry;
use crate::config::InjuryConfig;

/// Result of scoring one team's report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInjuryImpact {
    /// Elo points to add to the team's rating, always in `[max_adjustment, 0]`
    pub elo_delta: f64,
    /// Σ severity × tier multiplier over distinct players
    pub weighted_severity: f64,
    /// "Player (Status)" for each counted player
    pub injuries: Vec<String>,
}

impl TeamInjuryImpact {
    pub fn none() -> Self {
        Self {
            elo_delta: 0.0,
            weighted_severity: 0.0,
            injuries: Vec::new(),
        }
    }
}

/// Score a team's injury report.
///
/// A player listed more than once counts once, at the most severe status.
pub fn calculate_impact(
    entries: &[InjuryEntry],
    classifier: &PlayerImportanceClassifier,
    config: &InjuryConfig,
) -> TeamInjuryImpact {
    let mut distinct: Vec<(String, &InjuryEntry)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = normalize_player_name(&entry.player_name);
        match distinct.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => {
                if entry.status.severity() > existing.1.status.severity() {
                    existing.1 = entry;
                }
            }
            None => distinct.push((key, entry)),
        }
    }

    let mut weighted_severity = 0.0;
    let mut injuries = Vec::with_capacity(distinct.len());
    for (_, entry) in &distinct {
        let tier_multiplier = classifier.multiplier(&entry.player_name);
        weighted_severity += entry.status.severity() * tier_multiplier;
        injuries.push(format!("{} ({})", entry.player_name, entry.status.label()));
        debug!(
            "  {} {} severity={} tier_multiplier={}",
            entry.player_name,
            entry.status.label(),
            entry.status.severity(),
            tier_multiplier
        );
    }

    let mut elo_delta = (-(weighted_severity * config.base_multiplier))
        .max(config.max_adjustment)
        .min(0.0);
    if elo_delta.abs() < config.min_adjustment.abs() || elo_delta == 0.0 {
        // Also folds -0.0 into 0.0
        elo_delta = 0.0;
    }

    TeamInjuryImpact {
        elo_delta,
        weighted_severity,
        injuries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injury::InjuryStatus;
    use proptest::prelude::*;

    fn entry(name: &str, status: InjuryStatus) -> InjuryEntry {
        InjuryEntry::new(name, status)
    }

    #[test]
    fn test_empty_report() {
        let impact = calculate_impact(&[], &PlayerImportanceClassifier::default(), &InjuryConfig::default());
        assert_eq!(impact, TeamInjuryImpact::none());
        assert!(impact.elo_delta.is_sign_positive());
    }

    #[test]
    fn test_single_all_star_out() {
        let impact = calculate_impact(
            &[entry("LeBron James", InjuryStatus::Out)],
            &PlayerImportanceClassifier::default(),
            &InjuryConfig::default(),
        );
        assert_eq!(impact.elo_delta, -50.0);
        assert_eq!(impact.injuries, vec!["LeBron James (Out)".to_string()]);
    }

    #[test]
    fn test_two_all_stars_out_hits_cap_exactly() {
        let impact = calculate_impact(
            &[
                entry("LeBron James", InjuryStatus::Out),
                entry("Anthony Davis", InjuryStatus::Out),
            ],
            &PlayerImportanceClassifier::default(),
            &InjuryConfig::default(),
        );
        assert_eq!(impact.elo_delta, -100.0);
    }

    #[test]
    fn test_cap_applies_beyond_two_stars() {
        let impact = calculate_impact(
            &[
                entry("LeBron James", InjuryStatus::Out),
                entry("Anthony Davis", InjuryStatus::Out),
                entry("Role Player", InjuryStatus::Questionable),
            ],
            &PlayerImportanceClassifier::default(),
            &InjuryConfig::default(),
        );
        assert_eq!(impact.elo_delta, -100.0);
        assert_eq!(impact.weighted_severity, 5.75);
    }

    #[test]
    fn test_starter_day_to_day() {
        let impact = calculate_impact(
            &[entry("Role Player", InjuryStatus::DayToDay)],
            &PlayerImportanceClassifier::default(),
            &InjuryConfig::default(),
        );
        // 0.25 * 1.5 * 20
        assert_eq!(impact.elo_delta, -7.5);
    }

    #[test]
    fn test_duplicate_player_keeps_most_severe() {
        let impact = calculate_impact(
            &[
                entry("Stephen Curry", InjuryStatus::Questionable),
                entry("stephen curry", InjuryStatus::Out),
                entry("Stephen Curry", InjuryStatus::DayToDay),
            ],
            &PlayerImportanceClassifier::default(),
            &InjuryConfig::default(),
        );
        assert_eq!(impact.elo_delta, -50.0);
        assert_eq!(impact.injuries.len(), 1);
    }

    #[test]
    fn test_min_adjustment_zeroes_small_deltas() {
        let config = InjuryConfig {
            min_adjustment: -10.0,
            ..InjuryConfig::default()
        };
        let impact = calculate_impact(
            &[entry("Role Player", InjuryStatus::DayToDay)],
            &PlayerImportanceClassifier::default(),
            &config,
        );
        assert_eq!(impact.elo_delta, 0.0);
        assert_eq!(impact.injuries.len(), 1);
    }

    fn status() -> impl Strategy<Value = InjuryStatus> {
        prop_oneof![
            Just(InjuryStatus::Out),
            Just(InjuryStatus::Doubtful),
            Just(InjuryStatus::Questionable),
            Just(InjuryStatus::DayToDay),
        ]
    }

    fn player() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("LeBron James".to_string()),
            Just("Nikola Jokic".to_string()),
            Just("Stephen Curry".to_string()),
            "[A-Z][a-z]{2,8} [A-Z][a-z]{2,10}",
        ]
    }

    proptest! {
        #[test]
        fn prop_delta_within_bounds(
            report in prop::collection::vec((player(), status()), 0..20),
            multiplier in 0.0f64..60.0,
        ) {
            let config = InjuryConfig {
                base_multiplier: multiplier,
                ..InjuryConfig::default()
            };
            let entries: Vec<InjuryEntry> = report
                .into_iter()
                .map(|(name, status)| InjuryEntry::new(name, status))
                .collect();
            let impact = calculate_impact(&entries, &PlayerImportanceClassifier::default(), &config);
            prop_assert!(impact.elo_delta <= 0.0);
            prop_assert!(impact.elo_delta >= config.max_adjustment);
        }
    }
}
