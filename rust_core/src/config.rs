//! Pipeline configuration
//!
//! One immutable struct per stage, loaded from environment variables with
//! defaults that match the production model. Stores take their config by
//! value at construction; nothing reads the environment afterwards.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;

/// Elo tracker settings
#[derive(Debug, Clone, PartialEq)]
pub struct EloConfig {
    /// Rating assigned to a team the first time it is seen (default: 1500)
    pub initial_rating: f64,
    /// Update step size (default: 20)
    pub k_factor: f64,
    /// Home-court bonus in rating points (default: 70)
    pub home_advantage: f64,
    /// Share of distance from the mean kept across a season boundary (default: 0.7)
    pub season_carryover: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            initial_rating: 1500.0,
            k_factor: 20.0,
            home_advantage: 70.0,
            season_carryover: 0.7,
        }
    }
}

/// Rolling form settings
#[derive(Debug, Clone, PartialEq)]
pub struct FormConfig {
    /// Games retained per team (default: 10)
    pub window_size: usize,
    /// Rest assumed when a team has no prior game (default: 7)
    pub default_rest_days: i64,
    /// Upper clamp for rest days (default: 14)
    pub max_rest_days: i64,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            default_rest_days: 7,
            max_rest_days: 14,
        }
    }
}

/// Impact multipliers per player tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierMultipliers {
    pub all_star: f64,
    pub starter: f64,
    pub bench: f64,
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            all_star: 2.5,
            starter: 1.5,
            bench: 1.0,
        }
    }
}

/// Injury adjustment settings
#[derive(Debug, Clone, PartialEq)]
pub struct InjuryConfig {
    /// Master switch; when off every adjustment is 0 and no fetch happens
    pub enabled: bool,
    /// Elo points per unit of weighted severity (default: 20)
    pub base_multiplier: f64,
    /// Most negative adjustment allowed (default: -100)
    pub max_adjustment: f64,
    /// Adjustments smaller in magnitude than this are zeroed (default: 0, disabled)
    pub min_adjustment: f64,
    pub tier_multipliers: TierMultipliers,
    /// Freshness window for computed adjustments (default: 4 hours)
    pub ttl_secs: u64,
    /// Bound on one feed request (default: 10 seconds)
    pub fetch_timeout_secs: u64,
    /// After a failed fetch, serve fallbacks this long before retrying (default: 60 seconds)
    pub retry_backoff_secs: u64,
    pub persist: bool,
    pub cache_file: PathBuf,
    /// Log every non-zero adjustment at info level
    pub log_adjustments: bool,
}

impl Default for InjuryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_multiplier: 20.0,
            max_adjustment: -100.0,
            min_adjustment: 0.0,
            tier_multipliers: TierMultipliers::default(),
            ttl_secs: 4 * 60 * 60,
            fetch_timeout_secs: 10,
            retry_backoff_secs: 60,
            persist: false,
            cache_file: PathBuf::from(".cache/injury_cache.json"),
            log_adjustments: true,
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub elo: EloConfig,
    pub form: FormConfig,
    pub injury: InjuryConfig,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset or unparseable values fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let elo_defaults = EloConfig::default();
        let form_defaults = FormConfig::default();
        let injury_defaults = InjuryConfig::default();
        let tier_defaults = TierMultipliers::default();

        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(default)
        };

        Self {
            elo: EloConfig {
                initial_rating: elo_defaults.initial_rating,
                k_factor: parsed("ELO_K_FACTOR").unwrap_or(elo_defaults.k_factor),
                home_advantage: parsed("ELO_HOME_ADVANTAGE").unwrap_or(elo_defaults.home_advantage),
                season_carryover: parsed("ELO_SEASON_CARRYOVER")
                    .unwrap_or(elo_defaults.season_carryover),
            },
            form: FormConfig {
                window_size: parse_or(&lookup, "FORM_WINDOW_SIZE", form_defaults.window_size)
                    .max(1),
                ..form_defaults
            },
            injury: InjuryConfig {
                enabled: flag("INJURY_ADJUSTMENTS_ENABLED", injury_defaults.enabled),
                base_multiplier: parsed("INJURY_ADJUSTMENT_MULTIPLIER")
                    .unwrap_or(injury_defaults.base_multiplier),
                max_adjustment: parsed("INJURY_MAX_ADJUSTMENT")
                    .unwrap_or(injury_defaults.max_adjustment),
                min_adjustment: parsed("INJURY_MIN_ADJUSTMENT")
                    .unwrap_or(injury_defaults.min_adjustment),
                tier_multipliers: TierMultipliers {
                    all_star: parsed("PLAYER_IMPORTANCE_ALLSTAR").unwrap_or(tier_defaults.all_star),
                    starter: parsed("PLAYER_IMPORTANCE_STARTER").unwrap_or(tier_defaults.starter),
                    bench: parsed("PLAYER_IMPORTANCE_BENCH").unwrap_or(tier_defaults.bench),
                },
                ttl_secs: parse_or(&lookup, "INJURY_CACHE_TTL", injury_defaults.ttl_secs),
                fetch_timeout_secs: parse_or(
                    &lookup,
                    "INJURY_FETCH_TIMEOUT_SECS",
                    injury_defaults.fetch_timeout_secs,
                ),
                retry_backoff_secs: parse_or(
                    &lookup,
                    "INJURY_RETRY_BACKOFF_SECS",
                    injury_defaults.retry_backoff_secs,
                ),
                persist: flag("INJURY_CACHE_PERSIST", injury_defaults.persist),
                cache_file: lookup("INJURY_CACHE_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(injury_defaults.cache_file),
                log_adjustments: flag("LOG_INJURY_ADJUSTMENTS", injury_defaults.log_adjustments),
            },
        }
    }

    /// Log the current configuration
    pub fn log_config(&self) {
        info!("Pipeline configuration:");
        info!(
            "  Elo: k={}, home_advantage={}, carryover={}",
            self.elo.k_factor, self.elo.home_advantage, self.elo.season_carryover
        );
        info!("  Form window: {} games", self.form.window_size);
        info!(
            "  Injury adjustments: {}",
            if self.injury.enabled { "ENABLED" } else { "DISABLED" }
        );
        if self.injury.enabled {
            info!(
                "    multiplier={}, range=[{}, 0], min={}",
                self.injury.base_multiplier, self.injury.max_adjustment, self.injury.min_adjustment
            );
            info!(
                "    tiers: all-star={}, starter={}, bench={}",
                self.injury.tier_multipliers.all_star,
                self.injury.tier_multipliers.starter,
                self.injury.tier_multipliers.bench
            );
            info!(
                "    cache ttl={}s, fetch timeout={}s, retry backoff={}s, persist={}",
                self.injury.ttl_secs,
                self.injury.fetch_timeout_secs,
                self.injury.retry_backoff_secs,
                self.injury.persist
            );
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
