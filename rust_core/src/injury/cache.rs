//! Injury adjustment cache.
//!
//! Every request for a team's adjustment resolves to exactly one of:
//! - `Fresh`: computed within the TTL (possibly by the fetch this request triggered)
//! - `Stale`: the feed failed, the last known adjustment is served as-is
//! - `Unavailable`: the feed failed and nothing was ever known, delta 0
//! - `Disabled`: adjustments are switched off, delta 0
//!
//! The cache never returns an error. The feed answers for the whole league,
//! so one fetch lock covers every team: a slate of cold requests causes one
//! outbound fetch, and waiters re-check their own entry once it lands. After
//! a failed fetch, requests inside the retry backoff serve the fallback
//! instead of hammering the feed again.

use std::fmt;
use std::fs;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::impact::{calculate_impact, TeamInjuryImpact};
use super::importance::PlayerImportanceClassifier;
use super::source::{InjurySource, LeagueInjuries, SourceUnavailable};
use super::InjuryEntry;
use crate::config::InjuryConfig;
use crate::error::Result;
use crate::types::TeamId;

/// Longest TTL or backoff honored; larger settings behave as this.
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 3600;

/// Where an adjustment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentSource {
    Fresh,
    Stale,
    Unavailable,
    Disabled,
}

/// Elo delta to apply to a team's rating for the current slate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryAdjustment {
    pub team_id: TeamId,
    /// Always in `[max_adjustment, 0]`
    pub elo_delta: f64,
    pub computed_at: DateTime<Utc>,
    pub source: AdjustmentSource,
    pub injuries: Vec<String>,
}

impl InjuryAdjustment {
    /// Zero adjustment with no report behind it
    pub fn neutral(team_id: TeamId, now: DateTime<Utc>, source: AdjustmentSource) -> Self {
        Self {
            team_id,
            elo_delta: 0.0,
            computed_at: now,
            source,
            injuries: Vec::new(),
        }
    }
}

/// Seam between feature assembly and wherever adjustments come from.
#[async_trait]
pub trait InjuryAdjustmentProvider: Send + Sync {
    async fn adjustment(&self, team_id: TeamId, now: DateTime<Utc>) -> InjuryAdjustment;
}

/// Provider for deployments without an injury feed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInjuryAdjustments;

#[async_trait]
impl InjuryAdjustmentProvider for NoInjuryAdjustments {
    async fn adjustment(&self, team_id: TeamId, now: DateTime<Utc>) -> InjuryAdjustment {
        InjuryAdjustment::neutral(team_id, now, AdjustmentSource::Disabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CachedImpact {
    team_id: TeamId,
    elo_delta: f64,
    weighted_severity: f64,
    injuries: Vec<String>,
    computed_at: DateTime<Utc>,
}

impl CachedImpact {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.computed_at < ttl
    }

    fn to_adjustment(&self, source: AdjustmentSource) -> InjuryAdjustment {
        InjuryAdjustment {
            team_id: self.team_id,
            elo_delta: self.elo_delta,
            computed_at: self.computed_at,
            source,
            injuries: self.injuries.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache {
    saved_at: DateTime<Utc>,
    ttl_secs: u64,
    entries: Vec<CachedImpact>,
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub expired_entries: usize,
    pub average_age_secs: f64,
    pub ttl_secs: u64,
}

/// When the last successful league fetch landed and which teams it listed
#[derive(Debug, Clone)]
struct LeagueFetch {
    at: DateTime<Utc>,
    listed: FxHashSet<TeamId>,
}

pub struct InjuryAdjustmentCache {
    source: Arc<dyn InjurySource>,
    classifier: PlayerImportanceClassifier,
    config: InjuryConfig,
    entries: RwLock<FxHashMap<TeamId, CachedImpact>>,
    fetch_lock: AsyncMutex<()>,
    last_fetch: Mutex<Option<LeagueFetch>>,
    last_failure: Mutex<Option<DateTime<Utc>>>,
}

impl fmt::Debug for InjuryAdjustmentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjuryAdjustmentCache")
            .field("source", &self.source.source_name())
            .field("entries", &self.entries.read().len())
            .field("ttl_secs", &self.config.ttl_secs)
            .field("enabled", &self.config.enabled)
            .finish()
    }
}

impl InjuryAdjustmentCache {
    /// Cache over `source` using the curated All-Star pool. Loads the
    /// persisted cache file when persistence is on.
    pub fn new(source: Arc<dyn InjurySource>, config: InjuryConfig) -> Self {
        let classifier = PlayerImportanceClassifier::new(config.tier_multipliers);
        Self::with_classifier(source, classifier, config)
    }

    pub fn with_classifier(
        source: Arc<dyn InjurySource>,
        classifier: PlayerImportanceClassifier,
        config: InjuryConfig,
    ) -> Self {
        let cache = Self {
            source,
            classifier,
            config,
            entries: RwLock::new(FxHashMap::default()),
            fetch_lock: AsyncMutex::new(()),
            last_fetch: Mutex::new(None),
            last_failure: Mutex::new(None),
        };
        if cache.config.persist {
            match cache.load() {
                Ok(0) => {}
                Ok(n) => info!("Loaded {} injury adjustments from {:?}", n, cache.config.cache_file),
                Err(e) => warn!(
                    "Could not load injury cache {:?}, starting empty: {}",
                    cache.config.cache_file, e
                ),
            }
        }
        cache
    }

    pub fn config(&self) -> &InjuryConfig {
        &self.config
    }

    /// Adjustment for `team_id` as of `now`. Never fails.
    pub async fn get_adjustment(&self, team_id: TeamId, now: DateTime<Utc>) -> InjuryAdjustment {
        if !self.config.enabled {
            return InjuryAdjustment::neutral(team_id, now, AdjustmentSource::Disabled);
        }

        if let Some(hit) = self.fresh(team_id, now) {
            return hit;
        }

        let _guard = self.fetch_lock.lock().await;

        // The fetch we waited on may have covered this team
        if let Some(hit) = self.fresh(team_id, now) {
            debug!("Injury adjustment for team {} refreshed concurrently", team_id);
            return hit;
        }
        if let Some(hit) = self.absent_from_last_fetch(team_id, now) {
            return hit;
        }

        if self.in_backoff(now) {
            debug!("Injury feed in retry backoff, serving fallback for team {}", team_id);
            return self.fallback(team_id, now);
        }

        match self.fetch().await {
            Ok(league) => {
                *self.last_fetch.lock() = Some(LeagueFetch {
                    at: now,
                    listed: league.keys().copied().collect(),
                });
                *self.last_failure.lock() = None;
                let adjustment = self.store_league(team_id, &league, now);
                if self.config.persist {
                    if let Err(e) = self.save() {
                        warn!("Failed to persist injury cache: {}", e);
                    }
                }
                adjustment
            }
            Err(err) => {
                warn!(
                    "Injury feed '{}' unavailable while refreshing team {}: {}",
                    self.source.source_name(),
                    team_id,
                    err
                );
                *self.last_failure.lock() = Some(now);
                self.fallback(team_id, now)
            }
        }
    }

    /// Store a computed impact directly (warm start, tests, manual overrides)
    pub fn insert(&self, team_id: TeamId, impact: TeamInjuryImpact, computed_at: DateTime<Utc>) {
        self.entries.write().insert(
            team_id,
            CachedImpact {
                team_id,
                elo_delta: impact.elo_delta,
                weighted_severity: impact.weighted_severity,
                injuries: impact.injuries,
                computed_at,
            },
        );
    }

    pub fn clear(&self, team_id: TeamId) -> bool {
        self.entries.write().remove(&team_id).is_some()
    }

    pub fn clear_all(&self) {
        self.entries.write().clear();
    }

    /// Drop entries past the TTL. Returns how many were removed.
    pub fn clear_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh(now, ttl));
        before - entries.len()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> CacheStats {
        let ttl = self.ttl();
        let entries = self.entries.read();
        let total = entries.len();
        let fresh = entries.values().filter(|e| e.is_fresh(now, ttl)).count();
        let average_age_secs = if total == 0 {
            0.0
        } else {
            entries
                .values()
                .map(|e| (now - e.computed_at).num_milliseconds() as f64 / 1000.0)
                .sum::<f64>()
                / total as f64
        };
        CacheStats {
            total_entries: total,
            fresh_entries: fresh,
            expired_entries: total - fresh,
            average_age_secs,
            ttl_secs: self.config.ttl_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Write all entries to the cache file
    pub fn save(&self) -> Result<()> {
        let mut entries: Vec<CachedImpact> = self.entries.read().values().cloned().collect();
        entries.sort_by_key(|e| e.team_id);
        let payload = PersistedCache {
            saved_at: Utc::now(),
            ttl_secs: self.config.ttl_secs,
            entries,
        };

        let path = &self.config.cache_file;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&payload)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load entries from the cache file, keeping expired ones as stale
    /// fallbacks. Returns the number loaded.
    pub fn load(&self) -> Result<usize> {
        let path = &self.config.cache_file;
        if !path.exists() {
            return Ok(0);
        }
        let payload: PersistedCache = serde_json::from_str(&fs::read_to_string(path)?)?;
        let count = payload.entries.len();
        let mut entries = self.entries.write();
        for entry in payload.entries {
            entries.insert(entry.team_id, entry);
        }
        Ok(count)
    }

    fn ttl(&self) -> Duration {
        seconds(self.config.ttl_secs)
    }

    fn fresh(&self, team_id: TeamId, now: DateTime<Utc>) -> Option<InjuryAdjustment> {
        let ttl = self.ttl();
        self.entries
            .read()
            .get(&team_id)
            .filter(|e| e.is_fresh(now, ttl))
            .map(|e| e.to_adjustment(AdjustmentSource::Fresh))
    }

    fn fallback(&self, team_id: TeamId, now: DateTime<Utc>) -> InjuryAdjustment {
        match self.entries.read().get(&team_id) {
            Some(entry) => entry.to_adjustment(AdjustmentSource::Stale),
            None => InjuryAdjustment::neutral(team_id, now, AdjustmentSource::Unavailable),
        }
    }

    /// A team the last league report left out had no injuries as of that
    /// report. Record it as such while the report is within the TTL.
    fn absent_from_last_fetch(&self, team_id: TeamId, now: DateTime<Utc>) -> Option<InjuryAdjustment> {
        let fetched_at = match &*self.last_fetch.lock() {
            Some(fetch) if !fetch.listed.contains(&team_id) => fetch.at,
            _ => return None,
        };
        if now - fetched_at >= self.ttl() {
            return None;
        }
        let healthy = self.score(team_id, &[], fetched_at);
        let adjustment = healthy.to_adjustment(AdjustmentSource::Fresh);
        self.entries.write().insert(team_id, healthy);
        debug!("Team {} absent from the last injury report, recorded as healthy", team_id);
        Some(adjustment)
    }

    fn in_backoff(&self, now: DateTime<Utc>) -> bool {
        let backoff = seconds(self.config.retry_backoff_secs);
        self.last_failure
            .lock()
            .map_or(false, |failed_at| now - failed_at < backoff)
    }

    async fn fetch(&self) -> std::result::Result<LeagueInjuries, SourceUnavailable> {
        let timeout = StdDuration::from_secs(self.config.fetch_timeout_secs);
        match tokio::time::timeout(timeout, self.source.fetch_league_injuries()).await {
            Ok(result) => result,
            Err(_) => Err(SourceUnavailable::Timeout(timeout)),
        }
    }

    /// Store the requested team's impact plus any other team in the report
    /// whose entry is missing or expired.
    fn store_league(
        &self,
        team_id: TeamId,
        league: &LeagueInjuries,
        now: DateTime<Utc>,
    ) -> InjuryAdjustment {
        let ttl = self.ttl();
        let report = league.get(&team_id).map(Vec::as_slice).unwrap_or(&[]);
        let requested = self.score(team_id, report, now);
        let adjustment = requested.to_adjustment(AdjustmentSource::Fresh);

        let mut entries = self.entries.write();
        entries.insert(team_id, requested);
        for (other, report) in league {
            if *other == team_id {
                continue;
            }
            let needs_refresh = entries.get(other).map_or(true, |e| !e.is_fresh(now, ttl));
            if needs_refresh {
                entries.insert(*other, self.score(*other, report, now));
            }
        }
        adjustment
    }

    fn score(&self, team_id: TeamId, report: &[InjuryEntry], now: DateTime<Utc>) -> CachedImpact {
        let impact = calculate_impact(report, &self.classifier, &self.config);
        if self.config.log_adjustments && impact.elo_delta != 0.0 {
            info!(
                "Injury adjustment team {}: {:+.1} Elo ({})",
                team_id,
                impact.elo_delta,
                impact.injuries.join(", ")
            );
        }
        CachedImpact {
            team_id,
            elo_delta: impact.elo_delta,
            weighted_severity: impact.weighted_severity,
            injuries: impact.injuries,
            computed_at: now,
        }
    }
}

/// Config seconds as a chrono duration, saturating at [`MAX_WINDOW_SECS`]
fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

#[async_trait]
impl InjuryAdjustmentProvider for InjuryAdjustmentCache {
    async fn adjustment(&self, team_id: TeamId, now: DateTime<Utc>) -> InjuryAdjustment {
        self.get_adjustment(team_id, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injury::InjuryStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LAKERS: TeamId = TeamId(1610612747);
    const CELTICS: TeamId = TeamId(1610612738);

    struct ScriptedSource {
        calls: AtomicUsize,
        report: Option<LeagueInjuries>,
    }

    impl ScriptedSource {
        fn ok(report: LeagueInjuries) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                report: Some(report),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                report: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InjurySource for ScriptedSource {
        async fn fetch_league_injuries(&self) -> std::result::Result<LeagueInjuries, SourceUnavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.report
                .clone()
                .ok_or_else(|| SourceUnavailable::Http("503 Service Unavailable".to_string()))
        }

        fn source_name(&self) -> &str {
            "scripted"
        }
    }

    fn lakers_report() -> LeagueInjuries {
        let mut report = LeagueInjuries::new();
        report.insert(LAKERS, vec![InjuryEntry::new("LeBron James", InjuryStatus::Out)]);
        report.insert(
            CELTICS,
            vec![InjuryEntry::new("Jayson Tatum", InjuryStatus::Questionable)],
        );
        report
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_fresh_fetch_and_hit() {
        let source = ScriptedSource::ok(lakers_report());
        let cache = InjuryAdjustmentCache::new(source.clone(), InjuryConfig::default());

        let first = cache.get_adjustment(LAKERS, now()).await;
        assert_eq!(first.source, AdjustmentSource::Fresh);
        assert_eq!(first.elo_delta, -50.0);
        assert_eq!(source.calls(), 1);

        let second = cache.get_adjustment(LAKERS, now() + Duration::minutes(30)).await;
        assert_eq!(second, first);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_one_fetch_fills_other_teams() {
        let source = ScriptedSource::ok(lakers_report());
        let cache = InjuryAdjustmentCache::new(source.clone(), InjuryConfig::default());

        cache.get_adjustment(LAKERS, now()).await;
        let celtics = cache.get_adjustment(CELTICS, now()).await;
        assert_eq!(celtics.source, AdjustmentSource::Fresh);
        // 0.5 * 2.5 * 20
        assert_eq!(celtics.elo_delta, -25.0);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_last_report_answers_for_unlisted_teams_only() {
        let source = ScriptedSource::ok(lakers_report());
        let cache = InjuryAdjustmentCache::new(source.clone(), InjuryConfig::default());
        cache.insert(CELTICS, TeamInjuryImpact::none(), now() - Duration::hours(3));

        cache.get_adjustment(LAKERS, now()).await;
        assert_eq!(source.calls(), 1);

        let nuggets = cache.get_adjustment(TeamId(1610612743), now() + Duration::hours(1)).await;
        assert_eq!(nuggets.source, AdjustmentSource::Fresh);
        assert_eq!(nuggets.elo_delta, 0.0);
        assert_eq!(nuggets.computed_at, now());
        assert_eq!(source.calls(), 1);

        // Listed in the report but its kept entry has since expired
        let celtics = cache.get_adjustment(CELTICS, now() + Duration::hours(2)).await;
        assert_eq!(celtics.elo_delta, -25.0);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_healthy_team_gets_zero() {
        let source = ScriptedSource::ok(lakers_report());
        let cache = InjuryAdjustmentCache::new(source, InjuryConfig::default());
        let nuggets = cache.get_adjustment(TeamId(1610612743), now()).await;
        assert_eq!(nuggets.source, AdjustmentSource::Fresh);
        assert_eq!(nuggets.elo_delta, 0.0);
        assert!(nuggets.injuries.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_without_prior_entry() {
        let source = ScriptedSource::failing();
        let cache = InjuryAdjustmentCache::new(source.clone(), InjuryConfig::default());
        let adj = cache.get_adjustment(LAKERS, now()).await;
        assert_eq!(adj.source, AdjustmentSource::Unavailable);
        assert_eq!(adj.elo_delta, 0.0);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_on_failure_and_backoff() {
        let source = ScriptedSource::failing();
        let cache = InjuryAdjustmentCache::new(source.clone(), InjuryConfig::default());
        let computed_at = now() - Duration::hours(5);
        cache.insert(
            LAKERS,
            TeamInjuryImpact {
                elo_delta: -50.0,
                weighted_severity: 2.5,
                injuries: vec!["LeBron James (Out)".to_string()],
            },
            computed_at,
        );

        let adj = cache.get_adjustment(LAKERS, now()).await;
        assert_eq!(adj.source, AdjustmentSource::Stale);
        assert_eq!(adj.elo_delta, -50.0);
        assert_eq!(adj.computed_at, computed_at);
        assert_eq!(source.calls(), 1);

        // Inside the backoff window no new fetch goes out
        let again = cache.get_adjustment(LAKERS, now() + Duration::seconds(30)).await;
        assert_eq!(again.source, AdjustmentSource::Stale);
        assert_eq!(source.calls(), 1);

        cache.get_adjustment(LAKERS, now() + Duration::seconds(61)).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_never_fetches() {
        let source = ScriptedSource::ok(lakers_report());
        let config = InjuryConfig {
            enabled: false,
            ..InjuryConfig::default()
        };
        let cache = InjuryAdjustmentCache::new(source.clone(), config);
        let adj = cache.get_adjustment(LAKERS, now()).await;
        assert_eq!(adj.source, AdjustmentSource::Disabled);
        assert_eq!(adj.elo_delta, 0.0);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_injury_adjustments_provider() {
        let adj = NoInjuryAdjustments.adjustment(LAKERS, now()).await;
        assert_eq!(adj.source, AdjustmentSource::Disabled);
        assert_eq!(adj.elo_delta, 0.0);
    }

    #[tokio::test]
    async fn test_oversized_windows_saturate() {
        let source = ScriptedSource::failing();
        let config = InjuryConfig {
            ttl_secs: u64::MAX,
            retry_backoff_secs: u64::MAX,
            ..InjuryConfig::default()
        };
        let cache = InjuryAdjustmentCache::new(source.clone(), config);
        cache.insert(LAKERS, TeamInjuryImpact::none(), now() - Duration::days(365));

        let adj = cache.get_adjustment(LAKERS, now()).await;
        assert_eq!(adj.source, AdjustmentSource::Fresh);
        assert_eq!(cache.stats(now()).fresh_entries, 1);

        let celtics = cache.get_adjustment(CELTICS, now()).await;
        assert_eq!(celtics.source, AdjustmentSource::Unavailable);
        cache.get_adjustment(CELTICS, now() + Duration::days(30)).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_stats_and_clear_expired() {
        let cache = InjuryAdjustmentCache::new(ScriptedSource::failing(), InjuryConfig::default());
        cache.insert(LAKERS, TeamInjuryImpact::none(), now());
        cache.insert(CELTICS, TeamInjuryImpact::none(), now() - Duration::hours(6));

        let stats = cache.stats(now());
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.fresh_entries, 1);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.average_age_secs, 3.0 * 3600.0);

        assert_eq!(cache.clear_expired(now()), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.clear(LAKERS));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_round_trip_keeps_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let config = InjuryConfig {
            persist: true,
            cache_file: dir.path().join("cache").join("injuries.json"),
            ..InjuryConfig::default()
        };

        let cache = InjuryAdjustmentCache::new(ScriptedSource::ok(lakers_report()), config.clone());
        cache.get_adjustment(LAKERS, now() - Duration::hours(8)).await;
        assert!(config.cache_file.exists());

        let reloaded = InjuryAdjustmentCache::new(ScriptedSource::failing(), config);
        assert_eq!(reloaded.len(), 2);
        let adj = reloaded.get_adjustment(LAKERS, now()).await;
        assert_eq!(adj.source, AdjustmentSource::Stale);
        assert_eq!(adj.elo_delta, -50.0);
    }
}
