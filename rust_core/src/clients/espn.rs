//! ESPN public API client: NBA scoreboard and league injury report.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::circuit_breaker::{FeedBreaker, FeedBreakerConfig, FeedCircuitState};
use crate::features::Moneylines;
use crate::injury::{InjuryEntry, InjurySource, InjuryStatus, LeagueInjuries, SourceUnavailable};
use crate::teams::TeamDirectory;
use crate::types::{GameResult, TeamId};

pub const ESPN_NBA_BASE_URL: &str = "https://site.api.espn.com/apis/site/v2/sports/basketball/nba";

#[derive(Clone)]
pub struct EspnClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    directory: TeamDirectory,
    scoreboard_breaker: Arc<FeedBreaker>,
    injury_breaker: Arc<FeedBreaker>,
}

impl std::fmt::Debug for EspnClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EspnClient")
            .field("base_url", &self.base_url)
            .field("scoreboard_breaker", &self.scoreboard_breaker.state())
            .field("injury_breaker", &self.injury_breaker.state())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    /// Postponed or canceled
    Off,
}

impl GameStatus {
    fn from_espn(type_name: &str, completed: bool) -> Self {
        match type_name {
            "STATUS_FINAL" | "STATUS_FINAL_OT" => GameStatus::Final,
            "STATUS_SCHEDULED" => GameStatus::Scheduled,
            "STATUS_POSTPONED" | "STATUS_CANCELED" | "STATUS_SUSPENDED" => GameStatus::Off,
            _ if completed => GameStatus::Final,
            _ => GameStatus::InProgress,
        }
    }
}

/// One event on the scoreboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreboardGame {
    pub espn_id: String,
    /// Scoreboard date the game was listed under (US calendar day)
    pub date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub home_team: String,
    pub away_team: String,
    pub home_id: Option<TeamId>,
    pub away_id: Option<TeamId>,
    pub home_score: u16,
    pub away_score: u16,
    pub status: GameStatus,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
}

impl ScoreboardGame {
    /// Completed game with both teams mapped
    pub fn to_result(&self) -> Option<GameResult> {
        if self.status != GameStatus::Final {
            return None;
        }
        Some(GameResult::new(
            self.home_id?,
            self.away_id?,
            self.home_score,
            self.away_score,
            self.date,
        ))
    }

    pub fn moneylines(&self) -> Moneylines {
        Moneylines {
            home: self.home_moneyline,
            away: self.away_moneyline,
        }
    }
}

impl Default for EspnClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EspnClient {
    pub fn new() -> Self {
        Self::with_config(Duration::from_secs(10), FeedBreakerConfig::default())
    }

    /// Create with a custom request timeout and breaker configuration
    pub fn with_config(timeout: Duration, breaker: FeedBreakerConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: ESPN_NBA_BASE_URL.to_string(),
            timeout,
            directory: TeamDirectory::nba(),
            scoreboard_breaker: Arc::new(FeedBreaker::new("espn_scoreboard", breaker.clone())),
            injury_breaker: Arc::new(FeedBreaker::new("espn_injuries", breaker)),
        }
    }

    /// Point at a different host (mirrors, local fixtures)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn scoreboard_state(&self) -> FeedCircuitState {
        self.scoreboard_breaker.state()
    }

    pub fn injury_state(&self) -> FeedCircuitState {
        self.injury_breaker.state()
    }

    pub fn reset_circuit_breakers(&self) {
        self.scoreboard_breaker.reset();
        self.injury_breaker.reset();
    }

    /// All games listed for `date`
    pub async fn get_scoreboard(&self, date: NaiveDate) -> Result<Vec<ScoreboardGame>> {
        if !self.scoreboard_breaker.allow_request() {
            return Err(anyhow!("ESPN scoreboard circuit breaker is open (date={})", date));
        }

        let result = self.fetch_scoreboard_internal(date).await;
        match &result {
            Ok(_) => self.scoreboard_breaker.record_success(),
            Err(_) => self.scoreboard_breaker.record_failure(),
        }
        result
    }

    /// Final games for `date` with both teams mapped to NBA ids
    pub async fn completed_games(&self, date: NaiveDate) -> Result<Vec<GameResult>> {
        Ok(self
            .get_scoreboard(date)
            .await?
            .iter()
            .filter_map(ScoreboardGame::to_result)
            .collect())
    }

    /// Games for `date` that have not started
    pub async fn scheduled_games(&self, date: NaiveDate) -> Result<Vec<ScoreboardGame>> {
        Ok(self
            .get_scoreboard(date)
            .await?
            .into_iter()
            .filter(|g| g.status == GameStatus::Scheduled)
            .collect())
    }

    async fn fetch_scoreboard_internal(&self, date: NaiveDate) -> Result<Vec<ScoreboardGame>> {
        let url = format!("{}/scoreboard", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("dates", date.format("%Y%m%d").to_string())])
            .send()
            .await
            .with_context(|| format!("ESPN scoreboard request failed for {}", date))?
            .error_for_status()?;
        let data: Value = resp.json().await.context("ESPN scoreboard body")?;
        Ok(parse_scoreboard(&data, date, &self.directory))
    }

    async fn fetch_injuries_internal(&self) -> std::result::Result<LeagueInjuries, SourceUnavailable> {
        let url = format!("{}/injuries", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceUnavailable::Timeout(self.timeout)
            } else {
                SourceUnavailable::Http(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceUnavailable::Http(format!("HTTP {}", status)));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| SourceUnavailable::Malformed(e.to_string()))?;
        parse_injury_report(&data, &self.directory)
    }
}

#[async_trait]
impl InjurySource for EspnClient {
    async fn fetch_league_injuries(&self) -> std::result::Result<LeagueInjuries, SourceUnavailable> {
        if !self.injury_breaker.allow_request() {
            return Err(SourceUnavailable::CircuitOpen);
        }

        let result = self.fetch_injuries_internal().await;
        match &result {
            Ok(report) => {
                debug!("ESPN injury report covers {} teams", report.len());
                self.injury_breaker.record_success();
            }
            Err(_) => self.injury_breaker.record_failure(),
        }
        result
    }

    fn source_name(&self) -> &str {
        "espn"
    }
}

/// Parse a scoreboard payload. Events that cannot be read are skipped.
pub fn parse_scoreboard(data: &Value, date: NaiveDate, directory: &TeamDirectory) -> Vec<ScoreboardGame> {
    let mut games = Vec::new();

    let Some(events) = data["events"].as_array() else {
        return games;
    };

    for event in events {
        let competition = &event["competitions"][0];
        let Some(competitors) = competition["competitors"].as_array() else {
            continue;
        };
        if competitors.len() < 2 {
            continue;
        }

        let mut home_team = String::new();
        let mut away_team = String::new();
        let mut home_score: u16 = 0;
        let mut away_score: u16 = 0;

        for comp in competitors {
            let team_name = comp["team"]["displayName"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let score = comp["score"]
                .as_str()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(0);

            if comp["homeAway"].as_str() == Some("home") {
                home_team = team_name;
                home_score = score;
            } else {
                away_team = team_name;
                away_score = score;
            }
        }

        let home_id = directory.resolve(&home_team);
        let away_id = directory.resolve(&away_team);
        if home_id.is_none() || away_id.is_none() {
            warn!("Unmapped ESPN teams in event: {} @ {}", away_team, home_team);
        }

        let status_type = &event["status"]["type"];
        let status = GameStatus::from_espn(
            status_type["name"].as_str().unwrap_or("STATUS_SCHEDULED"),
            status_type["completed"].as_bool().unwrap_or(false),
        );

        let start_time = event["date"].as_str().and_then(parse_espn_timestamp);

        let odds = &competition["odds"][0];
        games.push(ScoreboardGame {
            espn_id: event["id"].as_str().unwrap_or_default().to_string(),
            date,
            start_time,
            home_team,
            away_team,
            home_id,
            away_id,
            home_score,
            away_score,
            status,
            home_moneyline: odds["homeTeamOdds"]["moneyLine"].as_f64(),
            away_moneyline: odds["awayTeamOdds"]["moneyLine"].as_f64(),
        });
    }

    games
}

/// Parse the league injury payload:
/// `{"injuries": [{"displayName": team, "injuries": [{athlete, status, details}]}]}`
pub fn parse_injury_report(
    data: &Value,
    directory: &TeamDirectory,
) -> std::result::Result<LeagueInjuries, SourceUnavailable> {
    let teams = data["injuries"]
        .as_array()
        .ok_or_else(|| SourceUnavailable::Malformed("missing `injuries` array".to_string()))?;

    let mut report = LeagueInjuries::new();
    for team in teams {
        let team_name = team["displayName"].as_str().unwrap_or_default();
        let Some(team_id) = directory.resolve(team_name) else {
            warn!("Skipping injuries for unmapped team '{}'", team_name);
            continue;
        };

        let entries = report.entry(team_id).or_insert_with(Vec::new);
        for item in team["injuries"].as_array().into_iter().flatten() {
            let player = item["athlete"]["displayName"].as_str().unwrap_or_default();
            let raw_status = item["status"].as_str().unwrap_or_default();
            if player.is_empty() {
                continue;
            }
            let Some(status) = InjuryStatus::parse(raw_status) else {
                debug!("Ignoring {} with status '{}'", player, raw_status);
                continue;
            };

            let mut entry = InjuryEntry::new(player, status);
            if let Some(kind) = item["details"]["type"].as_str() {
                entry = entry.with_injury_type(kind);
            }
            entries.push(entry);
        }
    }

    Ok(report)
}

/// ESPN timestamps come as "2025-01-15T00:30Z" (no seconds) or full RFC 3339.
fn parse_espn_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let minutes_only = raw.strip_suffix('Z')?;
    NaiveDateTime::parse_from_str(minutes_only, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 14).unwrap()
    }

    fn scoreboard_fixture() -> Value {
        json!({
            "events": [
                {
                    "id": "401705100",
                    "date": "2025-01-15T00:30Z",
                    "status": {"type": {"name": "STATUS_FINAL", "completed": true}},
                    "competitions": [{
                        "competitors": [
                            {"homeAway": "home", "score": "117", "team": {"displayName": "Boston Celtics"}},
                            {"homeAway": "away", "score": "104", "team": {"displayName": "LA Clippers"}}
                        ]
                    }]
                },
                {
                    "id": "401705101",
                    "date": "2025-01-15T03:00Z",
                    "status": {"type": {"name": "STATUS_SCHEDULED", "completed": false}},
                    "competitions": [{
                        "competitors": [
                            {"homeAway": "home", "score": "0", "team": {"displayName": "Los Angeles Lakers"}},
                            {"homeAway": "away", "score": "0", "team": {"displayName": "Denver Nuggets"}}
                        ],
                        "odds": [{
                            "homeTeamOdds": {"moneyLine": 135},
                            "awayTeamOdds": {"moneyLine": -155}
                        }]
                    }]
                },
                {
                    "id": "broken",
                    "competitions": [{"competitors": []}]
                }
            ]
        })
    }

    #[test]
    fn test_parse_scoreboard() {
        let games = parse_scoreboard(&scoreboard_fixture(), date(), &TeamDirectory::nba());
        assert_eq!(games.len(), 2);

        let final_game = &games[0];
        assert_eq!(final_game.status, GameStatus::Final);
        assert_eq!(final_game.home_id, Some(TeamId(1610612738)));
        assert_eq!(final_game.away_id, Some(TeamId(1610612746)));
        assert!(final_game.start_time.is_some());

        let result = final_game.to_result().unwrap();
        assert_eq!(result.home_score, 117);
        assert_eq!(result.away_score, 104);
        assert_eq!(result.date, date());

        let upcoming = &games[1];
        assert_eq!(upcoming.status, GameStatus::Scheduled);
        assert!(upcoming.to_result().is_none());
        assert_eq!(upcoming.home_moneyline, Some(135.0));
        assert_eq!(upcoming.moneylines().away, Some(-155.0));
    }

    #[test]
    fn test_parse_scoreboard_without_events() {
        let games = parse_scoreboard(&json!({}), date(), &TeamDirectory::nba());
        assert!(games.is_empty());
    }

    #[test]
    fn test_parse_injury_report() {
        let payload = json!({
            "injuries": [
                {
                    "displayName": "Los Angeles Lakers",
                    "injuries": [
                        {"athlete": {"displayName": "LeBron James"}, "status": "Out", "details": {"type": "Ankle"}},
                        {"athlete": {"displayName": "Role Player"}, "status": "Day-To-Day"},
                        {"athlete": {"displayName": "Healthy Guy"}, "status": "Probable"}
                    ]
                },
                {
                    "displayName": "Seattle SuperSonics",
                    "injuries": [{"athlete": {"displayName": "Nobody"}, "status": "Out"}]
                },
                {"displayName": "Denver Nuggets", "injuries": []}
            ]
        });

        let report = parse_injury_report(&payload, &TeamDirectory::nba()).unwrap();
        assert_eq!(report.len(), 2);

        let lakers = &report[&TeamId(1610612747)];
        assert_eq!(lakers.len(), 2);
        assert_eq!(lakers[0].status, InjuryStatus::Out);
        assert_eq!(lakers[0].injury_type.as_deref(), Some("Ankle"));
        assert_eq!(lakers[1].status, InjuryStatus::DayToDay);

        assert!(report[&TeamId(1610612743)].is_empty());
    }

    #[test]
    fn test_parse_injury_report_rejects_bad_shape() {
        let err = parse_injury_report(&json!({"teams": []}), &TeamDirectory::nba()).unwrap_err();
        assert!(matches!(err, SourceUnavailable::Malformed(_)));
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_espn_timestamp("2025-01-15T00:30Z").is_some());
        assert!(parse_espn_timestamp("2025-01-15T00:30:00Z").is_some());
        assert!(parse_espn_timestamp("not a date").is_none());
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits_injury_fetch() {
        let client = EspnClient::with_config(
            Duration::from_millis(200),
            FeedBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        )
        .with_base_url("http://127.0.0.1:9");

        let first = client.fetch_league_injuries().await;
        assert!(first.is_err());
        assert_eq!(client.injury_state(), FeedCircuitState::Open);

        let second = client.fetch_league_injuries().await;
        assert_eq!(second.unwrap_err(), SourceUnavailable::CircuitOpen);
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_live_scoreboard_and_injuries() {
        let client = EspnClient::new();
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let games = client.get_scoreboard(date).await.unwrap();
        assert!(!games.is_empty());
        assert!(games.iter().all(|g| g.date == date));

        let report = client.fetch_league_injuries().await.unwrap();
        assert!(report.keys().all(|id| TeamDirectory::nba().team(*id).is_some()));
    }
}
