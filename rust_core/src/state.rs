//! On-disk pipeline state.
//!
//! Layout under the state directory:
//! - `state.json`: `{"<team_id>": {rating, last_updated, season, history}}`
//! - `metadata.json`: ingestion checkpoint plus bookkeeping
//!
//! Saves copy the previous files to `*.bak` and replace each file through a
//! temp-file rename, so a crash mid-save leaves either the old or the new
//! state, never a truncated one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{EloConfig, FormConfig};
use crate::elo::{RatingStore, TeamRating};
use crate::error::{PipelineError, Result};
use crate::form::{FormEntry, FormWindow};
use crate::ingest::IngestCheckpoint;
use crate::types::TeamId;

pub const STATE_VERSION: &str = "1.0";

const STATE_FILE: &str = "state.json";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TeamRecord {
    rating: f64,
    #[serde(default)]
    last_updated: Option<NaiveDate>,
    #[serde(default)]
    season: Option<i32>,
    #[serde(default)]
    history: Vec<FormEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    #[serde(flatten)]
    pub checkpoint: IngestCheckpoint,
    pub last_updated: Option<DateTime<Utc>>,
    pub version: String,
}

impl Default for StateMetadata {
    fn default() -> Self {
        Self {
            checkpoint: IngestCheckpoint::default(),
            last_updated: None,
            version: STATE_VERSION.to_string(),
        }
    }
}

/// Stores rebuilt from disk
pub struct LoadedState {
    pub ratings: RatingStore,
    pub form: FormWindow,
    pub metadata: StateMetadata,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    /// Load stores from disk; missing files yield empty stores.
    pub fn load(&self, elo: EloConfig, form: FormConfig) -> Result<LoadedState> {
        let records: BTreeMap<String, TeamRecord> = match read_json(&self.state_path())? {
            Some(records) => records,
            None => {
                info!("No state at {:?}, starting fresh", self.dir);
                BTreeMap::new()
            }
        };

        let mut ratings = Vec::with_capacity(records.len());
        let mut histories = Vec::with_capacity(records.len());
        for (key, record) in records {
            let team_id = key.parse::<u32>().map(TeamId).map_err(|_| {
                PipelineError::CorruptState(format!("non-numeric team id '{}'", key))
            })?;
            ratings.push(TeamRating {
                team_id,
                rating: record.rating,
                last_updated: record.last_updated,
                season: record.season,
            });
            histories.push((team_id, record.history));
        }

        let metadata = read_json(&self.metadata_path())?.unwrap_or_default();

        info!("Loaded state for {} teams from {:?}", ratings.len(), self.dir);
        Ok(LoadedState {
            ratings: RatingStore::from_ratings(elo, ratings),
            form: FormWindow::from_history(form, histories),
            metadata,
        })
    }

    /// Persist ratings, form histories and the ingestion checkpoint.
    pub fn save(&self, ratings: &RatingStore, form: &FormWindow, checkpoint: IngestCheckpoint) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let mut histories: BTreeMap<TeamId, Vec<FormEntry>> = form.snapshot().into_iter().collect();
        let mut records: BTreeMap<String, TeamRecord> = BTreeMap::new();
        for rating in ratings.snapshot() {
            records.insert(
                rating.team_id.to_string(),
                TeamRecord {
                    rating: rating.rating,
                    last_updated: rating.last_updated,
                    season: rating.season,
                    history: histories.remove(&rating.team_id).unwrap_or_default(),
                },
            );
        }
        // Form without a rating should not happen, but never drop history
        for (team_id, history) in histories {
            records.insert(
                team_id.to_string(),
                TeamRecord {
                    rating: ratings.get_rating(team_id),
                    last_updated: None,
                    season: None,
                    history,
                },
            );
        }

        let metadata = StateMetadata {
            checkpoint,
            last_updated: Some(Utc::now()),
            version: STATE_VERSION.to_string(),
        };

        write_atomic(&self.state_path(), &serde_json::to_string_pretty(&records)?)?;
        write_atomic(&self.metadata_path(), &serde_json::to_string_pretty(&metadata)?)?;
        info!("Saved state for {} teams to {:?}", records.len(), self.dir);
        Ok(())
    }

    /// Put the `.bak` copies back. Returns false when there is no backup.
    pub fn restore_backup(&self) -> Result<bool> {
        let state_bak = backup_path(&self.state_path());
        if !state_bak.exists() {
            warn!("No state backup in {:?}", self.dir);
            return Ok(false);
        }
        fs::copy(&state_bak, self.state_path())?;

        let metadata_bak = backup_path(&self.metadata_path());
        if metadata_bak.exists() {
            fs::copy(&metadata_bak, self.metadata_path())?;
        }
        info!("Restored state from backup in {:?}", self.dir);
        Ok(true)
    }
}

fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("json.bak")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        fs::copy(path, backup_path(path))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::GameIngestor;
    use crate::types::GameResult;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn populated() -> (Arc<RatingStore>, Arc<FormWindow>, GameIngestor) {
        let ratings = Arc::new(RatingStore::default());
        let form = Arc::new(FormWindow::default());
        let ingestor = GameIngestor::new(ratings.clone(), form.clone());
        ingestor.process_games(&[
            GameResult::new(TeamId(1610612747), TeamId(1610612738), 112, 108, day(3)),
            GameResult::new(TeamId(1610612738), TeamId(1610612743), 99, 104, day(5)),
        ]);
        (ratings, form, ingestor)
    }

    #[test]
    fn test_missing_state_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(!store.exists());
        let loaded = store.load(EloConfig::default(), FormConfig::default()).unwrap();
        assert!(loaded.ratings.is_empty());
        assert_eq!(loaded.form.team_count(), 0);
        assert_eq!(loaded.metadata, StateMetadata::default());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state"));
        let (ratings, form, ingestor) = populated();

        store.save(&ratings, &form, ingestor.checkpoint()).unwrap();
        assert!(store.exists());

        let loaded = store.load(EloConfig::default(), FormConfig::default()).unwrap();
        assert_eq!(loaded.ratings.snapshot(), ratings.snapshot());
        assert_eq!(loaded.form.snapshot(), form.snapshot());
        assert_eq!(loaded.metadata.checkpoint, ingestor.checkpoint());
        assert_eq!(loaded.metadata.checkpoint.games_processed_total, 2);
        assert_eq!(loaded.metadata.version, STATE_VERSION);
        assert!(loaded.metadata.last_updated.is_some());
    }

    #[test]
    fn test_state_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let (ratings, form, ingestor) = populated();
        store.save(&ratings, &form, ingestor.checkpoint()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("state.json")).unwrap()).unwrap();
        let lakers = &raw["1610612747"];
        assert!(lakers["rating"].as_f64().unwrap() > 1500.0);
        assert_eq!(lakers["season"], 2024);
        assert_eq!(lakers["history"].as_array().unwrap().len(), 1);

        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("metadata.json")).unwrap()).unwrap();
        assert_eq!(meta["last_processed_date"], "2025-01-05");
        assert_eq!(meta["games_processed_total"], 2);
    }

    #[test]
    fn test_backup_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(!store.restore_backup().unwrap());

        let (ratings, form, ingestor) = populated();
        store.save(&ratings, &form, ingestor.checkpoint()).unwrap();
        let first = ratings.snapshot();

        ingestor.process_game(&GameResult::new(TeamId(1610612743), TeamId(1610612747), 130, 90, day(8))).unwrap();
        store.save(&ratings, &form, ingestor.checkpoint()).unwrap();

        assert!(store.restore_backup().unwrap());
        let restored = store.load(EloConfig::default(), FormConfig::default()).unwrap();
        assert_eq!(restored.ratings.snapshot(), first);
        assert_eq!(restored.metadata.checkpoint.games_processed_total, 2);
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("state.json"), "{not json").unwrap();
        let store = StateStore::new(dir.path());
        let result = store.load(EloConfig::default(), FormConfig::default());
        assert!(matches!(result, Err(PipelineError::Json(_))));
    }

    #[test]
    fn test_team_key_must_be_numeric() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("state.json"), r#"{"lakers": {"rating": 1500.0}}"#).unwrap();
        let store = StateStore::new(dir.path());
        match store.load(EloConfig::default(), FormConfig::default()) {
            Err(PipelineError::CorruptState(msg)) => assert!(msg.contains("lakers")),
            other => panic!("expected CorruptState, got {:?}", other.map(|_| ())),
        }
    }
}
