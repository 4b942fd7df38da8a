// # File History Store
//
// File-based implementation of HistoryStore with crash recovery.
//
// ## Purpose
//
// Keeps transition history across daemon restarts so the first cycle after a
// restart compares against what was seen before it, instead of recording
// every key silently again.
//
// ## Write Strategy
//
// - Appends only mark the store dirty
// - `flush()` writes the whole file; the monitor calls it at the end of every
//   cycle and on shutdown
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "rules": {
//     "rule-1": {
//       "locations": {
//         "gra1": [
//           { "location": "gra1", "status": "available", "timestamp": "2025-01-09T12:00:00Z" }
//         ]
//       },
//       "last_notification": "2025-01-09T12:00:00Z"
//     },
//     "rule-2": {
//       "locations": {
//         "24sk10/gra1": [
//           { "location": "gra1", "status": "unavailable", "timestamp": "2025-01-09T12:00:00Z" }
//         ]
//       }
//     }
//   }
// }
// ```
//
// Keys of `locations` are history keys (see `WatchRule::history_key`): the
// plain location name for rules pinned to one identifier, otherwise
// `<identifier>/<location>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::history::{RuleHistory, TransitionRecord};
use crate::traits::{HistoryStore, HistoryStoreFactory};

/// History file format version
const HISTORY_FILE_VERSION: &str = "1.0";

/// File-based history store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use stockwatch_core::state::FileHistoryStore;
/// use stockwatch_core::{HistoryStore, TransitionRecord};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileHistoryStore::new("/var/lib/stockwatch/history.json").await?;
///
///     store
///         .append("rule-1", "gra1", TransitionRecord::new("gra1", "available", chrono::Utc::now()))
///         .await?;
///
///     // Nothing is on disk until the store is flushed
///     store.flush().await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileHistoryStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    rules: HashMap<String, RuleHistory>,
    dirty: bool,
}

/// Serializable history file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct HistoryFileFormat {
    version: String,
    #[serde(default)]
    rules: HashMap<String, RuleHistory>,
}

impl FileHistoryStore {
    /// Create or load a file history store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing history file
    /// 3. If it is corrupted, try to load from backup
    /// 4. If both fail, start with empty history
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create history directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let rules = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                rules,
                dirty: false,
            })),
        })
    }

    /// Load history with automatic recovery
    ///
    /// Only parse failures trigger recovery; read failures are returned.
    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, RuleHistory>, Error> {
        let parse_error = match Self::load(path).await {
            Ok(rules) => {
                tracing::debug!("Loaded history from file: {} rules", rules.len());
                return Ok(rules);
            }
            Err(Error::Json(e)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "History file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            parse_error
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty history.");
            return Ok(HashMap::new());
        }

        match Self::load(&backup_path).await {
            Ok(rules) => {
                tracing::info!("Recovered history from backup: {} rules", rules.len());
                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore history file from backup: {}", e);
                }
                Ok(rules)
            }
            Err(e) => {
                tracing::error!("Backup also unreadable: {}. Starting with empty history.", e);
                Ok(HashMap::new())
            }
        }
    }

    async fn load(path: &Path) -> Result<HashMap<String, RuleHistory>, Error> {
        if !path.exists() {
            tracing::debug!("History file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::history_store(format!(
                "Failed to read history file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: HistoryFileFormat = serde_json::from_str(&content)?;

        if file.version != HISTORY_FILE_VERSION {
            tracing::warn!(
                "History file version mismatch: expected {}, got {}. Attempting to load anyway.",
                HISTORY_FILE_VERSION,
                file.version
            );
        }

        Ok(file.rules)
    }

    /// Write history to file atomically
    async fn write(&self) -> Result<(), Error> {
        // Hold the write lock across the write so appends cannot slip in
        // between serialization and clearing the dirty flag
        let mut state = self.state.write().await;

        let file = HistoryFileFormat {
            version: HISTORY_FILE_VERSION.to_string(),
            rules: state.rules.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::history_store(format!("Failed to serialize history: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::history_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::history_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.flush().await.map_err(|e| {
                Error::history_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create history backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::history_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state.dirty = false;
        tracing::trace!("History written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Path of the history file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force an immediate write, dirty or not
    pub async fn sync(&self) -> Result<(), Error> {
        self.write().await
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn last_transition(
        &self,
        rule_id: &str,
        key: &str,
    ) -> Result<Option<TransitionRecord>, Error> {
        let state = self.state.read().await;
        Ok(state
            .rules
            .get(rule_id)
            .and_then(|history| history.last(key))
            .cloned())
    }

    async fn history(&self, rule_id: &str, key: &str) -> Result<Vec<TransitionRecord>, Error> {
        let state = self.state.read().await;
        Ok(state
            .rules
            .get(rule_id)
            .and_then(|history| history.locations.get(key))
            .map(|log| log.to_vec())
            .unwrap_or_default())
    }

    async fn append(
        &self,
        rule_id: &str,
        key: &str,
        record: TransitionRecord,
    ) -> Result<bool, Error> {
        let mut state = self.state.write().await;
        let stored = state
            .rules
            .entry(rule_id.to_string())
            .or_default()
            .record(key, record);
        if stored {
            state.dirty = true;
        }
        Ok(stored)
    }

    async fn rule_history(&self, rule_id: &str) -> Result<Option<RuleHistory>, Error> {
        let state = self.state.read().await;
        Ok(state.rules.get(rule_id).cloned())
    }

    async fn set_last_notification(&self, rule_id: &str, at: DateTime<Utc>) -> Result<(), Error> {
        let mut state = self.state.write().await;
        state.rules.entry(rule_id.to_string()).or_default().last_notification = Some(at);
        state.dirty = true;
        Ok(())
    }

    async fn seed(&self, rule_id: &str, history: RuleHistory) -> Result<bool, Error> {
        let mut state = self.state.write().await;
        if state.rules.contains_key(rule_id) {
            return Ok(false);
        }
        state.rules.insert(rule_id.to_string(), history);
        state.dirty = true;
        Ok(true)
    }

    async fn remove_rule(&self, rule_id: &str) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.rules.remove(rule_id).is_some() {
            state.dirty = true;
        }
        Ok(())
    }

    async fn list_rules(&self) -> Result<Vec<String>, Error> {
        let state = self.state.read().await;
        Ok(state.rules.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write().await } else { Ok(()) }
    }
}

/// Factory for `{"type": "file", "path": "..."}`
pub struct FileHistoryStoreFactory;

#[async_trait]
impl HistoryStoreFactory for FileHistoryStoreFactory {
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn HistoryStore>, Error> {
        let path = config
            .get("path")
            .and_then(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::config("File history store requires a non-empty 'path'"))?;

        Ok(Box::new(FileHistoryStore::new(path).await?))
    }
}
