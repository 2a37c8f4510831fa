//! Local persistence collaborator.
//!
//! Remembers the last-selected agenda date and the last-selected dropdown
//! filter values across sessions. The session takes an injected
//! `Arc<dyn LocalStore>` instead of reaching for process-wide globals.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::types::ActiveFilter;

/// Values that survive between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dropdown_filter: ActiveFilter,
}

pub trait LocalStore: Send + Sync {
    fn active_date(&self) -> Option<DateTime<Utc>>;
    fn set_active_date(&self, date: DateTime<Utc>) -> Result<(), FeedError>;
    fn dropdown_filter(&self) -> ActiveFilter;
    fn set_dropdown_filter(&self, filter: &ActiveFilter) -> Result<(), FeedError>;
}

/// In-process store. Nothing outlives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<PersistedState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl LocalStore for MemoryStore {
    fn active_date(&self) -> Option<DateTime<Utc>> {
        self.state.lock().active_date
    }

    fn set_active_date(&self, date: DateTime<Utc>) -> Result<(), FeedError> {
        self.state.lock().active_date = Some(date);
        Ok(())
    }

    fn dropdown_filter(&self) -> ActiveFilter {
        self.state.lock().dropdown_filter.clone()
    }

    fn set_dropdown_filter(&self, filter: &ActiveFilter) -> Result<(), FeedError> {
        self.state.lock().dropdown_filter = filter.clone();
        Ok(())
    }
}

/// JSON file store, read once at open and rewritten on every set.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file starts empty; a corrupt one
    /// is logged and ignored so a bad file never blocks startup.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match load_state(&path) {
            Ok(state) => state,
            Err(e) => {
                log::warn!(
                    "Failed to read local state at {}: {}. Starting empty.",
                    path.display(),
                    e
                );
                PersistedState::default()
            }
        };
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, state: &PersistedState) -> Result<(), FeedError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl LocalStore for JsonFileStore {
    fn active_date(&self) -> Option<DateTime<Utc>> {
        self.state.lock().active_date
    }

    fn set_active_date(&self, date: DateTime<Utc>) -> Result<(), FeedError> {
        let mut guard = self.state.lock();
        guard.active_date = Some(date);
        self.save(&guard)
    }

    fn dropdown_filter(&self) -> ActiveFilter {
        self.state.lock().dropdown_filter.clone()
    }

    fn set_dropdown_filter(&self, filter: &ActiveFilter) -> Result<(), FeedError> {
        let mut guard = self.state.lock();
        guard.dropdown_filter = filter.clone();
        self.save(&guard)
    }
}

fn load_state(path: &Path) -> Result<PersistedState, FeedError> {
    if !path.exists() {
        return Ok(PersistedState::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Default location of the local state file (~/.wirefeed/local_state.json)
pub fn default_state_path() -> Result<PathBuf, FeedError> {
    let home = dirs::home_dir()
        .ok_or_else(|| FeedError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".wirefeed").join("local_state.json"))
}
