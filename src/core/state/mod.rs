use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_STATE_FILE: &str = "dozer.state";

/// Poll cursor and in-flight set carried across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollState {
    #[serde(default)]
    pub last_poll_process_id: i64,
    #[serde(default)]
    pub last_poll_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub executing_processes: Vec<i64>,
}

impl PollState {
    /// Starts tracking `id`; an id is tracked at most once.
    pub fn track(&mut self, id: i64) -> bool {
        if self.executing_processes.contains(&id) {
            return false;
        }
        self.executing_processes.push(id);
        true
    }

    /// Stops tracking `id`. Returns false if it was not tracked.
    pub fn untrack(&mut self, id: i64) -> bool {
        let before = self.executing_processes.len();
        self.executing_processes.retain(|&p| p != id);
        self.executing_processes.len() != before
    }

    /// Drops repeated in-flight ids, keeping the first occurrence of each.
    pub fn dedupe_in_flight(&mut self) -> usize {
        let before = self.executing_processes.len();
        let mut seen = HashSet::with_capacity(before);
        self.executing_processes.retain(|&id| seen.insert(id));
        before - self.executing_processes.len()
    }

    /// Moves the cursor forward; it never moves back.
    pub fn advance_cursor(&mut self, id: i64) {
        if id > self.last_poll_process_id {
            self.last_poll_process_id = id;
        }
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no saved state at {0}")]
    Missing(PathBuf),
    #[error("saved state at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("state file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// JSON file holding a [`PollState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<PollState, StateError> {
        let data = std::fs::read(&self.path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StateError::Missing(self.path.clone())
            } else {
                StateError::Io {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        let mut state: PollState =
            serde_json::from_slice(&data).map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        // older deployments could record the same in-flight id twice
        let dropped = state.dedupe_in_flight();
        if dropped > 0 {
            warn!(
                "Dropped {} repeated in-flight id(s) from {}",
                dropped,
                self.path.display()
            );
        }
        Ok(state)
    }

    /// Overwrites the state file. The new content lands in a sibling file
    /// first and is renamed over the old one.
    pub fn save(&self, state: &PollState) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };

        let data = serde_json::to_vec(state).map_err(|e| io_err(std::io::Error::other(e)))?;

        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        std::fs::write(&tmp_path, data).map_err(io_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}
