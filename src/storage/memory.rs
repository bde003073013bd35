//! In-memory storage backend for testing.

use crate::core::state::SessionState;
use crate::error::Result;
use crate::storage::paths;
use crate::storage::traits::SessionStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

/// In-memory storage backend for testing.
#[derive(Debug)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionState>>,
    scratch: RwLock<HashMap<PathBuf, String>>,
    scratch_root: PathBuf,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            sessions: RwLock::default(),
            scratch: RwLock::default(),
            scratch_root: std::env::temp_dir().join("warden"),
        }
    }
}

impl MemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contents of a gate scratch file, if one was written.
    #[must_use]
    pub fn gate_file(&self, session_id: &str, gate: &str) -> Option<String> {
        self.scratch
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.gate_file_path(session_id, gate))
            .cloned()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.get(session_id).cloned())
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id);
        Ok(())
    }

    fn gate_file_path(&self, session_id: &str, gate: &str) -> PathBuf {
        paths::scratch_path(&self.scratch_root, session_id, gate)
    }

    fn write_gate_file(&self, session_id: &str, gate: &str, contents: &str) -> Result<PathBuf> {
        let path = self.gate_file_path(session_id, gate);
        self.scratch
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), contents.to_string());
        Ok(path)
    }
}
