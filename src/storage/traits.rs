//! Storage trait definitions.

use crate::core::schema::GateConfig;
use crate::core::state::{GateState, SessionState};
use crate::error::Result;
use std::path::PathBuf;
use tracing::debug;

/// Storage backend for session state.
///
/// Every hook invocation is a separate process, so the store is the only
/// coordination point between them. Writes are whole-document and
/// last-write-wins.
pub trait SessionStore: Send + Sync {
    /// Load session state by ID.
    ///
    /// Missing or undecodable state is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn load(&self, session_id: &str) -> Result<Option<SessionState>>;

    /// Persist the full session document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    fn save(&self, state: &SessionState) -> Result<()>;

    /// Delete a session. Deleting a missing session succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn delete(&self, session_id: &str) -> Result<()>;

    /// Well-known scratch file for one gate of one session.
    fn gate_file_path(&self, session_id: &str, gate: &str) -> PathBuf;

    /// Replace the contents of a gate's scratch file, returning its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write_gate_file(&self, session_id: &str, gate: &str, contents: &str) -> Result<PathBuf>;

    /// Load a session, or create and persist a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if a fresh session cannot be persisted.
    fn get_or_create(&self, session_id: &str) -> Result<SessionState> {
        if let Some(state) = self.load(session_id)? {
            return Ok(state);
        }
        debug!(session_id, "Creating new session state");
        let state = SessionState::new(session_id);
        self.save(&state)?;
        Ok(state)
    }

    /// Gate state within a session, materialized at the initial status if absent.
    fn get_gate<'a>(&self, state: &'a mut SessionState, config: &GateConfig) -> &'a mut GateState {
        state.gate(config)
    }
}
