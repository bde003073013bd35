//! `warden debug` command implementation.

use crate::cli::open_store;
use crate::config::load_config;
use crate::error::{Error, Result};
use crate::storage::SessionStore;

/// Run the debug command.
///
/// Shows full session state dump for debugging.
///
/// # Errors
///
/// Returns an error if the storage backend fails or the session is not found.
pub fn run(session_id: &str) -> Result<()> {
    let store = open_store(&load_config()?)?;
    println!("{}", render(&store, session_id)?);
    Ok(())
}

/// Pretty JSON of a stored session.
///
/// # Errors
///
/// Returns `Error::SessionNotFound` if no state exists for `session_id`.
pub fn render(store: &dyn SessionStore, session_id: &str) -> Result<String> {
    let state = store
        .load(session_id)?
        .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
    Ok(serde_json::to_string_pretty(&state)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GateConfig, GateState, GateStatus, SessionState};
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn debug_outputs_json() {
        let store = MemoryStore::new();
        let mut state = SessionState::new("test-debug");
        state.hydration.original_prompt = Some("add a cache".to_string());
        store.save(&state).unwrap();

        let json = render(&store, "test-debug").unwrap();
        assert!(json.contains("test-debug"));
        assert!(json.contains("add a cache"));
    }

    #[test]
    fn debug_includes_gate_state() {
        let store = MemoryStore::new();
        let mut state = SessionState::new("test-debug-full");
        let config = GateConfig::new("custodiet", "", GateStatus::Open);
        let gate: &mut GateState = state.gate(&config);
        gate.ops_since_open = 4;
        gate.metrics.insert("temp_path".into(), json!("/tmp/ctx.md"));
        gate.block("held");
        store.save(&state).unwrap();

        let json = render(&store, "test-debug-full").unwrap();
        assert!(json.contains("\"ops_since_open\": 4"));
        assert!(json.contains("\"status\": \"OPEN\""));
        assert!(json.contains("/tmp/ctx.md"));
        assert!(json.contains("held"));
    }

    #[test]
    fn debug_missing_session() {
        let store = MemoryStore::new();
        assert!(matches!(
            render(&store, "nope"),
            Err(Error::SessionNotFound(_))
        ));
    }
}
