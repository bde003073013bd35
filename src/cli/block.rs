//! `warden block` and `warden unblock` command implementations.

use crate::cli::open_store;
use crate::config::load_config;
use crate::core::Dispatcher;
use crate::error::Result;

/// Put an explicit hard block on a gate.
///
/// # Errors
///
/// Returns an error if the gate is unknown, the session does not exist, or
/// storage fails.
pub fn run_block(session_id: &str, gate: &str, reason: &str) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config)?;
    Dispatcher::from_config(&config)?.block(&store, session_id, gate, reason)?;
    println!("Blocked gate '{gate}' for session {session_id}");
    Ok(())
}

/// Clear an explicit hard block.
///
/// # Errors
///
/// Returns an error if the gate is unknown, the session does not exist, or
/// storage fails.
pub fn run_unblock(session_id: &str, gate: &str) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config)?;
    Dispatcher::from_config(&config)?.unblock(&store, session_id, gate)?;
    println!("Unblocked gate '{gate}' for session {session_id}");
    Ok(())
}
