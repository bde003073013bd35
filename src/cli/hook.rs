//! `warden hook` command implementation.

use crate::cli::open_store;
use crate::config::load_config;
use crate::core::{DispatchResult, Dispatcher, HookContext, HookEvent};
use crate::error::Result;
use crate::storage::SessionStore;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Read, Write};
use tracing::warn;

/// Run a hook command.
///
/// Reads one context document from stdin, dispatches it and writes the
/// aggregated result as JSON to stdout. Returns the process exit code.
///
/// # Errors
///
/// Returns an error for configuration problems, which are never failed
/// open, or if writing to stdout fails.
pub fn run(event: HookEvent) -> Result<u8> {
    let config = load_config()?;
    let dispatcher = Dispatcher::from_config(&config)?;

    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        warn!(error = %e, "Failed to read hook input, allowing");
        return emit(&DispatchResult::allow());
    }

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Storage init failed, allowing");
            return emit(&DispatchResult::allow());
        }
    };

    let result = handle(event, &input, &dispatcher, &store)?;
    emit(&result)
}

/// Parse and dispatch one hook input.
///
/// Anything other than a configuration error fails open with ALLOW.
///
/// # Errors
///
/// Returns configuration errors raised while evaluating gates.
pub fn handle(
    event: HookEvent,
    input: &str,
    dispatcher: &Dispatcher,
    store: &dyn SessionStore,
) -> Result<DispatchResult> {
    let raw: Value = match serde_json::from_str(input) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, event = %event, "Failed to parse hook input, allowing");
            return Ok(DispatchResult::allow());
        }
    };

    let ctx = match HookContext::from_raw(event, raw) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(error = %e, event = %event, "Invalid hook input, allowing");
            return Ok(DispatchResult::allow());
        }
    };

    match dispatcher.dispatch(&ctx, store) {
        Ok(result) => Ok(result),
        Err(e) if e.is_configuration() => Err(e),
        Err(e) => {
            warn!(error = %e, session_id = %ctx.session_id, "Dispatch failed, allowing");
            Ok(DispatchResult::allow())
        }
    }
}

fn emit(result: &DispatchResult) -> Result<u8> {
    write_json(result)?;
    Ok(result.exit_code())
}

/// Write a serializable value as JSON to stdout.
fn write_json<T: Serialize>(output: &T) -> Result<()> {
    let json = serde_json::to_string(output)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(json.as_bytes())?;
    stdout.write_all(b"\n")?;
    Ok(())
}
