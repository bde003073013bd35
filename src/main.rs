//! warden CLI - gate coordination for coding-agent sessions.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use warden::cli;
use warden::core::HookEvent;

/// Get the version string.
///
/// - Release builds (on a git tag): "0.1.0"
/// - Development builds: "0.1.0-dev (abc1234)"
/// - Dirty working directory: "0.1.0-dev (abc1234-dirty)"
fn version() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("WARDEN_GIT_HASH");
    const IS_RELEASE: &str = env!("WARDEN_IS_RELEASE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();

    VERSION_STRING.get_or_init(|| {
        if IS_RELEASE == "true" {
            VERSION.to_string()
        } else {
            format!("{VERSION}-dev ({GIT_HASH})")
        }
    })
}

#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version = version(), about = "Gate coordination for coding-agent sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// [Internal] Run gates for one event (JSON stdin/stdout). Called by host hooks.
    Hook {
        /// Event name (session-start, prompt-submitted, before-tool, after-tool,
        /// subagent-finished, after-response, stop).
        event: HookEvent,
    },

    /// [User] Show full session state for debugging.
    Debug {
        /// Session ID.
        session_id: String,
    },

    /// [User] Hard-block a gate until unblocked.
    Block {
        /// Session ID.
        session_id: String,

        /// Gate name.
        gate: String,

        /// Message shown when the block denies an event.
        reason: String,
    },

    /// [User] Clear a hard block.
    Unblock {
        /// Session ID.
        session_id: String,

        /// Gate name.
        gate: String,
    },
}

fn main() -> ExitCode {
    warden::logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Hook { event } => cli::hook::run(event),
        Commands::Debug { session_id } => cli::debug::run(&session_id).map(|()| 0),
        Commands::Block {
            session_id,
            gate,
            reason,
        } => cli::block::run_block(&session_id, &gate, &reason).map(|()| 0),
        Commands::Unblock { session_id, gate } => {
            cli::block::run_unblock(&session_id, &gate).map(|()| 0)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("warden: error: {e}");
            ExitCode::FAILURE
        }
    }
}
