//! warden - Gate coordination engine for coding-agent sessions.
//!
//! Declarative gates decide allow, deny or warn for each lifecycle event of
//! an agent session. Every hook runs in its own short-lived process, so the
//! per-session state file is the only thing gates share.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;
pub mod template;

pub use config::Config;
pub use crate::core::{DispatchResult, Dispatcher, HookContext, HookEvent};
pub use error::{Error, Result};
