//! Configuration loading and management.
//!
//! Configuration is loaded with the following precedence:
//! 1. Environment variables (`WARDEN_*`)
//! 2. Config file (`$WARDEN_CONFIG`, else `<home>/config.toml`)
//! 3. Defaults

use crate::core::predicates::PredicateSettings;
use crate::core::schema::EnforcementMode;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Gate configuration.
    pub gates: GatesConfig,

    /// Predicate configuration.
    pub predicates: PredicatesConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for session state.
    pub path: PathBuf,

    /// Decode attempts before a session document is treated as missing.
    pub load_retries: u32,

    /// Delay between decode attempts.
    pub retry_delay_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_warden_home(),
            load_retries: 3,
            retry_delay_ms: 10,
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Gate configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    /// Enforcement mode per gate name. Unlisted gates block.
    pub modes: HashMap<String, EnforcementMode>,

    /// Ops between compliance checks.
    pub custodiet_threshold: u32,

    /// How many ops before the threshold the countdown starts.
    pub countdown_start_before: u32,

    /// Stop denials per gate before its circuit breaker trips.
    pub max_stop_denials: u32,

    /// Gates that are not registered at all.
    pub disabled: Vec<String>,
}

impl Default for GatesConfig {
    fn default() -> Self {
        let modes = [
            ("hydration", EnforcementMode::Block),
            ("task", EnforcementMode::Warn),
            ("custodiet", EnforcementMode::Warn),
            ("critic", EnforcementMode::Warn),
            ("qa", EnforcementMode::Warn),
            ("handover", EnforcementMode::Block),
        ]
        .into_iter()
        .map(|(name, mode)| (name.to_string(), mode))
        .collect();

        Self {
            modes,
            custodiet_threshold: 7,
            countdown_start_before: 5,
            max_stop_denials: 3,
            disabled: Vec::new(),
        }
    }
}

impl GatesConfig {
    /// Enforcement mode for a gate.
    #[must_use]
    pub fn mode(&self, gate: &str) -> EnforcementMode {
        self.modes.get(gate).copied().unwrap_or_default()
    }

    /// Whether a gate is enabled.
    #[must_use]
    pub fn is_enabled(&self, gate: &str) -> bool {
        !self.disabled.iter().any(|d| d == gate)
    }
}

/// Predicate configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredicatesConfig {
    /// Wall-clock limit for predicates that run commands.
    pub command_timeout_ms: u64,
}

impl Default for PredicatesConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 5000,
        }
    }
}

impl PredicatesConfig {
    #[must_use]
    pub fn settings(&self) -> PredicateSettings {
        PredicateSettings {
            command_timeout: Duration::from_millis(self.command_timeout_ms),
        }
    }
}

/// Get the default warden home directory.
fn default_warden_home() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(".warden"), |h| h.join(".warden"))
}

/// Load configuration with precedence: env vars → file → defaults.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// an environment override has an invalid value.
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    let config_path = get_config_path();
    if config_path.exists() {
        let contents = fs::read_to_string(&config_path).map_err(Error::Storage)?;
        config = parse_config(&contents)?;
    }

    apply_env_overrides(&mut config, |key| env::var(key).ok())?;

    Ok(config)
}

/// Parse configuration TOML.
///
/// # Errors
///
/// Returns `Error::Config` if the document is invalid.
pub fn parse_config(contents: &str) -> Result<Config> {
    toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
}

/// Get the path to the config file.
fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var("WARDEN_CONFIG") {
        return PathBuf::from(path);
    }

    if let Ok(home) = env::var("WARDEN_HOME") {
        return PathBuf::from(home).join("config.toml");
    }

    default_warden_home().join("config.toml")
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: {value:?}")))
}

/// Apply environment variable overrides to config.
///
/// `lookup` abstracts the environment so overrides are testable.
fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(path) = lookup("WARDEN_STORAGE_PATH") {
        config.storage.path = PathBuf::from(path);
    } else if let Some(home) = lookup("WARDEN_HOME") {
        config.storage.path = PathBuf::from(home);
    }

    if let Some(val) = lookup("WARDEN_CUSTODIET_THRESHOLD") {
        config.gates.custodiet_threshold = parse_var("WARDEN_CUSTODIET_THRESHOLD", &val)?;
    }

    if let Some(val) = lookup("WARDEN_MAX_STOP_DENIALS") {
        config.gates.max_stop_denials = parse_var("WARDEN_MAX_STOP_DENIALS", &val)?;
    }

    let gate_names: Vec<String> = crate::core::definitions::GATE_NAMES
        .iter()
        .map(|g| (*g).to_string())
        .chain(config.gates.modes.keys().cloned())
        .collect();
    for gate in gate_names {
        let key = format!("WARDEN_{}_MODE", gate.to_uppercase());
        if let Some(val) = lookup(&key) {
            let mode: EnforcementMode = parse_var(&key, &val)?;
            config.gates.modes.insert(gate, mode);
        }
    }

    Ok(())
}
