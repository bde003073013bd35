//! CLI command implementations.

pub mod block;
pub mod debug;
pub mod hook;

use crate::config::Config;
use crate::error::Result;
use crate::storage::FileStore;

/// File store for the configured root.
///
/// # Errors
///
/// Returns an error if the storage directory cannot be created.
pub fn open_store(config: &Config) -> Result<FileStore> {
    Ok(FileStore::new(config.storage.path.clone())?
        .with_retries(config.storage.load_retries, config.storage.retry_delay()))
}
