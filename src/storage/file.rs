//! File-based storage backend.

use crate::core::state::SessionState;
use crate::error::{Error, Result};
use crate::storage::paths;
use crate::storage::traits::SessionStore;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Default number of decode attempts before a document is treated as missing.
pub const DEFAULT_LOAD_RETRIES: u32 = 3;

/// Default delay between decode attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// File-based storage backend with atomic writes.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    load_retries: u32,
    retry_delay: Duration,
}

impl FileStore {
    /// Create a new file store rooted at `root`.
    ///
    /// Creates the sessions directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory cannot be created.
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(root.join("sessions"))?;
        Ok(Self {
            root,
            load_retries: DEFAULT_LOAD_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Override the decode retry policy.
    #[must_use]
    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.load_retries = retries.max(1);
        self.retry_delay = delay;
        self
    }

    /// Storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the document for `state` is written to.
    #[must_use]
    pub fn state_path(&self, state: &SessionState) -> PathBuf {
        paths::derive_path(&self.root, &state.session_id, paths::parse_date(&state.date))
    }

    /// Read and decode one candidate file.
    ///
    /// A concurrent writer can leave a reader looking at a document it cannot
    /// decode, so decode failures are retried before giving up.
    fn read_candidate(&self, path: &Path) -> Option<SessionState> {
        for attempt in 1..=self.load_retries {
            let contents = match fs::read_to_string(path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Session file unreadable");
                    return None;
                }
            };
            match serde_json::from_str::<SessionState>(&contents) {
                Ok(state) => return Some(state),
                Err(e) => {
                    debug!(path = %path.display(), attempt, error = %e, "Session decode failed");
                    if attempt < self.load_retries {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        warn!(path = %path.display(), "Session state undecodable, starting fresh");
        None
    }
}

impl SessionStore for FileStore {
    fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(paths::lookup_paths(&self.root, session_id)
            .iter()
            .filter_map(|path| self.read_candidate(path).map(|state| (path, state)))
            .find_map(|(path, state)| {
                if state.session_id == session_id {
                    return Some(state);
                }
                // Short hashes can collide; another session's document is not ours.
                warn!(
                    path = %path.display(),
                    session_id,
                    found = %state.session_id,
                    "Session document belongs to another session"
                );
                None
            }))
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        let contents = serde_json::to_string_pretty(state)?;
        write_atomic(&self.state_path(state), contents.as_bytes())
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        for path in paths::lookup_paths(&self.root, session_id) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    if let Some(dir) = path.parent() {
                        // Only succeeds when the directory is empty.
                        let _ = fs::remove_dir(dir);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn gate_file_path(&self, session_id: &str, gate: &str) -> PathBuf {
        paths::scratch_path(&self.root, session_id, gate)
    }

    fn write_gate_file(&self, session_id: &str, gate: &str, contents: &str) -> Result<PathBuf> {
        let path = self.gate_file_path(session_id, gate);
        write_atomic(&path, contents.as_bytes())?;
        Ok(path)
    }
}

/// Write `contents` to `path` via a synced temp file and rename.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Config(format!("invalid store path: {}", path.display())))?;
    fs::create_dir_all(dir)?;

    // Temp file in the same directory so the rename stays on one filesystem.
    // It is removed on drop if anything below fails.
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Storage(e.error))?;
    Ok(())
}
