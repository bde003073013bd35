//! On-disk layout.
//!
//! ```text
//! <root>/sessions/<YYYYMMDD>-<hash8>/session-state.json
//! <root>/scratch/<hash8>/<gate>.md
//! ```
//!
//! `hash8` is the first 8 hex characters of SHA-256 over the session ID, so
//! paths are deterministic and independent of the host's ID format.

use chrono::{Duration, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// File name of the session document.
pub const STATE_FILE: &str = "session-state.json";

/// Short stable hash of a session ID.
#[must_use]
pub fn short_hash(session_id: &str) -> String {
    let digest = Sha256::digest(session_id.as_bytes());
    hex::encode(&digest[..4])
}

/// Path of the session document for a given creation date.
#[must_use]
pub fn derive_path(root: &Path, session_id: &str, date: NaiveDate) -> PathBuf {
    root.join("sessions")
        .join(format!(
            "{}-{}",
            date.format("%Y%m%d"),
            short_hash(session_id)
        ))
        .join(STATE_FILE)
}

/// Candidate paths for a lookup: today first, then yesterday (UTC).
#[must_use]
pub fn lookup_paths(root: &Path, session_id: &str) -> [PathBuf; 2] {
    let today = Utc::now().date_naive();
    let yesterday = today - Duration::days(1);
    [
        derive_path(root, session_id, today),
        derive_path(root, session_id, yesterday),
    ]
}

/// Scratch file shared between a gate and the agent it instructs.
#[must_use]
pub fn scratch_path(root: &Path, session_id: &str, gate: &str) -> PathBuf {
    root.join("scratch")
        .join(short_hash(session_id))
        .join(format!("{gate}.md"))
}

/// Parse a `YYYY-MM-DD` session date, defaulting to today.
#[must_use]
pub fn parse_date(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap_or_else(|_| Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_is_stable_hex() {
        let h = short_hash("abc");
        // sha256("abc") = ba7816bf...
        assert_eq!(h, "ba7816bf");
        assert_eq!(short_hash("abc"), h);
        assert_ne!(short_hash("abd"), h);
    }

    #[test]
    fn derive_path_layout() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let path = derive_path(Path::new("/r"), "abc", date);
        assert_eq!(
            path,
            PathBuf::from("/r/sessions/20260309-ba7816bf/session-state.json")
        );
    }

    #[test]
    fn lookup_tries_today_then_yesterday() {
        let [today, yesterday] = lookup_paths(Path::new("/r"), "abc");
        let stamp = Utc::now().date_naive().format("%Y%m%d").to_string();
        assert!(today.to_string_lossy().contains(&stamp));
        assert_ne!(today, yesterday);
    }

    #[test]
    fn scratch_path_layout() {
        assert_eq!(
            scratch_path(Path::new("/r"), "abc", "custodiet"),
            PathBuf::from("/r/scratch/ba7816bf/custodiet.md")
        );
    }

    #[test]
    fn parse_date_falls_back_to_today() {
        assert_eq!(
            parse_date("2026-01-02"),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
        );
        assert_eq!(parse_date("garbage"), Utc::now().date_naive());
    }
}
