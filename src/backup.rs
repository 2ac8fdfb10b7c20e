//! PreCompact session backup detection and cleanup
//!
//! An external interruption handler leaves
//! `{YYYY-MM-DD-HHMMSS}-{label}-precompact-backup.md` files behind when a
//! session is cut short. This module only detects them at session start and
//! deletes them at session end; it never writes them.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{fs, io};

use regex::Regex;
use tracing::debug;

const BACKUP_SUFFIX: &str = "-precompact-backup.md";

/// Repo-local directory where interrupted-session backups accumulate.
pub fn backup_dir(repo_path: &Path) -> PathBuf {
    repo_path.join(".driftwatch").join("backups")
}

/// A recovery file left behind by an interrupted session.
#[derive(Debug, Clone)]
pub struct SessionBackup {
    pub filename: String,
    /// Timestamp portion of the filename, `YYYY-MM-DD-HHMMSS`.
    pub timestamp: String,
    pub content: String,
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4}-\d{2}-\d{2}-\d{6})-").unwrap())
}

/// List backups, newest first. The timestamp prefix makes lexical order
/// equal chronological order, so this is a descending filename sort.
/// A missing directory is an empty list, not an error.
pub fn session_backups(dir: &Path) -> Vec<SessionBackup> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            debug!(dir = %dir.display(), "failed to read backup directory: {}", err);
            return Vec::new();
        }
    };

    let mut backups = Vec::new();
    for entry in entries.flatten() {
        let filename = entry.file_name().to_string_lossy().to_string();
        if !filename.ends_with(BACKUP_SUFFIX) {
            continue;
        }
        let content = match fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(err) => {
                debug!(file = %filename, "skipping unreadable backup: {}", err);
                continue;
            }
        };
        let timestamp = timestamp_re()
            .captures(&filename)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        backups.push(SessionBackup {
            filename,
            timestamp,
            content,
        });
    }

    backups.sort_by(|a, b| b.filename.cmp(&a.filename));
    backups
}

/// Delete every backup file, best-effort. Files already gone or failing to
/// delete are skipped; the return value counts actual removals.
pub fn cleanup_session_backups(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let filename = entry.file_name().to_string_lossy().to_string();
        if !filename.ends_with(BACKUP_SUFFIX) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => {
                debug!(file = %filename, "failed to delete backup: {}", err);
            }
        }
    }
    removed
}
