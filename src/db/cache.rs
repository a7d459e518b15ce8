//! File-backed query result cache.
//!
//! Results are stored per request URI and statement:
//!
//! ```text
//! <cache_dir>/<md5(uri)>/<md5(sql)>
//! ```
//!
//! Each file holds `<expiry>TS---><json payload>`, where `expiry` is a unix
//! timestamp (0 never expires). Writers take an exclusive `flock` on the
//! file, readers a shared one. Any I/O or lock failure is logged and
//! treated as a miss; the cache never fails a request.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::result::ResultCursor;
use super::value::Value;
use crate::config::ConfigError;

const SEPARATOR: &str = "TS--->";

/// Serialized form of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl CachedResult {
    pub fn from_cursor(cursor: &ResultCursor) -> Self {
        Self {
            columns: cursor.row_columns(),
            rows: cursor
                .result_array()
                .iter()
                .map(|r| r.values().to_vec())
                .collect(),
        }
    }

    /// Rebuild an offline cursor.
    pub fn into_cursor(self) -> ResultCursor {
        ResultCursor::offline(self.columns, self.rows)
    }
}

/// Advisory lock held for the lifetime of the guard.
struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    fn acquire(file: &'a File, exclusive: bool) -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use libc::{flock, LOCK_EX, LOCK_SH};
            use std::os::unix::io::AsRawFd;

            let operation = if exclusive { LOCK_EX } else { LOCK_SH };
            // SAFETY: the descriptor is owned by `file`, which outlives the guard.
            if unsafe { flock(file.as_raw_fd(), operation) } != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
        Ok(Self { file })
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use libc::{flock, LOCK_UN};
            use std::os::unix::io::AsRawFd;

            // SAFETY: see `acquire`.
            unsafe {
                flock(self.file.as_raw_fd(), LOCK_UN);
            }
        }
    }
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct DbCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl DbCache {
    /// Open a cache rooted at `dir`, creating it when missing.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidDirectory` when `dir` cannot be created, is not
    /// a directory, or is read-only.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        let invalid = || ConfigError::InvalidDirectory(dir.clone());

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|_| invalid())?;
        }
        let meta = fs::metadata(&dir).map_err(|_| invalid())?;
        if !meta.is_dir() || meta.permissions().readonly() {
            return Err(invalid());
        }
        Ok(Self { dir, ttl: None })
    }

    /// Expire entries `ttl` after they are written.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn uri_dir(&self, uri: &str) -> PathBuf {
        self.dir.join(md5_hex(uri))
    }

    fn entry_path(&self, uri: &str, sql: &str) -> PathBuf {
        self.uri_dir(uri).join(md5_hex(sql))
    }

    /// Cached result for `sql` issued under `uri`, if present and fresh.
    pub fn read(&self, uri: &str, sql: &str) -> Option<CachedResult> {
        let path = self.entry_path(uri, sql);
        if !path.exists() {
            return None;
        }

        let content = match read_locked(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(category = "db_cache", path = %path.display(), error = %e, "cache read failed");
                return None;
            }
        };

        let (expiry, payload) = content.split_once(SEPARATOR)?;
        let expiry = expiry.trim().parse::<u64>().ok()?;
        if expiry != 0 && now() > expiry {
            debug!(category = "db_cache", path = %path.display(), "cache entry expired");
            let _ = fs::remove_file(&path);
            return None;
        }

        match serde_json::from_str(payload) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(category = "db_cache", path = %path.display(), error = %e, "corrupt cache entry");
                None
            }
        }
    }

    /// Store `result`. Returns false when the write was skipped.
    pub fn write(&self, uri: &str, sql: &str, result: &CachedResult) -> bool {
        let path = self.entry_path(uri, sql);
        let expiry = self.ttl.map(|ttl| now() + ttl.as_secs()).unwrap_or(0);

        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(category = "db_cache", error = %e, "cannot serialize result for cache");
                return false;
            }
        };
        let content = format!("{}{}{}", expiry, SEPARATOR, payload);

        match write_locked(&path, &content) {
            Ok(()) => true,
            Err(e) => {
                warn!(category = "db_cache", path = %path.display(), error = %e, "cache write failed");
                false
            }
        }
    }

    /// Drop every entry cached under `uri`.
    pub fn delete(&self, uri: &str) {
        let dir = self.uri_dir(uri);
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!(category = "db_cache", path = %dir.display(), error = %e, "cache delete failed");
            }
        }
    }

    /// Drop every entry.
    pub fn delete_all(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(category = "db_cache", error = %e, "cache delete_all failed");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = removed {
                warn!(category = "db_cache", path = %path.display(), error = %e, "cache delete_all failed");
            }
        }
    }
}

fn read_locked(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let _lock = FileLock::acquire(&file, false)?;
    let mut content = String::new();
    (&file).read_to_string(&mut content)?;
    Ok(content)
}

fn write_locked(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Truncate only once the exclusive lock is held.
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    let _lock = FileLock::acquire(&file, true)?;
    file.set_len(0)?;
    (&file).write_all(content.as_bytes())?;
    (&file).flush()?;
    Ok(())
}
