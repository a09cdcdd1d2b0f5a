//! Size-based rotating log file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::TextLogError;

/// Severity of a text log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Diagnostic detail.
    Debug,
    /// Normal lifecycle events.
    Info,
    /// Rejected or suspicious activity.
    Warn,
    /// Failures.
    Error,
}

impl Level {
    /// Returns the upper-case label written into each line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location and retention settings for a [`RotatingLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatingLogConfig {
    /// Directory holding the active file and its archives.
    pub dir: PathBuf,
    /// Base file name, e.g. `mqtt-broker.log`.
    pub file_name: String,
    /// Rotate once the active file has reached this many bytes.
    pub max_file_size: u64,
    /// Number of numbered archives kept next to the active file.
    pub max_files: usize,
}

impl Default for RotatingLogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs"),
            file_name: "mqtt-broker.log".to_string(),
            max_file_size: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

/// Formats one log line, including the trailing newline.
pub fn format_line(
    timestamp: DateTime<Utc>,
    level: Level,
    message: &str,
    data: Option<&Value>,
) -> String {
    let ts = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    match data {
        Some(data) => format!("[{ts}] [{level}] {message} | Data: {data}\n"),
        None => format!("[{ts}] [{level}] {message}\n"),
    }
}

/// Append-only log file with size-based rotation.
///
/// Archives are named `<stem>.<n><ext>` next to the active file, `1` being
/// the most recent. The size check, the optional rotation and the append it
/// gates run under one lock, so concurrent writers can never push the active
/// file past the threshold by more than the line that crossed it.
#[derive(Debug)]
pub struct RotatingLogger {
    dir: PathBuf,
    stem: String,
    ext: String,
    max_file_size: u64,
    max_files: usize,
    lock: Mutex<()>,
}

impl RotatingLogger {
    /// Creates the logger, creating the log directory if it is absent.
    ///
    /// # Errors
    ///
    /// Returns `TextLogError::CreateDir` if the directory cannot be created.
    pub fn new(config: RotatingLogConfig) -> Result<Self, TextLogError> {
        fs::create_dir_all(&config.dir).map_err(|source| TextLogError::CreateDir {
            path: config.dir.clone(),
            source,
        })?;

        let name = Path::new(&config.file_name);
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| config.file_name.clone());
        let ext = name
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        Ok(Self {
            dir: config.dir,
            stem,
            ext,
            max_file_size: config.max_file_size,
            max_files: config.max_files,
            lock: Mutex::new(()),
        })
    }

    /// Path of the file currently being appended to.
    pub fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}", self.stem, self.ext))
    }

    /// Path of archive `index` (1 = most recent).
    pub fn archive_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.{}{}", self.stem, index, self.ext))
    }

    /// Appends one line, rotating first if the active file is full.
    ///
    /// # Errors
    ///
    /// Returns a `TextLogError` if rotation or the append fails.
    pub fn write(&self, level: Level, message: &str, data: Option<&Value>) -> Result<(), TextLogError> {
        let line = format_line(Utc::now(), level, message, data);
        self.write_line(&line)
    }

    /// Appends an already formatted line under the rotation lock.
    ///
    /// The active file is reopened for every append, so a file removed or
    /// rotated by an outside tool is recreated rather than written into a
    /// dead inode.
    ///
    /// # Errors
    ///
    /// Returns a `TextLogError` if rotation or the append fails.
    pub fn write_line(&self, line: &str) -> Result<(), TextLogError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.active_path();

        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(source) => return Err(TextLogError::Write { path, source }),
        };

        if size >= self.max_file_size {
            self.rotate()?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| TextLogError::Write {
                path: path.clone(),
                source,
            })?;

        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| TextLogError::Write { path, source })
    }

    /// Shifts the archive chain by one and moves the active file to archive 1.
    ///
    /// Must be called with the rotation lock held.
    fn rotate(&self) -> Result<(), TextLogError> {
        let active = self.active_path();

        if self.max_files == 0 {
            return remove_if_exists(&active);
        }

        remove_if_exists(&self.archive_path(self.max_files))?;

        for index in (1..self.max_files).rev() {
            rename_if_exists(&self.archive_path(index), &self.archive_path(index + 1))?;
        }

        rename_if_exists(&active, &self.archive_path(1))?;

        tracing::debug!(path = %active.display(), "rotated text log");
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<(), TextLogError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(TextLogError::Rotate {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn rename_if_exists(from: &Path, to: &Path) -> Result<(), TextLogError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(TextLogError::Rotate {
            path: from.to_path_buf(),
            source,
        }),
    }
}
