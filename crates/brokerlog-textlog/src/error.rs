//! Error types for the text log.

use std::path::PathBuf;

/// Errors raised by [`crate::RotatingLogger`].
///
/// All of them are filesystem failures; callers treat any of them as fatal
/// for text logging.
#[derive(Debug, thiserror::Error)]
pub enum TextLogError {
    /// The log directory could not be created.
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        /// Directory that was being created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Archive shifting failed part-way through a rotation.
    #[error("failed to rotate {path}: {source}")]
    Rotate {
        /// File that was being renamed or removed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Opening, inspecting or appending to the active file failed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Active log file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
