//! Schema upgrades for the `broker_logs` store.
//!
//! The schema version lives in SQLite's `user_version` header. Step `n` in
//! [`STEPS`] takes the database from version `n` to `n + 1` inside a single
//! transaction that also bumps `user_version`, so an interrupted upgrade
//! leaves the previous version untouched.

use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;

/// Ordered schema steps. Append only; never edit a released step.
const STEPS: &[&str] = &[include_str!("migrations/001_broker_logs.sql")];

/// Schema version this build writes.
pub const SCHEMA_VERSION: u32 = STEPS.len() as u32;

/// Errors that can occur while bringing the schema up to date.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Reading or writing `user_version` failed.
    #[error("failed to access schema version: {0}")]
    Version(#[source] rusqlite::Error),

    /// The database was written by a newer build.
    #[error("database schema version {found} is newer than supported version {supported}")]
    NewerSchema {
        /// Version stored in the database.
        found: u32,
        /// Highest version this build knows.
        supported: u32,
    },

    /// An upgrade step failed and was rolled back.
    #[error("schema upgrade to version {version} failed: {source}")]
    Step {
        /// Version the step would have produced.
        version: u32,
        /// The underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },
}

/// Current schema version of `conn`; `0` for an empty database.
///
/// # Errors
///
/// Returns `MigrationError::Version` if the pragma cannot be read.
pub fn schema_version(conn: &Connection) -> Result<u32, MigrationError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(MigrationError::Version)
}

/// Applies every pending step and returns how many ran.
///
/// # Errors
///
/// Returns `MigrationError::NewerSchema` when the database is ahead of this
/// build, or `MigrationError::Step` for the first step that fails.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    upgrade(conn, STEPS)
}

fn upgrade(conn: &Connection, steps: &[&str]) -> Result<usize, MigrationError> {
    let supported = steps.len() as u32;
    let current = schema_version(conn)?;
    if current > supported {
        return Err(MigrationError::NewerSchema {
            found: current,
            supported,
        });
    }

    for (index, sql) in steps.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        let step_failed = |source| MigrationError::Step { version, source };

        // IMMEDIATE takes the write lock up front so two processes starting
        // together cannot both run the same step.
        let tx = rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
            .map_err(step_failed)?;
        tx.execute_batch(sql).map_err(step_failed)?;
        tx.pragma_update(None, "user_version", version)
            .map_err(step_failed)?;
        tx.commit().map_err(step_failed)?;

        tracing::info!(version, "upgraded broker_logs schema");
    }

    Ok((supported - current) as usize)
}
