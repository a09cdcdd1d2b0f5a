//! Pooled SQLite connections for the publish writer.

use std::time::Duration;

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Pool sizing and connection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections. Must be at least 1.
    pub pool_max_size: u32,

    /// Seconds an idle connection is kept before it is closed.
    /// Zero keeps idle connections forever.
    pub idle_timeout_secs: u64,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 10,
            idle_timeout_secs: 30,
        }
    }
}

/// Pool of SQLite connections to the `broker_logs` database.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when opening the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `pool_max_size` was zero.
    #[error("database pool size must be at least 1")]
    ZeroSize,

    /// r2d2 could not build the pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Per-connection setup run once when the pool opens a connection.
#[derive(Debug, Clone, Copy)]
struct ConnectionTuning {
    busy_timeout: Duration,
}

impl CustomizeConnection<Connection, rusqlite::Error> for ConnectionTuning {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        // Readers keep working while the writer appends. In-memory
        // databases answer "memory" and stay that way.
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") && mode != "memory" {
            tracing::warn!(journal_mode = %mode, "database refused WAL mode");
        }
        conn.busy_timeout(self.busy_timeout)
    }
}

/// Opens a bounded pool over the database file at `db_path`.
///
/// No connection is opened until the first checkout, so an unreachable
/// file surfaces on [`Pool::get`] rather than here. `:memory:` gives every
/// connection its own private database; tests sharing rows use a temp file.
///
/// # Errors
///
/// Returns `PoolError::ZeroSize` for an empty pool and
/// `PoolError::PoolInit` if r2d2 rejects the configuration.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    if settings.pool_max_size == 0 {
        return Err(PoolError::ZeroSize);
    }

    let manager = SqliteConnectionManager::file(db_path).with_flags(
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    );
    let idle_timeout = (settings.idle_timeout_secs > 0)
        .then(|| Duration::from_secs(settings.idle_timeout_secs));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .min_idle(Some(0))
        .idle_timeout(idle_timeout)
        .connection_customizer(Box::new(ConnectionTuning {
            busy_timeout: Duration::from_millis(settings.busy_timeout_ms),
        }))
        .build(manager)?;

    tracing::debug!(
        path = db_path,
        max_size = settings.pool_max_size,
        idle_timeout_secs = settings.idle_timeout_secs,
        "opened broker_logs pool"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma_i64(conn: &Connection, name: &str) -> i64 {
        conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get(0))
            .expect("should read pragma")
    }

    #[test]
    fn settings_reach_every_connection() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
            idle_timeout_secs: 10,
        };
        let pool = create_pool(":memory:", settings).expect("pool creation should succeed");

        assert_eq!(pool.max_size(), 3);
        assert_eq!(pool.idle_timeout(), Some(Duration::from_secs(10)));
        let conn = pool.get().expect("should get a connection");
        assert_eq!(pragma_i64(&conn, "busy_timeout"), 2_500);
    }

    #[test]
    fn file_database_runs_in_wal_mode() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("broker_logs.db");
        let pool = create_pool(
            path.to_str().expect("temp path should be utf-8"),
            DbRuntimeSettings::default(),
        )
        .expect("pool creation should succeed");

        let conn = pool.get().expect("should get a connection");
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("should read journal_mode");
        assert_eq!(mode, "wal");
    }

    #[test]
    fn zero_idle_timeout_keeps_connections() {
        let settings = DbRuntimeSettings {
            idle_timeout_secs: 0,
            ..DbRuntimeSettings::default()
        };
        let pool = create_pool(":memory:", settings).expect("pool creation should succeed");
        assert_eq!(pool.idle_timeout(), None);
    }

    #[test]
    fn zero_pool_size_is_an_error() {
        let settings = DbRuntimeSettings {
            pool_max_size: 0,
            ..DbRuntimeSettings::default()
        };
        assert!(matches!(
            create_pool(":memory:", settings),
            Err(PoolError::ZeroSize)
        ));
    }
}
