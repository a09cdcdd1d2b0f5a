//! Relational store for persisted publish records.
//!
//! A single SQLite file holds the `broker_logs` table read by the query
//! API. [`create_pool`] hands out WAL-mode connections; [`run_migrations`]
//! brings the schema to [`SCHEMA_VERSION`], tracked in `PRAGMA user_version`.
//! The schema SQL is compiled into the binary.

mod migrations;
mod pool;

pub use migrations::{run_migrations, schema_version, MigrationError, SCHEMA_VERSION};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
