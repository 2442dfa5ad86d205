//! # Metasync Warehouse
//!
//! DuckDB-backed storage for versioned cache blobs.
//!
//! The warehouse knows nothing about the canonical game model. It stores
//! opaque JSON payloads keyed by `(domain, source, patch)`, keeps the most
//! recent previous versions of every key as timestamped backups, and records
//! an audit trail of sync runs.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `cache_entries` | Live entry per `(domain, source, patch)` |
//! | `cache_backups` | Superseded entries, trimmed oldest-first |
//! | `sync_log` | One row per provider sync attempt |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metasync_warehouse::{CacheRow, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!     let row = CacheRow {
//!         domain: "items".to_string(),
//!         source: "metatft".to_string(),
//!         patch: "14.1".to_string(),
//!         payload: "{\"data\":[]}".to_string(),
//!         saved_at: "2024-01-01T00:00:00Z".to_string(),
//!         schema_version: "1.0.0".to_string(),
//!     };
//!     warehouse.store_entry(&row, "2024-01-01T00:00:00Z", 5)?;
//!     assert!(warehouse.load_entry("items", "metatft", "14.1")?.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Security
//!
//! Every key component and payload is bound as a query parameter; nothing
//! supplied by a caller is interpolated into SQL text.

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};
use serde::Serialize;
use thiserror::Error;

pub use duckdb::{ConnectionPool, PooledConnection};

/// Sync log rows kept when [`WarehouseConfig::sync_log_retention`] is not overridden.
pub const DEFAULT_SYNC_LOG_RETENTION: usize = 1_000;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for metasync data.
    pub metasync_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept for reuse.
    pub max_idle_connections: usize,
    /// Newest sync log rows kept; older rows are deleted on insert.
    pub sync_log_retention: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::at_home(resolve_metasync_home())
    }
}

impl WarehouseConfig {
    /// Configuration rooted at an explicit home directory.
    pub fn at_home(metasync_home: impl Into<PathBuf>) -> Self {
        let metasync_home = metasync_home.into();
        let db_path = metasync_home.join("cache").join("metasync.duckdb");
        Self {
            metasync_home,
            db_path,
            max_idle_connections: 4,
            sync_log_retention: DEFAULT_SYNC_LOG_RETENTION,
        }
    }
}

/// Live cache entry as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheRow {
    pub domain: String,
    pub source: String,
    pub patch: String,
    /// Serialized model JSON.
    pub payload: String,
    /// RFC3339 timestamp of the model.
    pub saved_at: String,
    pub schema_version: String,
}

/// Key and freshness of a live entry, without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummaryRow {
    pub domain: String,
    pub source: String,
    pub patch: String,
    pub saved_at: String,
}

/// A superseded entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRow {
    pub id: i64,
    pub payload: String,
    pub saved_at: String,
    pub schema_version: String,
    pub backed_up_at: String,
}

/// One sync attempt in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncLogRow {
    pub run_id: String,
    pub domain: String,
    pub source: String,
    pub patch: String,
    /// `ok` or `failed`.
    pub status: String,
    pub records: u64,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub logged_at: String,
}

/// DuckDB blob store for cache entries, backups, and the sync log.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    pool: ConnectionPool,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::open(config.db_path.clone(), config.max_idle_connections)?;
        let warehouse = Self { config, pool };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Initialize the database schema.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    /// Root directory this warehouse was opened under.
    pub fn home(&self) -> &Path {
        self.config.metasync_home.as_path()
    }

    /// Load the live entry for a key.
    pub fn load_entry(
        &self,
        domain: &str,
        source: &str,
        patch: &str,
    ) -> Result<Option<CacheRow>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let params: [&dyn ToSql; 3] = [&domain, &source, &patch];
        let mut statement = connection.prepare(
            "SELECT payload, saved_at, schema_version FROM cache_entries \
             WHERE domain = ? AND source = ? AND patch = ?",
        )?;
        let mut rows = statement.query_map(params.as_slice(), |row| {
            Ok(CacheRow {
                domain: domain.to_owned(),
                source: source.to_owned(),
                patch: patch.to_owned(),
                payload: row.get(0)?,
                saved_at: row.get(1)?,
                schema_version: row.get(2)?,
            })
        })?;

        Ok(rows.next().transpose()?)
    }

    /// Replace the live entry for a key.
    ///
    /// The previous entry, if any, moves to `cache_backups` stamped with
    /// `backed_up_at`, and backups beyond `retention` are deleted oldest-first.
    /// All three steps commit in one transaction.
    pub fn store_entry(
        &self,
        row: &CacheRow,
        backed_up_at: &str,
        retention: usize,
    ) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let key: [&dyn ToSql; 3] = [&row.domain, &row.source, &row.patch];

            let backup: [&dyn ToSql; 4] = [&backed_up_at, &row.domain, &row.source, &row.patch];
            connection.execute(
                "INSERT INTO cache_backups \
                 (domain, source, patch, payload, saved_at, schema_version, backed_up_at) \
                 SELECT domain, source, patch, payload, saved_at, schema_version, ? \
                 FROM cache_entries WHERE domain = ? AND source = ? AND patch = ?",
                backup.as_slice(),
            )?;

            connection.execute(
                "DELETE FROM cache_entries WHERE domain = ? AND source = ? AND patch = ?",
                key.as_slice(),
            )?;

            let insert: [&dyn ToSql; 6] = [
                &row.domain,
                &row.source,
                &row.patch,
                &row.payload,
                &row.saved_at,
                &row.schema_version,
            ];
            connection.execute(
                "INSERT INTO cache_entries \
                 (domain, source, patch, payload, saved_at, schema_version) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                insert.as_slice(),
            )?;

            trim_backups(&connection, &row.domain, &row.source, &row.patch, retention)
        })();

        finalize_transaction(&connection, result)
    }

    /// List live entries, optionally restricted to one patch.
    pub fn list_entries(&self, patch: Option<&str>) -> Result<Vec<EntrySummaryRow>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let map_row = |row: &::duckdb::Row<'_>| {
            Ok(EntrySummaryRow {
                domain: row.get(0)?,
                source: row.get(1)?,
                patch: row.get(2)?,
                saved_at: row.get(3)?,
            })
        };

        let rows = match patch {
            Some(patch) => {
                let params: [&dyn ToSql; 1] = [&patch];
                let mut statement = connection.prepare(
                    "SELECT domain, source, patch, saved_at FROM cache_entries \
                     WHERE patch = ? ORDER BY domain, source",
                )?;
                let rows = statement
                    .query_map(params.as_slice(), map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut statement = connection.prepare(
                    "SELECT domain, source, patch, saved_at FROM cache_entries \
                     ORDER BY patch, domain, source",
                )?;
                let rows = statement
                    .query_map([], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(rows)
    }

    /// Backups for a key, newest first.
    pub fn list_backups(
        &self,
        domain: &str,
        source: &str,
        patch: &str,
    ) -> Result<Vec<BackupRow>, WarehouseError> {
        let connection = self.pool.acquire()?;
        select_backups(&connection, domain, source, patch)
    }

    /// Promote the newest backup of a key to the live entry.
    ///
    /// The promoted backup is removed from the backup list and the current
    /// live entry is discarded. Returns `false` when the key has no backups.
    pub fn promote_latest_backup(
        &self,
        domain: &str,
        source: &str,
        patch: &str,
    ) -> Result<bool, WarehouseError> {
        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<bool, WarehouseError> {
            let Some(latest) = select_backups(&connection, domain, source, patch)?
                .into_iter()
                .next()
            else {
                return Ok(false);
            };

            let key: [&dyn ToSql; 3] = [&domain, &source, &patch];
            connection.execute(
                "DELETE FROM cache_entries WHERE domain = ? AND source = ? AND patch = ?",
                key.as_slice(),
            )?;

            let insert: [&dyn ToSql; 6] = [
                &domain,
                &source,
                &patch,
                &latest.payload,
                &latest.saved_at,
                &latest.schema_version,
            ];
            connection.execute(
                "INSERT INTO cache_entries \
                 (domain, source, patch, payload, saved_at, schema_version) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                insert.as_slice(),
            )?;

            let id: [&dyn ToSql; 1] = [&latest.id];
            connection.execute("DELETE FROM cache_backups WHERE id = ?", id.as_slice())?;
            Ok(true)
        })();

        finalize_transaction(&connection, result)
    }

    /// Delete every entry and backup. The sync log is kept.
    pub fn delete_all(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = connection
            .execute_batch("DELETE FROM cache_backups; DELETE FROM cache_entries;")
            .map_err(WarehouseError::from);
        finalize_transaction(&connection, result)
    }

    /// Delete entries and backups belonging to one patch.
    ///
    /// Returns the number of live entries removed.
    pub fn delete_patch(&self, patch: &str) -> Result<usize, WarehouseError> {
        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let params: [&dyn ToSql; 1] = [&patch];
            connection.execute("DELETE FROM cache_backups WHERE patch = ?", params.as_slice())?;
            let removed =
                connection.execute("DELETE FROM cache_entries WHERE patch = ?", params.as_slice())?;
            Ok(removed)
        })();
        finalize_transaction(&connection, result)
    }

    /// Append a sync attempt to the audit log and drop rows beyond
    /// [`WarehouseConfig::sync_log_retention`], oldest first.
    pub fn record_sync(&self, row: &SyncLogRow) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = insert_sync(&connection, row, self.config.sync_log_retention);
        finalize_transaction(&connection, result)
    }

    /// Most recent sync attempts, newest first.
    pub fn recent_syncs(&self, limit: usize) -> Result<Vec<SyncLogRow>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let params: [&dyn ToSql; 1] = [&limit];
        let mut statement = connection.prepare(
            "SELECT run_id, domain, source, patch, status, records, latency_ms, message, logged_at \
             FROM sync_log ORDER BY id DESC LIMIT ?",
        )?;
        let rows = statement
            .query_map(params.as_slice(), |row| {
                let records: i64 = row.get(5)?;
                let latency_ms: i64 = row.get(6)?;
                Ok(SyncLogRow {
                    run_id: row.get(0)?,
                    domain: row.get(1)?,
                    source: row.get(2)?,
                    patch: row.get(3)?,
                    status: row.get(4)?,
                    records: u64::try_from(records).unwrap_or_default(),
                    latency_ms: u64::try_from(latency_ms).unwrap_or_default(),
                    message: row.get(7)?,
                    logged_at: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn insert_sync(
    connection: &Connection,
    row: &SyncLogRow,
    retention: usize,
) -> Result<(), WarehouseError> {
    let records = i64::try_from(row.records).unwrap_or(i64::MAX);
    let latency_ms = i64::try_from(row.latency_ms).unwrap_or(i64::MAX);
    let params: [&dyn ToSql; 9] = [
        &row.run_id,
        &row.domain,
        &row.source,
        &row.patch,
        &row.status,
        &records,
        &latency_ms,
        &row.message,
        &row.logged_at,
    ];
    connection.execute(
        "INSERT INTO sync_log \
         (run_id, domain, source, patch, status, records, latency_ms, message, logged_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params.as_slice(),
    )?;

    let keep = i64::try_from(retention).unwrap_or(i64::MAX);
    let params: [&dyn ToSql; 1] = [&keep];
    connection.execute(
        "DELETE FROM sync_log WHERE id NOT IN \
         (SELECT id FROM sync_log ORDER BY id DESC LIMIT ?)",
        params.as_slice(),
    )?;
    Ok(())
}

fn select_backups(
    connection: &Connection,
    domain: &str,
    source: &str,
    patch: &str,
) -> Result<Vec<BackupRow>, WarehouseError> {
    let params: [&dyn ToSql; 3] = [&domain, &source, &patch];
    let mut statement = connection.prepare(
        "SELECT id, payload, saved_at, schema_version, backed_up_at FROM cache_backups \
         WHERE domain = ? AND source = ? AND patch = ? ORDER BY id DESC",
    )?;
    let rows = statement
        .query_map(params.as_slice(), |row| {
            Ok(BackupRow {
                id: row.get(0)?,
                payload: row.get(1)?,
                saved_at: row.get(2)?,
                schema_version: row.get(3)?,
                backed_up_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn trim_backups(
    connection: &Connection,
    domain: &str,
    source: &str,
    patch: &str,
    retention: usize,
) -> Result<(), WarehouseError> {
    let expired = select_backups(connection, domain, source, patch)?
        .into_iter()
        .skip(retention);

    for backup in expired {
        let params: [&dyn ToSql; 1] = [&backup.id];
        connection.execute("DELETE FROM cache_backups WHERE id = ?", params.as_slice())?;
    }

    Ok(())
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the metasync home directory from environment or default.
fn resolve_metasync_home() -> PathBuf {
    if let Some(path) = env::var_os("METASYNC_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".metasync");
    }

    PathBuf::from(".metasync")
}
