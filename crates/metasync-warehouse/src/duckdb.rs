//! Connection handling for one `DuckDB` database file.
//!
//! Every connection handed out is a clone of a single root connection, so
//! all of them share one database instance and see each other's commits.
//! Do not open the same file through a second pool in one process.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ::duckdb::Connection;

struct Shared {
    db_path: PathBuf,
    root: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

/// Shared handle on one open database. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    /// Opens `path` and keeps up to `max_idle` spare connections around.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, max_idle: usize) -> Result<Self, ::duckdb::Error> {
        let db_path = path.into();
        let root = Connection::open(&db_path)?;
        root.execute_batch("PRAGMA disable_progress_bar;")?;

        Ok(Self {
            shared: Arc::new(Shared {
                db_path,
                root: Mutex::new(root),
                idle: Mutex::new(Vec::new()),
                max_idle: max_idle.max(1),
            }),
        })
    }

    /// Takes an idle connection or clones a new one from the root.
    ///
    /// # Errors
    /// Returns an error if a new connection cannot be cloned.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let reused = self
            .shared
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let connection = match reused {
            Some(connection) => connection,
            None => self
                .shared
                .root
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .try_clone()?,
        };

        Ok(PooledConnection {
            shared: Arc::clone(&self.shared),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.shared.db_path.as_path()
    }
}

/// Connection on loan from a [`ConnectionPool`]; goes back to it on drop.
pub struct PooledConnection {
    shared: Arc<Shared>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        // Only `drop` takes the connection out.
        self.connection
            .as_ref()
            .expect("pooled connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut idle = self
            .shared
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.shared.max_idle {
            idle.push(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_database_instance() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pool = ConnectionPool::open(temp.path().join("pool.duckdb"), 2).expect("open");

        let reader = pool.acquire().expect("reader");
        reader
            .execute_batch("CREATE TABLE readings (v INTEGER)")
            .expect("create");

        {
            let writer = pool.acquire().expect("writer");
            writer
                .execute_batch("INSERT INTO readings VALUES (1), (2)")
                .expect("insert");
        }

        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 2);
    }

    #[test]
    fn idle_connections_are_capped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pool = ConnectionPool::open(temp.path().join("pool.duckdb"), 1).expect("open");

        let first = pool.acquire().expect("first");
        let second = pool.acquire().expect("second");
        drop(first);
        drop(second);

        let idle = pool
            .shared
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        assert_eq!(idle, 1);
    }
}
