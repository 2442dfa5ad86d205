//! Versioned cache of canonical models keyed by `(domain, source, patch)`.
//!
//! [`CacheStore`] owns freshness rules, per-key write sequencing and
//! (de)serialization; a [`CacheBackend`] only stores opaque JSON blobs, keeps
//! the previous versions of each key as backups, and trims them. Backend calls
//! are blocking and run on tokio's blocking pool.
//!
//! | Backend | Persistence |
//! |---------|-------------|
//! | [`MemoryCacheBackend`] | Process lifetime |
//! | [`metasync_warehouse::Warehouse`] | DuckDB file under `METASYNC_HOME` |

mod memory;
mod warehouse;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

pub use memory::MemoryCacheBackend;

use crate::{CacheKey, Canonical, DataModel, Dataset, Domain, Patch, UtcDateTime};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Warehouse(#[from] metasync_warehouse::WarehouseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache entry {key} is unreadable: {message}")]
    Corrupt { key: String, message: String },

    #[error("cannot store a {actual} model under key {key}")]
    DomainMismatch { key: String, actual: Domain },

    #[error("cache task did not complete: {0}")]
    Task(String),
}

/// Live entry as handed to and from a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub payload: String,
    pub saved_at: UtcDateTime,
    pub schema_version: String,
}

/// Key and freshness of a live entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySummary {
    pub key: CacheKey,
    pub saved_at: UtcDateTime,
}

/// A superseded version of an entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub id: i64,
    pub saved_at: UtcDateTime,
    pub backed_up_at: UtcDateTime,
    pub schema_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Ok,
    Failed,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }
}

/// One provider sync in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub run_id: Uuid,
    pub domain: Domain,
    pub source: crate::Source,
    pub patch: Patch,
    pub status: SyncStatus,
    pub records: usize,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub logged_at: UtcDateTime,
}

/// Storage contract behind [`CacheStore`].
///
/// `store` must replace the live entry, move the previous one to the backups
/// stamped with `backed_up_at`, and trim backups beyond `retention`
/// oldest-first, all as one atomic step with respect to `load`.
pub trait CacheBackend: Send + Sync {
    fn load(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError>;

    fn store(
        &self,
        key: &CacheKey,
        entry: &StoredEntry,
        backed_up_at: UtcDateTime,
        retention: usize,
    ) -> Result<(), CacheError>;

    fn entries(&self, patch: Option<&Patch>) -> Result<Vec<EntrySummary>, CacheError>;

    /// Backups of `key`, newest first.
    fn backups(&self, key: &CacheKey) -> Result<Vec<BackupInfo>, CacheError>;

    /// Replaces the live entry with the newest backup, which leaves the list.
    fn promote_backup(&self, key: &CacheKey) -> Result<bool, CacheError>;

    fn clear_all(&self) -> Result<(), CacheError>;

    /// Returns the number of live entries removed.
    fn clear_patch(&self, patch: &Patch) -> Result<usize, CacheError>;

    fn record_sync(&self, _record: &SyncRecord) -> Result<(), CacheError> {
        Ok(())
    }

    fn recent_syncs(&self, _limit: usize) -> Result<Vec<SyncRecord>, CacheError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTypes {
    pub team_comps: bool,
    pub items: bool,
    pub augments: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub is_available: bool,
    pub last_updated: Option<UtcDateTime>,
    pub patch: Option<String>,
    pub data_types: DataTypes,
}

struct CacheInner {
    backend: Arc<dyn CacheBackend>,
    retention: usize,
    write_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

/// Typed, sequenced front of a [`CacheBackend`]. Cheap to clone.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<CacheInner>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, retention: usize) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                backend,
                retention,
                write_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn in_memory(retention: usize) -> Self {
        Self::new(Arc::new(MemoryCacheBackend::default()), retention)
    }

    pub fn retention(&self) -> usize {
        self.inner.retention
    }

    /// Overwrites the entry for `key`; the previous entry becomes a backup.
    pub async fn put(&self, key: &CacheKey, dataset: &Dataset) -> Result<(), CacheError> {
        if dataset.domain() != key.domain {
            return Err(CacheError::DomainMismatch {
                key: key.to_string(),
                actual: dataset.domain(),
            });
        }

        let entry = StoredEntry {
            payload: dataset.to_json()?,
            saved_at: dataset.metadata().timestamp,
            schema_version: dataset.metadata().schema_version.clone(),
        };

        let lock = {
            let mut locks = self.inner.write_locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let _guard = lock.lock().await;

        let retention = self.inner.retention;
        let task_key = key.clone();
        self.blocking(move |backend| {
            backend.store(&task_key, &entry, UtcDateTime::now(), retention)
        })
        .await?;
        tracing::debug!(%key, records = dataset.len(), "cache entry stored");
        Ok(())
    }

    pub async fn get(&self, key: &CacheKey) -> Result<Option<Dataset>, CacheError> {
        let Some(entry) = self.load(key).await? else {
            return Ok(None);
        };

        Dataset::from_json(key.domain, &entry.payload)
            .map(Some)
            .map_err(|error| CacheError::Corrupt {
                key: key.to_string(),
                message: error.to_string(),
            })
    }

    pub async fn get_model<T: Canonical>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<DataModel<T>>, CacheError> {
        Ok(self.get(key).await?.and_then(T::from_dataset))
    }

    /// True when an entry exists and is no older than `max_age`.
    /// Backend failures count as a miss.
    pub async fn is_valid(&self, key: &CacheKey, max_age: Duration) -> bool {
        match self.load(key).await {
            Ok(Some(entry)) => entry.saved_at.age() <= max_age,
            Ok(None) => false,
            Err(error) => {
                tracing::warn!(%key, %error, "cache lookup failed");
                false
            }
        }
    }

    /// Availability summary, restricted to `patch` when given.
    pub async fn status(&self, patch: Option<&Patch>) -> Result<CacheStatus, CacheError> {
        let filter = patch.cloned();
        let entries = self
            .blocking(move |backend| backend.entries(filter.as_ref()))
            .await?;
        let newest = entries.iter().max_by_key(|entry| entry.saved_at);

        let mut data_types = DataTypes::default();
        for entry in &entries {
            match entry.key.domain {
                Domain::TeamComps => data_types.team_comps = true,
                Domain::Items => data_types.items = true,
                Domain::Augments => data_types.augments = true,
            }
        }

        Ok(CacheStatus {
            is_available: !entries.is_empty(),
            last_updated: newest.map(|entry| entry.saved_at),
            patch: patch
                .map(|patch| patch.to_string())
                .or_else(|| newest.map(|entry| entry.key.patch.to_string())),
            data_types,
        })
    }

    pub async fn clear_all(&self) -> Result<(), CacheError> {
        self.blocking(|backend| backend.clear_all()).await?;
        tracing::info!("cache cleared");
        Ok(())
    }

    pub async fn clear_patch(&self, patch: &Patch) -> Result<usize, CacheError> {
        let target = patch.clone();
        let removed = self
            .blocking(move |backend| backend.clear_patch(&target))
            .await?;
        tracing::info!(%patch, removed, "patch cache cleared");
        Ok(removed)
    }

    pub async fn backups(&self, key: &CacheKey) -> Result<Vec<BackupInfo>, CacheError> {
        let key = key.clone();
        self.blocking(move |backend| backend.backups(&key)).await
    }

    /// Promotes the newest backup of `key` to the live entry.
    pub async fn restore_backup(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let lock = {
            let mut locks = self.inner.write_locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let _guard = lock.lock().await;
        let key = key.clone();
        self.blocking(move |backend| backend.promote_backup(&key))
            .await
    }

    pub async fn record_sync(&self, record: &SyncRecord) -> Result<(), CacheError> {
        let record = record.clone();
        self.blocking(move |backend| backend.record_sync(&record))
            .await
    }

    pub async fn recent_syncs(&self, limit: usize) -> Result<Vec<SyncRecord>, CacheError> {
        self.blocking(move |backend| backend.recent_syncs(limit))
            .await
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
        let key = key.clone();
        self.blocking(move |backend| backend.load(&key)).await
    }

    async fn blocking<T, F>(&self, operation: F) -> Result<T, CacheError>
    where
        F: FnOnce(&dyn CacheBackend) -> Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let backend = Arc::clone(&self.inner.backend);
        tokio::task::spawn_blocking(move || operation(backend.as_ref()))
            .await
            .map_err(|error| CacheError::Task(error.to_string()))?
    }
}
