use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use metasync_warehouse::DEFAULT_SYNC_LOG_RETENTION;

use super::{BackupInfo, CacheBackend, CacheError, EntrySummary, StoredEntry, SyncRecord};
use crate::{CacheKey, Patch, UtcDateTime};

#[derive(Debug, Clone)]
struct Backup {
    id: i64,
    entry: StoredEntry,
    backed_up_at: UtcDateTime,
}

#[derive(Debug, Default)]
struct Slot {
    live: Option<StoredEntry>,
    // Newest first.
    backups: VecDeque<Backup>,
}

#[derive(Debug, Default)]
struct State {
    slots: HashMap<CacheKey, Slot>,
    next_backup_id: i64,
    // Oldest first.
    sync_log: VecDeque<SyncRecord>,
}

/// Process-local backend.
#[derive(Debug)]
pub struct MemoryCacheBackend {
    state: RwLock<State>,
    sync_log_retention: usize,
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self {
            state: RwLock::default(),
            sync_log_retention: DEFAULT_SYNC_LOG_RETENTION,
        }
    }
}

impl MemoryCacheBackend {
    /// Keeps only the newest `retention` sync records.
    pub fn with_sync_log_retention(mut self, retention: usize) -> Self {
        self.sync_log_retention = retention;
        self
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn load(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.slots.get(key).and_then(|slot| slot.live.clone()))
    }

    fn store(
        &self,
        key: &CacheKey,
        entry: &StoredEntry,
        backed_up_at: UtcDateTime,
        retention: usize,
    ) -> Result<(), CacheError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.next_backup_id += 1;
        let id = state.next_backup_id;

        let slot = state.slots.entry(key.clone()).or_default();
        if let Some(previous) = slot.live.replace(entry.clone()) {
            slot.backups.push_front(Backup {
                id,
                entry: previous,
                backed_up_at,
            });
        }
        slot.backups.truncate(retention);
        Ok(())
    }

    fn entries(&self, patch: Option<&Patch>) -> Result<Vec<EntrySummary>, CacheError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .slots
            .iter()
            .filter(|(key, _)| patch.map_or(true, |patch| &key.patch == patch))
            .filter_map(|(key, slot)| {
                slot.live.as_ref().map(|entry| EntrySummary {
                    key: key.clone(),
                    saved_at: entry.saved_at,
                })
            })
            .collect())
    }

    fn backups(&self, key: &CacheKey) -> Result<Vec<BackupInfo>, CacheError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .slots
            .get(key)
            .map(|slot| {
                slot.backups
                    .iter()
                    .map(|backup| BackupInfo {
                        id: backup.id,
                        saved_at: backup.entry.saved_at,
                        backed_up_at: backup.backed_up_at,
                        schema_version: backup.entry.schema_version.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn promote_backup(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = state.slots.get_mut(key) else {
            return Ok(false);
        };
        let Some(latest) = slot.backups.pop_front() else {
            return Ok(false);
        };
        slot.live = Some(latest.entry);
        Ok(true)
    }

    fn clear_all(&self) -> Result<(), CacheError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.slots.clear();
        Ok(())
    }

    fn clear_patch(&self, patch: &Patch) -> Result<usize, CacheError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let before = state
            .slots
            .iter()
            .filter(|(key, slot)| &key.patch == patch && slot.live.is_some())
            .count();
        state.slots.retain(|key, _| &key.patch != patch);
        Ok(before)
    }

    fn record_sync(&self, record: &SyncRecord) -> Result<(), CacheError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.sync_log.push_back(record.clone());
        let excess = state.sync_log.len().saturating_sub(self.sync_log_retention);
        state.sync_log.drain(..excess);
        Ok(())
    }

    fn recent_syncs(&self, limit: usize) -> Result<Vec<SyncRecord>, CacheError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.sync_log.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::cache::SyncStatus;
    use crate::{Domain, Source};

    fn record(records: usize) -> SyncRecord {
        SyncRecord {
            run_id: Uuid::new_v4(),
            domain: Domain::Items,
            source: Source::Combined,
            patch: Patch::latest(),
            status: SyncStatus::Ok,
            records,
            latency_ms: 1,
            message: None,
            logged_at: UtcDateTime::now(),
        }
    }

    #[test]
    fn sync_log_drops_oldest_records_past_retention() {
        let backend = MemoryCacheBackend::default().with_sync_log_retention(3);

        for records in 0..10 {
            backend.record_sync(&record(records)).expect("record");
        }

        let kept: Vec<usize> = backend
            .recent_syncs(100)
            .expect("recent")
            .iter()
            .map(|sync| sync.records)
            .collect();
        assert_eq!(kept, vec![9, 8, 7]);
    }
}
