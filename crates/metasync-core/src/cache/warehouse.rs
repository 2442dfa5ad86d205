use metasync_warehouse::{CacheRow, SyncLogRow, Warehouse};

use super::{
    BackupInfo, CacheBackend, CacheError, EntrySummary, StoredEntry, SyncRecord, SyncStatus,
};
use crate::{CacheKey, Domain, Patch, Source, UtcDateTime};

fn parse_timestamp(key: &CacheKey, value: &str) -> Result<UtcDateTime, CacheError> {
    UtcDateTime::parse(value).map_err(|error| CacheError::Corrupt {
        key: key.to_string(),
        message: error.to_string(),
    })
}

fn parse_key(domain: &str, source: &str, patch: &str) -> Option<CacheKey> {
    Some(CacheKey::new(
        domain.parse::<Domain>().ok()?,
        source.parse::<Source>().ok()?,
        Patch::parse(patch).ok()?,
    ))
}

impl CacheBackend for Warehouse {
    fn load(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
        let Some(row) =
            self.load_entry(key.domain.as_str(), key.source.as_str(), key.patch.as_str())?
        else {
            return Ok(None);
        };

        Ok(Some(StoredEntry {
            saved_at: parse_timestamp(key, &row.saved_at)?,
            payload: row.payload,
            schema_version: row.schema_version,
        }))
    }

    fn store(
        &self,
        key: &CacheKey,
        entry: &StoredEntry,
        backed_up_at: UtcDateTime,
        retention: usize,
    ) -> Result<(), CacheError> {
        let row = CacheRow {
            domain: key.domain.as_str().to_owned(),
            source: key.source.as_str().to_owned(),
            patch: key.patch.as_str().to_owned(),
            payload: entry.payload.clone(),
            saved_at: entry.saved_at.format_rfc3339(),
            schema_version: entry.schema_version.clone(),
        };
        self.store_entry(&row, &backed_up_at.format_rfc3339(), retention)?;
        Ok(())
    }

    fn entries(&self, patch: Option<&Patch>) -> Result<Vec<EntrySummary>, CacheError> {
        let rows = self.list_entries(patch.map(Patch::as_str))?;
        let mut entries = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(key) = parse_key(&row.domain, &row.source, &row.patch) else {
                tracing::warn!(
                    domain = %row.domain,
                    source = %row.source,
                    patch = %row.patch,
                    "skipping cache row with unrecognized key"
                );
                continue;
            };
            let saved_at = parse_timestamp(&key, &row.saved_at)?;
            entries.push(EntrySummary { key, saved_at });
        }

        Ok(entries)
    }

    fn backups(&self, key: &CacheKey) -> Result<Vec<BackupInfo>, CacheError> {
        self.list_backups(key.domain.as_str(), key.source.as_str(), key.patch.as_str())?
            .into_iter()
            .map(|row| {
                Ok(BackupInfo {
                    id: row.id,
                    saved_at: parse_timestamp(key, &row.saved_at)?,
                    backed_up_at: parse_timestamp(key, &row.backed_up_at)?,
                    schema_version: row.schema_version,
                })
            })
            .collect()
    }

    fn promote_backup(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.promote_latest_backup(
            key.domain.as_str(),
            key.source.as_str(),
            key.patch.as_str(),
        )?)
    }

    fn clear_all(&self) -> Result<(), CacheError> {
        self.delete_all()?;
        Ok(())
    }

    fn clear_patch(&self, patch: &Patch) -> Result<usize, CacheError> {
        Ok(self.delete_patch(patch.as_str())?)
    }

    fn record_sync(&self, record: &SyncRecord) -> Result<(), CacheError> {
        Warehouse::record_sync(
            self,
            &SyncLogRow {
                run_id: record.run_id.to_string(),
                domain: record.domain.as_str().to_owned(),
                source: record.source.as_str().to_owned(),
                patch: record.patch.as_str().to_owned(),
                status: record.status.as_str().to_owned(),
                records: u64::try_from(record.records).unwrap_or(u64::MAX),
                latency_ms: record.latency_ms,
                message: record.message.clone(),
                logged_at: record.logged_at.format_rfc3339(),
            },
        )?;
        Ok(())
    }

    fn recent_syncs(&self, limit: usize) -> Result<Vec<SyncRecord>, CacheError> {
        let rows = Warehouse::recent_syncs(self, limit)?;
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(key) = parse_key(&row.domain, &row.source, &row.patch) else {
                continue;
            };
            let Ok(run_id) = row.run_id.parse() else {
                continue;
            };
            records.push(SyncRecord {
                run_id,
                status: if row.status == SyncStatus::Ok.as_str() {
                    SyncStatus::Ok
                } else {
                    SyncStatus::Failed
                },
                records: usize::try_from(row.records).unwrap_or(usize::MAX),
                latency_ms: row.latency_ms,
                message: row.message,
                logged_at: parse_timestamp(&key, &row.logged_at)?,
                domain: key.domain,
                source: key.source,
                patch: key.patch,
            });
        }

        Ok(records)
    }
}
