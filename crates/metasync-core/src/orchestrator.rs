//! Cache-first sync of provider data into the canonical model.
//!
//! A read resolves its [`CacheKey`], serves a fresh cache entry when one
//! exists, and otherwise joins or starts the single sync for that key. The
//! sync runs as its own task: fetch, normalize, validate (advisory), store.
//! When it fails the caller falls back to the cached entry of any age, then
//! to the last model this instance saw for the domain, then to nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use uuid::Uuid;

use crate::adapters::{client_for, offline_clients};
use crate::cache::{
    BackupInfo, CacheError, CacheStatus, CacheStore, DataTypes, SyncRecord, SyncStatus,
};
use crate::config::SyncConfig;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::merge::merge_datasets;
use crate::normalizer::{NormalizeOptions, Normalizer};
use crate::provider::{ProviderClient, RawPayload, SourceError};
use crate::validator::{ValidationReport, Validator};
use crate::{
    Augment, CacheKey, Canonical, Dataset, Domain, Item, Patch, ProviderId, Source,
    TeamComp, UtcDateTime, ValidationError,
};

type SharedSync = Shared<BoxFuture<'static, Option<Dataset>>>;

/// Per-call overrides of the orchestrator defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Defaults to [`SyncConfig::default_source`].
    pub source: Option<Source>,
    /// Defaults to the current patch, then `latest`.
    pub patch: Option<Patch>,
    /// Skip the freshness check.
    pub force_refresh: bool,
}

impl FetchOptions {
    pub fn forced() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_patch(mut self, patch: Patch) -> Self {
        self.patch = Some(patch);
        self
    }
}

/// Outcome of [`SyncOrchestrator::refresh_all`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub team_comps: usize,
    pub items: usize,
    pub augments: usize,
    pub patch: Option<Patch>,
    /// Unit items missing from the item catalog.
    pub item_references: ValidationReport,
}

struct Inner {
    providers: Vec<Arc<dyn ProviderClient>>,
    cache: CacheStore,
    config: SyncConfig,
    current_patch: RwLock<Option<Patch>>,
    last_known: RwLock<HashMap<Domain, Dataset>>,
    inflight: Mutex<HashMap<CacheKey, SharedSync>>,
}

/// Owns the providers, the cache and the sync state. Cheap to clone.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// `providers` are reordered into precedence order.
    pub fn new(
        mut providers: Vec<Arc<dyn ProviderClient>>,
        cache: CacheStore,
        config: SyncConfig,
    ) -> Self {
        providers.sort_by_key(|provider| precedence(provider.id()));
        Self {
            inner: Arc::new(Inner {
                providers,
                cache,
                config,
                current_patch: RwLock::new(None),
                last_known: RwLock::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn builder() -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.inner.providers.iter().map(|provider| provider.id()).collect()
    }

    /// Patch adopted from the most recent `latest` sync or cache hit.
    pub fn current_patch(&self) -> Option<Patch> {
        self.inner
            .current_patch
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn get_team_comps(&self, options: &FetchOptions) -> Vec<TeamComp> {
        self.get_data(options).await
    }

    pub async fn get_items(&self, options: &FetchOptions) -> Vec<Item> {
        self.get_data(options).await
    }

    pub async fn get_augments(&self, options: &FetchOptions) -> Vec<Augment> {
        self.get_data(options).await
    }

    /// Never fails: provider and cache errors degrade to fallback data.
    pub async fn get_data<T: Canonical>(&self, options: &FetchOptions) -> Vec<T> {
        self.get_dataset(T::DOMAIN, options)
            .await
            .and_then(T::from_dataset)
            .map(|model| model.data)
            .unwrap_or_default()
    }

    pub async fn get_dataset(&self, domain: Domain, options: &FetchOptions) -> Option<Dataset> {
        let key = self.resolve_key(domain, options);

        let max_age = self.inner.config.cache_max_age;
        if !options.force_refresh && self.inner.cache.is_valid(&key, max_age).await {
            match self.inner.cache.get(&key).await {
                Ok(Some(dataset)) => {
                    tracing::debug!(%key, "cache hit");
                    self.adopt_patch(&dataset, false);
                    self.remember(&dataset);
                    return Some(dataset);
                }
                Ok(None) => {}
                Err(error) => tracing::warn!(%key, %error, "cache read failed"),
            }
        }

        if let Some(dataset) = self.sync(key.clone()).await {
            return Some(dataset);
        }

        self.fallback(&key).await
    }

    /// Forces a sync of every domain: items, then comps checked against the
    /// item catalog, then augments.
    pub async fn refresh_all(&self) -> RefreshSummary {
        let options = FetchOptions::forced();

        let items = self.get_items(&options).await;
        let team_comps = self.get_team_comps(&options).await;
        let item_references = Validator::validate_item_references(&team_comps, &items);
        if !item_references.is_valid {
            tracing::warn!(
                violations = item_references.errors.len(),
                "team comps reference items missing from the catalog"
            );
        }
        let augments = self.get_augments(&options).await;

        let summary = RefreshSummary {
            team_comps: team_comps.len(),
            items: items.len(),
            augments: augments.len(),
            patch: self.current_patch(),
            item_references,
        };
        tracing::info!(
            team_comps = summary.team_comps,
            items = summary.items,
            augments = summary.augments,
            "refresh completed"
        );
        summary
    }

    /// Cache errors report an unavailable cache.
    pub async fn get_cache_status(&self, patch: Option<&Patch>) -> CacheStatus {
        match self.inner.cache.status(patch).await {
            Ok(status) => status,
            Err(error) => {
                tracing::warn!(%error, "cache status unavailable");
                CacheStatus {
                    is_available: false,
                    last_updated: None,
                    patch: patch.map(Patch::to_string),
                    data_types: DataTypes::default(),
                }
            }
        }
    }

    pub async fn is_offline_data_available(&self, patch: Option<&Patch>) -> bool {
        self.get_cache_status(patch).await.is_available
    }

    /// Drops every cached entry and the in-memory sync state.
    pub async fn clear_cache(&self) -> Result<(), CacheError> {
        self.inner.cache.clear_all().await?;
        *self
            .inner
            .current_patch
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.inner
            .last_known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    pub async fn clear_patch_cache(&self, patch: &Patch) -> Result<usize, CacheError> {
        let removed = self.inner.cache.clear_patch(patch).await?;
        let mut current = self
            .inner
            .current_patch
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current.as_ref() == Some(patch) {
            *current = None;
        }
        Ok(removed)
    }

    /// Re-runs validation on the cached entry, if any.
    pub async fn revalidate(
        &self,
        domain: Domain,
        options: &FetchOptions,
    ) -> Option<ValidationReport> {
        let key = self.resolve_key(domain, options);
        match self.inner.cache.get(&key).await {
            Ok(dataset) => dataset.map(|dataset| Validator::validate_dataset(&dataset)),
            Err(error) => {
                tracing::warn!(%key, %error, "cache read failed");
                None
            }
        }
    }

    pub async fn backups(
        &self,
        domain: Domain,
        options: &FetchOptions,
    ) -> Result<Vec<BackupInfo>, CacheError> {
        self.inner
            .cache
            .backups(&self.resolve_key(domain, options))
            .await
    }

    pub async fn restore_backup(
        &self,
        domain: Domain,
        options: &FetchOptions,
    ) -> Result<bool, CacheError> {
        self.inner
            .cache
            .restore_backup(&self.resolve_key(domain, options))
            .await
    }

    pub async fn recent_syncs(&self, limit: usize) -> Result<Vec<SyncRecord>, CacheError> {
        self.inner.cache.recent_syncs(limit).await
    }

    /// `(domain, source ?? default, patch ?? current ?? latest)`.
    pub fn resolve_key(&self, domain: Domain, options: &FetchOptions) -> CacheKey {
        let source = options.source.unwrap_or(self.inner.config.default_source);
        let patch = options
            .patch
            .clone()
            .or_else(|| self.current_patch())
            .unwrap_or_else(Patch::latest);
        CacheKey::new(domain, source, patch)
    }

    fn sync(&self, key: CacheKey) -> SharedSync {
        let mut inflight = self
            .inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = inflight.get(&key) {
            tracing::debug!(%key, "joining in-flight sync");
            return running.clone();
        }

        let this = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            // Dropped on completion, panic or abort alike.
            let _inflight = InflightEntry {
                orchestrator: this.clone(),
                key: task_key.clone(),
            };
            this.run_sync(&task_key).await
        });

        let shared = async move {
            match task.await {
                Ok(dataset) => dataset,
                Err(error) => {
                    tracing::warn!(%error, "sync task did not complete");
                    None
                }
            }
        }
        .boxed()
        .shared();
        inflight.insert(key, shared.clone());
        shared
    }

    async fn run_sync(&self, key: &CacheKey) -> Option<Dataset> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let outcome = match key.source {
            Source::Provider(provider_id) => self.sync_provider(provider_id, key).await,
            Source::Combined => self.sync_combined(key).await,
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(dataset) => {
                let report = Validator::validate_dataset(&dataset);
                if !report.is_valid {
                    tracing::warn!(
                        %key,
                        violations = report.errors.len(),
                        "validation reported violations"
                    );
                    for violation in &report.errors {
                        tracing::debug!(%key, field = %violation.field, "{}", violation.message);
                    }
                }

                self.store(key, &dataset).await;
                self.record(run_id, key, SyncStatus::Ok, dataset.len(), latency_ms, None)
                    .await;
                tracing::info!(%key, records = dataset.len(), latency_ms, "sync completed");
                Some(dataset)
            }
            Err(error) => {
                tracing::warn!(%key, %error, "sync failed, falling back");
                self.record(
                    run_id,
                    key,
                    SyncStatus::Failed,
                    0,
                    latency_ms,
                    Some(error.to_string()),
                )
                .await;
                None
            }
        }
    }

    async fn sync_provider(
        &self,
        provider_id: ProviderId,
        key: &CacheKey,
    ) -> Result<Dataset, SourceError> {
        let provider = self
            .inner
            .providers
            .iter()
            .find(|provider| provider.id() == provider_id)
            .ok_or_else(|| SourceError::network(format!("{provider_id} is not configured")))?;

        let raw = provider
            .fetch(key.domain, Some(&key.patch))
            .await
            .map_err(|failure| failure.error)?;
        self.normalize(key.domain, &raw, key.source)
    }

    async fn sync_combined(&self, key: &CacheKey) -> Result<Dataset, SourceError> {
        let fetches = self.inner.providers.iter().map(|provider| async move {
            let result = provider.fetch(key.domain, Some(&key.patch)).await;
            (provider.id(), result)
        });

        let mut datasets = Vec::new();
        let mut last_error = None;
        for (provider_id, result) in join_all(fetches).await {
            let normalized = result.map_err(|failure| failure.error).and_then(|raw| {
                self.normalize(key.domain, &raw, Source::Provider(provider_id))
            });
            match normalized {
                Ok(dataset) => datasets.push(dataset),
                Err(error) => {
                    tracing::warn!(%key, provider = %provider_id, %error, "provider left out of merge");
                    last_error = Some(error);
                }
            }
        }

        if datasets.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| SourceError::network("no providers are configured")));
        }
        Ok(merge_datasets(
            key.domain,
            datasets,
            self.inner.config.merge_strategy,
        ))
    }

    fn normalize(
        &self,
        domain: Domain,
        raw: &RawPayload,
        source: Source,
    ) -> Result<Dataset, SourceError> {
        let options = NormalizeOptions {
            normalize_names: self.inner.config.normalize_names,
            source,
        };
        Normalizer::normalize_dataset(domain, raw, &options)
            .map_err(|error| SourceError::normalize(error.to_string()))
    }

    async fn store(&self, key: &CacheKey, dataset: &Dataset) {
        if let Err(error) = self.inner.cache.put(key, dataset).await {
            tracing::warn!(%key, %error, "cache write failed");
        }

        if key.patch.is_latest() {
            if let Some(patch) = named_patch(dataset) {
                let pinned = key.with_patch(patch);
                if let Err(error) = self.inner.cache.put(&pinned, dataset).await {
                    tracing::warn!(key = %pinned, %error, "cache write failed");
                }
            }
            self.adopt_patch(dataset, true);
        }

        self.remember(dataset);
    }

    async fn fallback(&self, key: &CacheKey) -> Option<Dataset> {
        match self.inner.cache.get(key).await {
            Ok(Some(dataset)) => {
                tracing::warn!(%key, saved_at = %dataset.metadata().timestamp, "serving cached data");
                return Some(dataset);
            }
            Ok(None) => {}
            Err(error) => tracing::warn!(%key, %error, "cache read failed"),
        }

        let last_known = self
            .inner
            .last_known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.domain)
            .cloned();
        match &last_known {
            Some(_) => tracing::warn!(%key, "serving last known data"),
            None => tracing::warn!(%key, "no data available"),
        }
        last_known
    }

    async fn record(
        &self,
        run_id: Uuid,
        key: &CacheKey,
        status: SyncStatus,
        records: usize,
        latency_ms: u64,
        message: Option<String>,
    ) {
        let record = SyncRecord {
            run_id,
            domain: key.domain,
            source: key.source,
            patch: key.patch.clone(),
            status,
            records,
            latency_ms,
            message,
            logged_at: UtcDateTime::now(),
        };
        if let Err(error) = self.inner.cache.record_sync(&record).await {
            tracing::warn!(%key, %error, "sync log write failed");
        }
    }

    fn adopt_patch(&self, dataset: &Dataset, overwrite: bool) {
        let Some(patch) = named_patch(dataset) else {
            return;
        };
        let mut current = self
            .inner
            .current_patch
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if overwrite || current.is_none() {
            *current = Some(patch);
        }
    }

    fn remember(&self, dataset: &Dataset) {
        self.inner
            .last_known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dataset.domain(), dataset.clone());
    }
}

/// Clears the single-flight slot of `key` when the sync task ends.
struct InflightEntry {
    orchestrator: SyncOrchestrator,
    key: CacheKey,
}

impl Drop for InflightEntry {
    fn drop(&mut self) {
        self.orchestrator
            .inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

fn named_patch(dataset: &Dataset) -> Option<Patch> {
    dataset
        .metadata()
        .patch
        .as_deref()
        .and_then(|patch| Patch::parse(patch).ok())
        .filter(|patch| !patch.is_latest())
}

fn precedence(provider_id: ProviderId) -> usize {
    ProviderId::ALL
        .iter()
        .position(|candidate| *candidate == provider_id)
        .unwrap_or(ProviderId::ALL.len())
}

/// Builder for [`SyncOrchestrator`].
///
/// ```rust,ignore
/// let orchestrator = SyncOrchestrator::builder()
///     .with_config(SyncConfig::from_env()?)
///     .with_real_clients()?
///     .build();
/// ```
#[derive(Default)]
pub struct SyncOrchestratorBuilder {
    config: SyncConfig,
    providers: Vec<Arc<dyn ProviderClient>>,
    cache: Option<CacheStore>,
}

impl SyncOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_providers(mut self, providers: Vec<Arc<dyn ProviderClient>>) -> Self {
        self.providers = providers;
        self
    }

    /// Providers answering from bundled sample documents.
    pub fn with_offline_fixtures(mut self) -> Self {
        self.providers = offline_clients();
        self
    }

    /// HTTP providers built from the config and `METASYNC_*` overrides.
    pub fn with_real_clients(self) -> Result<Self, ValidationError> {
        let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
        self.with_http_client(http_client)
    }

    pub fn with_http_client(
        mut self,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, ValidationError> {
        self.providers = self
            .config
            .provider_policies_from_env()?
            .into_iter()
            .map(|policy| client_for(policy, Arc::clone(&http_client)))
            .collect();
        Ok(self)
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Without a cache the orchestrator keeps entries in memory.
    pub fn build(self) -> SyncOrchestrator {
        let cache = self
            .cache
            .unwrap_or_else(|| CacheStore::in_memory(self.config.backup_retention));
        SyncOrchestrator::new(self.providers, cache, self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::adapters::MetaTftClient;
    use crate::provider::FetchFailure;

    fn offline() -> SyncOrchestrator {
        SyncOrchestrator::builder().with_offline_fixtures().build()
    }

    struct Unreachable {
        calls: AtomicUsize,
    }

    impl ProviderClient for Unreachable {
        fn id(&self) -> ProviderId {
            ProviderId::TacticsTools
        }

        fn fetch<'a>(
            &'a self,
            _domain: Domain,
            _patch: Option<&'a Patch>,
        ) -> Pin<Box<dyn Future<Output = Result<RawPayload, FetchFailure>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Err(FetchFailure {
                    error: SourceError::network("connection refused"),
                    attempts: 1,
                })
            })
        }
    }

    /// Panics on its first fetch, then serves the MetaTFT fixtures.
    struct PanicsOnce {
        calls: AtomicUsize,
        fixtures: MetaTftClient,
    }

    impl ProviderClient for PanicsOnce {
        fn id(&self) -> ProviderId {
            ProviderId::MetaTft
        }

        fn fetch<'a>(
            &'a self,
            domain: Domain,
            patch: Option<&'a Patch>,
        ) -> Pin<Box<dyn Future<Output = Result<RawPayload, FetchFailure>> + Send + 'a>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("provider blew up");
            }
            self.fixtures.fetch(domain, patch)
        }
    }

    #[tokio::test]
    async fn panicked_sync_does_not_wedge_the_key() {
        let provider = Arc::new(PanicsOnce {
            calls: AtomicUsize::new(0),
            fixtures: MetaTftClient::offline(),
        });
        let orchestrator = SyncOrchestrator::builder()
            .with_provider(provider.clone())
            .build();
        let options = FetchOptions::default().with_source(Source::Provider(ProviderId::MetaTft));

        assert!(orchestrator.get_items(&options).await.is_empty());
        assert!(orchestrator
            .inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty());

        let items = orchestrator.get_items(&options).await;

        assert!(!items.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn latest_sync_pins_the_reported_patch() {
        let orchestrator = offline();
        let options = FetchOptions::default().with_source(Source::Provider(ProviderId::MetaTft));

        let items = orchestrator.get_items(&options).await;

        assert!(!items.is_empty());
        let patch = Patch::parse("14.1").expect("patch");
        assert_eq!(orchestrator.current_patch(), Some(patch.clone()));
        let pinned = CacheKey::new(Domain::Items, Source::Provider(ProviderId::MetaTft), patch);
        assert!(orchestrator
            .cache()
            .is_valid(&pinned, orchestrator.config().cache_max_age)
            .await);
        assert_eq!(
            orchestrator.resolve_key(Domain::Items, &options).patch.as_str(),
            "14.1"
        );
    }

    #[tokio::test]
    async fn combined_merge_survives_a_failing_provider() {
        let failing = Arc::new(Unreachable {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = SyncOrchestrator::builder()
            .with_provider(failing.clone())
            .with_provider(Arc::new(MetaTftClient::offline()))
            .build();

        assert_eq!(
            orchestrator.providers(),
            vec![ProviderId::MetaTft, ProviderId::TacticsTools]
        );
        let comps = orchestrator.get_team_comps(&FetchOptions::default()).await;

        assert!(!comps.is_empty());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        let syncs = orchestrator.recent_syncs(10).await.expect("syncs");
        assert_eq!(syncs[0].status, SyncStatus::Ok);
        assert_eq!(syncs[0].source, Source::Combined);
    }

    #[tokio::test]
    async fn total_failure_with_empty_cache_yields_nothing() {
        let orchestrator = SyncOrchestrator::builder()
            .with_provider(Arc::new(Unreachable {
                calls: AtomicUsize::new(0),
            }))
            .build();

        let augments = orchestrator.get_augments(&FetchOptions::default()).await;

        assert!(augments.is_empty());
        assert!(!orchestrator.is_offline_data_available(None).await);
        let syncs = orchestrator.recent_syncs(1).await.expect("syncs");
        assert_eq!(syncs[0].status, SyncStatus::Failed);
        assert!(syncs[0].message.as_deref().unwrap_or_default().contains("refused"));
    }

    #[tokio::test]
    async fn refresh_all_covers_every_domain() {
        let orchestrator = offline();

        let summary = orchestrator.refresh_all().await;

        assert!(summary.items > 0);
        assert!(summary.team_comps > 0);
        assert!(summary.augments > 0);
        let status = orchestrator.get_cache_status(None).await;
        assert!(status.is_available);
        assert!(status.data_types.team_comps && status.data_types.items && status.data_types.augments);
    }

    #[tokio::test]
    async fn revalidate_and_clear() {
        let orchestrator = offline();
        assert_eq!(
            orchestrator
                .revalidate(Domain::Items, &FetchOptions::default())
                .await,
            None
        );

        orchestrator.get_items(&FetchOptions::default()).await;
        let report = orchestrator
            .revalidate(Domain::Items, &FetchOptions::default())
            .await
            .expect("cached entry");
        assert!(report.is_valid, "{:?}", report.errors);

        orchestrator.clear_cache().await.expect("clear");
        assert_eq!(orchestrator.current_patch(), None);
        assert!(!orchestrator.is_offline_data_available(None).await);
    }
}
