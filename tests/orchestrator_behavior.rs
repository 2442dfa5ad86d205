use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metasync_core::{
    CacheKey, CacheStore, Domain, FetchOptions, FixtureHttpClient, HttpClient, HttpError,
    HttpRequest, HttpResponse, MetaTftClient, Patch, ProviderClient, ProviderId, ProviderPolicy,
    RateLimitedQueue, RetryConfig, Source, SyncConfig, SyncOrchestrator, SyncStatus,
    TacticsToolsClient,
};
use serde_json::Value;

const METATFT_ITEMS: &str = r#"{
  "patch": "14.1",
  "items": [
    {"item_id": "X", "name": "Old", "is_component": true},
    {"item_id": "A", "name": "Only MetaTFT", "is_component": true, "frequency": 0.1}
  ]
}"#;

const TACTICSTOOLS_ITEMS: &str = r#"{
  "data": {
    "patch": "14.1",
    "items": [
      {"id": "X", "name": "New", "stats": {"frequency": 0.3}},
      {"id": "B", "name": "Only Tactics", "stats": {"frequency": 0.2}}
    ]
  }
}"#;

const OUT_OF_RANGE_COMPS: &str = r#"{
  "patch": "14.1",
  "comps": [
    {
      "comp_id": "c1",
      "name": "Broken Placement",
      "units": [{"character_id": "TFT11_Yasuo", "cost": 1}],
      "avg_place": 9,
      "play_rate": 5.0,
      "win_rate": 10.0
    }
  ]
}"#;

/// Wraps fixtures with a call counter, a delay and an optional outage.
struct CountingHttp {
    fixtures: FixtureHttpClient,
    calls: AtomicUsize,
    delay: Duration,
    healthy_calls: usize,
}

impl CountingHttp {
    fn new(fixtures: FixtureHttpClient) -> Self {
        Self {
            fixtures,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            healthy_calls: usize::MAX,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails every call after the first `count`.
    fn healthy_for(mut self, count: usize) -> Self {
        self.healthy_calls = count;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpClient for CountingHttp {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            if call >= self.healthy_calls {
                return Err(HttpError::new("connection reset"));
            }
            self.fixtures.execute(request).await
        })
    }
}

fn policy(provider_id: ProviderId) -> ProviderPolicy {
    ProviderPolicy {
        base_url: format!("fixture://{provider_id}"),
        retry: RetryConfig::no_retry(),
        ..ProviderPolicy::default_for(provider_id)
    }
}

fn fast_queue() -> RateLimitedQueue {
    RateLimitedQueue::new(1_000, Duration::from_secs(1))
}

fn metatft(http: Arc<CountingHttp>) -> Arc<dyn ProviderClient> {
    Arc::new(MetaTftClient::new(policy(ProviderId::MetaTft), http).with_queue(fast_queue()))
}

fn tacticstools(http: Arc<CountingHttp>) -> Arc<dyn ProviderClient> {
    Arc::new(
        TacticsToolsClient::new(policy(ProviderId::TacticsTools), http).with_queue(fast_queue()),
    )
}

fn metatft_only() -> FetchOptions {
    FetchOptions::default().with_source(Source::Provider(ProviderId::MetaTft))
}

#[tokio::test]
async fn concurrent_cold_reads_share_one_fetch() {
    let http = Arc::new(
        CountingHttp::new(metasync_core::adapters::metatft::fixtures())
            .with_delay(Duration::from_millis(50)),
    );
    let orchestrator = SyncOrchestrator::builder()
        .with_provider(metatft(Arc::clone(&http)))
        .build();
    let options = metatft_only();

    let (first, second) = tokio::join!(
        orchestrator.get_items(&options),
        orchestrator.get_items(&options)
    );

    assert_eq!(http.calls(), 1);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn abandoned_caller_does_not_cancel_the_sync() {
    let http = Arc::new(
        CountingHttp::new(metasync_core::adapters::metatft::fixtures())
            .with_delay(Duration::from_millis(50)),
    );
    let orchestrator = SyncOrchestrator::builder()
        .with_provider(metatft(Arc::clone(&http)))
        .build();

    let caller = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.get_items(&metatft_only()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    caller.abort();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let key = CacheKey::new(
        Domain::Items,
        Source::Provider(ProviderId::MetaTft),
        Patch::latest(),
    );
    assert!(orchestrator
        .cache()
        .is_valid(&key, Duration::from_secs(60))
        .await);
    assert_eq!(http.calls(), 1);
}

#[tokio::test]
async fn forced_refresh_falls_back_to_cached_data() {
    let http = Arc::new(
        CountingHttp::new(metasync_core::adapters::metatft::fixtures()).healthy_for(1),
    );
    let orchestrator = SyncOrchestrator::builder()
        .with_provider(metatft(Arc::clone(&http)))
        .build();

    let cached = orchestrator.get_items(&metatft_only()).await;
    assert!(!cached.is_empty());

    let refreshed = orchestrator
        .get_items(&FetchOptions {
            force_refresh: true,
            ..metatft_only()
        })
        .await;

    assert_eq!(http.calls(), 2);
    assert_eq!(refreshed, cached);
    let syncs = orchestrator.recent_syncs(2).await.expect("sync log");
    assert_eq!(syncs[0].status, SyncStatus::Failed);
    assert_eq!(syncs[1].status, SyncStatus::Ok);
}

#[tokio::test]
async fn stale_entry_is_served_when_the_provider_is_down() {
    let http = Arc::new(
        CountingHttp::new(metasync_core::adapters::metatft::fixtures()).healthy_for(1),
    );
    let config = SyncConfig {
        cache_max_age: Duration::ZERO,
        ..SyncConfig::default()
    };
    let orchestrator = SyncOrchestrator::builder()
        .with_config(config)
        .with_provider(metatft(Arc::clone(&http)))
        .with_cache(CacheStore::in_memory(5))
        .build();

    let first = orchestrator.get_augments(&metatft_only()).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = orchestrator.get_augments(&metatft_only()).await;

    assert_eq!(http.calls(), 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn combined_merge_prefers_reported_sample_weight() {
    let metatft_http = Arc::new(CountingHttp::new(
        FixtureHttpClient::new().with_body("items", METATFT_ITEMS),
    ));
    let tacticstools_http = Arc::new(CountingHttp::new(
        FixtureHttpClient::new().with_body("items", TACTICSTOOLS_ITEMS),
    ));
    let orchestrator = SyncOrchestrator::builder()
        .with_provider(tacticstools(tacticstools_http))
        .with_provider(metatft(metatft_http))
        .build();

    let items = orchestrator
        .get_items(&FetchOptions::default().with_source(Source::Combined))
        .await;

    let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["X", "A", "B"]);
    assert_eq!(items[0].name, "New");
    assert_eq!(items[0].frequency, Some(0.3));
}

#[tokio::test]
async fn out_of_range_records_are_reported_and_stored() {
    let http = Arc::new(CountingHttp::new(
        FixtureHttpClient::new().with_body("comps", OUT_OF_RANGE_COMPS),
    ));
    let orchestrator = SyncOrchestrator::builder()
        .with_provider(metatft(http))
        .build();
    let options = metatft_only();

    let comps = orchestrator.get_team_comps(&options).await;
    assert_eq!(comps.len(), 1);
    assert_eq!(comps[0].avg_placement, 9.0);

    let report = orchestrator
        .revalidate(Domain::TeamComps, &options)
        .await
        .expect("entry was stored");
    assert!(!report.is_valid);
    assert_eq!(report.errors[0].field, "data[0].avgPlacement");
    assert_eq!(report.errors[0].value, Some(Value::from(9.0)));
}

#[tokio::test]
async fn status_distinguishes_empty_cache_from_empty_data() {
    let http = Arc::new(CountingHttp::new(FixtureHttpClient::new()));
    let orchestrator = SyncOrchestrator::builder()
        .with_provider(metatft(http))
        .build();

    let items = orchestrator.get_items(&metatft_only()).await;

    assert!(items.is_empty());
    let status = orchestrator.get_cache_status(None).await;
    assert!(!status.is_available);
    assert_eq!(status.last_updated, None);
}
