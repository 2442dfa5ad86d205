use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metasync_core::{
    Domain, HttpClient, HttpError, HttpRequest, HttpResponse, MetaTftClient, NormalizeOptions,
    Normalizer, ProviderClient, ProviderId, ProviderPolicy, RateLimitedQueue, RetryConfig, Source,
    SourceErrorKind, TacticsToolsClient, Validator,
};
use tokio::time::Instant;

struct ProviderCase {
    id: ProviderId,
    client: Arc<dyn ProviderClient>,
}

fn provider_cases() -> Vec<ProviderCase> {
    vec![
        ProviderCase {
            id: ProviderId::MetaTft,
            client: Arc::new(MetaTftClient::offline()),
        },
        ProviderCase {
            id: ProviderId::TacticsTools,
            client: Arc::new(TacticsToolsClient::offline()),
        },
    ]
}

/// Answers every request with 503 and records when each attempt started.
#[derive(Default)]
struct AlwaysUnavailable {
    attempts: Mutex<Vec<Instant>>,
}

impl HttpClient for AlwaysUnavailable {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.attempts.lock().expect("attempts").push(Instant::now());
        Box::pin(async { Ok(HttpResponse::with_status(503, "unavailable")) })
    }
}

#[tokio::test]
async fn every_provider_serves_every_domain() {
    for case in provider_cases() {
        assert_eq!(case.client.id(), case.id);

        for domain in Domain::ALL {
            let raw = case
                .client
                .fetch(domain, None)
                .await
                .unwrap_or_else(|failure| panic!("{} {domain} fetch failed: {failure}", case.id));
            assert_eq!(raw.domain(), domain, "provider '{}': domain", case.id);
            assert_eq!(raw.provider(), case.id, "provider '{}': variant", case.id);

            let options = NormalizeOptions {
                normalize_names: true,
                source: Source::Provider(case.id),
            };
            let dataset = Normalizer::normalize_dataset(domain, &raw, &options)
                .unwrap_or_else(|error| panic!("{} {domain} normalize failed: {error}", case.id));

            assert!(!dataset.is_empty(), "provider '{}' {domain}: records", case.id);
            assert_eq!(dataset.metadata().patch.as_deref(), Some("14.1"));
            assert_eq!(dataset.metadata().source, Source::Provider(case.id));

            let report = Validator::validate_dataset(&dataset);
            assert!(
                report.is_valid,
                "provider '{}' {domain}: {:?}",
                case.id, report.errors
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn failing_provider_retries_with_exponential_backoff() {
    let http = Arc::new(AlwaysUnavailable::default());
    let policy = ProviderPolicy {
        retry: RetryConfig::exponential(3, Duration::from_millis(1_000)),
        ..ProviderPolicy::metatft_default()
    };
    let client = MetaTftClient::new(policy, http.clone())
        .with_queue(RateLimitedQueue::new(1_000, Duration::from_secs(1)));

    let failure = client
        .fetch(Domain::TeamComps, None)
        .await
        .expect_err("provider never succeeds");

    assert_eq!(failure.attempts, 4);
    assert_eq!(failure.error.kind(), SourceErrorKind::Provider);
    assert_eq!(failure.status(), Some(503));

    let attempts = http.attempts.lock().expect("attempts").clone();
    assert_eq!(attempts.len(), 4);
    for (index, expected) in [1_000, 2_000, 4_000].into_iter().enumerate() {
        let gap = attempts[index + 1] - attempts[index];
        assert!(
            gap >= Duration::from_millis(expected),
            "gap {index} was {gap:?}, expected at least {expected}ms"
        );
    }
}

#[test]
fn policy_debug_output_redacts_api_key() {
    let policy = ProviderPolicy {
        api_key: Some(String::from("super-secret")),
        ..ProviderPolicy::tacticstools_default()
    };

    let rendered = format!("{policy:?}");
    assert!(!rendered.contains("super-secret"));
    assert!(rendered.contains("<redacted>"));
}
