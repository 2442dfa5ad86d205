//! Provider client contract and the shared HTTP transport behind it.
//!
//! Every provider owns exactly one [`RateLimitedQueue`]; each attempt of a
//! fetch goes through that queue, and failed attempts are retried with the
//! policy's backoff by [`retry_with_backoff`].

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;

use crate::adapters::metatft::MetaTftPayload;
use crate::adapters::tacticstools::TacticsToolsPayload;
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::retry::retry_with_backoff;
use crate::throttling::RateLimitedQueue;
use crate::{Domain, Patch, ProviderId};

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Transport failure before any response arrived.
    Network,
    /// Non-2xx response.
    Provider,
    /// Response body did not match the provider's asserted shape.
    Decode,
    /// Payload decoded but could not be mapped to the canonical model.
    Normalize,
}

/// Structured provider error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    status: Option<u16>,
}

impl SourceError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Network,
            message: message.into(),
            status: None,
        }
    }

    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Provider,
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Decode,
            message: message.into(),
            status: None,
        }
    }

    pub fn normalize(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Normalize,
            message: message.into(),
            status: None,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Network => "source.network",
            SourceErrorKind::Provider => "source.provider",
            SourceErrorKind::Decode => "source.decode",
            SourceErrorKind::Normalize => "source.normalize",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// A fetch that failed on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub error: SourceError,
    pub attempts: u32,
}

impl FetchFailure {
    pub const fn status(&self) -> Option<u16> {
        self.error.status()
    }
}

impl Display for FetchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} after {} attempt(s)", self.error, self.attempts)
    }
}

impl std::error::Error for FetchFailure {}

/// Undecoded-into-canonical provider response, one variant per provider shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    MetaTft(MetaTftPayload),
    TacticsTools(TacticsToolsPayload),
}

impl RawPayload {
    pub fn domain(&self) -> Domain {
        match self {
            Self::MetaTft(payload) => payload.domain(),
            Self::TacticsTools(payload) => payload.domain(),
        }
    }

    pub fn patch(&self) -> Option<&str> {
        match self {
            Self::MetaTft(payload) => payload.patch(),
            Self::TacticsTools(payload) => payload.patch(),
        }
    }

    pub fn provider(&self) -> ProviderId {
        match self {
            Self::MetaTft(_) => ProviderId::MetaTft,
            Self::TacticsTools(_) => ProviderId::TacticsTools,
        }
    }
}

/// Upstream provider contract.
///
/// Implementations never panic and never surface transport errors directly:
/// every failure is reported as a [`FetchFailure`] once retries are spent.
pub trait ProviderClient: Send + Sync {
    fn id(&self) -> ProviderId;

    fn fetch<'a>(
        &'a self,
        domain: Domain,
        patch: Option<&'a Patch>,
    ) -> Pin<Box<dyn Future<Output = Result<RawPayload, FetchFailure>> + Send + 'a>>;
}

/// Queue, retry and HTTP plumbing shared by the concrete providers.
#[derive(Clone)]
pub struct ProviderTransport {
    policy: ProviderPolicy,
    http_client: Arc<dyn HttpClient>,
    queue: RateLimitedQueue,
}

impl ProviderTransport {
    pub fn new(policy: ProviderPolicy, http_client: Arc<dyn HttpClient>) -> Self {
        let queue = RateLimitedQueue::from_policy(&policy);
        Self {
            policy,
            http_client,
            queue,
        }
    }

    /// Replace the queue built from the policy.
    pub fn with_queue(mut self, queue: RateLimitedQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn policy(&self) -> &ProviderPolicy {
        &self.policy
    }

    pub fn queue(&self) -> &RateLimitedQueue {
        &self.queue
    }

    /// `{base_url}/{comps|items|augments}` with optional `patch` and `apiKey`.
    pub fn endpoint_url(&self, domain: Domain, patch: Option<&Patch>) -> String {
        let mut url = format!(
            "{}/{}",
            self.policy.base_url.trim_end_matches('/'),
            domain.endpoint_path()
        );

        let mut query = Vec::new();
        if let Some(patch) = patch.filter(|patch| !patch.is_latest()) {
            query.push(format!("patch={}", urlencoding::encode(patch.as_str())));
        }
        if let Some(api_key) = self.policy.api_key.as_deref() {
            query.push(format!("apiKey={}", urlencoding::encode(api_key)));
        }
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }

        url
    }

    /// Fetches and decodes one domain, retrying every kind of failure.
    pub async fn fetch_json<T: DeserializeOwned + Send>(
        &self,
        domain: Domain,
        patch: Option<&Patch>,
    ) -> Result<T, FetchFailure> {
        let provider = self.policy.provider_id;
        let request = HttpRequest::get(self.endpoint_url(domain, patch))
            .with_header("accept", "application/json")
            .with_timeout_ms(self.policy.timeout_ms);
        let started = Instant::now();

        let result = retry_with_backoff(&self.policy.retry, |attempt| {
            let request = request.clone();
            async move {
                tracing::debug!(%provider, %domain, attempt, "fetching");
                self.queue
                    .enqueue(|| self.attempt::<T>(request))
                    .await
            }
        })
        .await;

        match result {
            Ok(payload) => {
                tracing::debug!(
                    %provider,
                    %domain,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "fetch succeeded"
                );
                Ok(payload)
            }
            Err(exhausted) => {
                tracing::warn!(
                    %provider,
                    %domain,
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "fetch failed"
                );
                Err(FetchFailure {
                    error: exhausted.error,
                    attempts: exhausted.attempts,
                })
            }
        }
    }

    async fn attempt<T: DeserializeOwned + Send>(&self, request: HttpRequest) -> Result<T, SourceError> {
        let provider = self.policy.provider_id;
        let response = self.http_client.execute(request).await.map_err(|error| {
            SourceError::network(format!("{provider} transport error: {}", error.message()))
        })?;

        if !response.is_success() {
            return Err(SourceError::provider(
                response.status,
                format!("{provider} returned status {}", response.status),
            ));
        }

        serde_json::from_str(&response.body).map_err(|error| {
            SourceError::decode(format!("failed to decode {provider} response: {error}"))
        })
    }
}
