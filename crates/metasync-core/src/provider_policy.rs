use std::time::Duration;

use crate::config::parse_var;
use crate::retry::RetryConfig;
use crate::{ProviderId, ValidationError};

/// Connection, pacing and retry settings for one provider.
#[derive(Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub base_url: String,
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
    /// Rolling window the request budget applies to.
    pub quota_window: Duration,
    pub retry: RetryConfig,
    pub timeout_ms: u64,
}

impl std::fmt::Debug for ProviderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPolicy")
            .field("provider_id", &self.provider_id)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("requests_per_minute", &self.requests_per_minute)
            .field("quota_window", &self.quota_window)
            .field("retry", &self.retry)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ProviderPolicy {
    pub fn metatft_default() -> Self {
        Self {
            provider_id: ProviderId::MetaTft,
            base_url: String::from("https://api.metatft.com/v1"),
            api_key: None,
            requests_per_minute: 20,
            quota_window: Duration::from_secs(60),
            retry: RetryConfig::default(),
            timeout_ms: 10_000,
        }
    }

    pub fn tacticstools_default() -> Self {
        Self {
            provider_id: ProviderId::TacticsTools,
            base_url: String::from("https://api.tactics.tools/v1"),
            ..Self::metatft_default()
        }
    }

    /// Policy for clients answering from bundled fixtures: no upstream to
    /// protect, so the queue only spaces starts by a millisecond.
    pub fn offline(provider_id: ProviderId) -> Self {
        Self {
            base_url: format!("fixture://{provider_id}"),
            requests_per_minute: 60_000,
            quota_window: Duration::from_secs(60),
            ..Self::default_for(provider_id)
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::MetaTft => Self::metatft_default(),
            ProviderId::TacticsTools => Self::tacticstools_default(),
        }
    }

    /// Defaults overridden by `METASYNC_<PROVIDER>_BASE_URL`, `_API_KEY` and
    /// `_REQUESTS_PER_MINUTE`.
    pub fn from_env(provider_id: ProviderId) -> Result<Self, ValidationError> {
        Self::from_lookup(provider_id, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        provider_id: ProviderId,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ValidationError> {
        Self::default_for(provider_id).with_env_overrides(lookup)
    }

    /// Applies the provider's `METASYNC_<PROVIDER>_*` variables on top of `self`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ValidationError> {
        let provider_id = self.provider_id;
        let prefix = provider_id.env_prefix();

        if let Some(base_url) = lookup(&format!("METASYNC_{prefix}_BASE_URL")) {
            let trimmed = base_url.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                self.base_url = trimmed.to_owned();
            }
        }

        if let Some(key) = lookup(&format!("METASYNC_{prefix}_API_KEY")) {
            let key = key.trim();
            self.api_key = (!key.is_empty()).then(|| key.to_owned());
        }

        let rpm_name = match provider_id {
            ProviderId::MetaTft => "METASYNC_METATFT_REQUESTS_PER_MINUTE",
            ProviderId::TacticsTools => "METASYNC_TACTICSTOOLS_REQUESTS_PER_MINUTE",
        };
        if let Some(rpm) = parse_var::<u32>(rpm_name, lookup(rpm_name))? {
            self.requests_per_minute = rpm;
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let policy = ProviderPolicy::metatft_default();

        assert_eq!(policy.requests_per_minute, 20);
        assert_eq!(policy.quota_window, Duration::from_secs(60));
        assert_eq!(policy.retry.max_retries, 3);
        assert_eq!(policy.retry.delay_for_attempt(0), Duration::from_secs(1));
        assert!(policy.api_key.is_none());
    }

    #[test]
    fn lookup_overrides_and_redacts_key() {
        let vars = HashMap::from([
            ("METASYNC_TACTICSTOOLS_BASE_URL", "http://localhost:9000/"),
            ("METASYNC_TACTICSTOOLS_API_KEY", "secret-key"),
            ("METASYNC_TACTICSTOOLS_REQUESTS_PER_MINUTE", "5"),
        ]);
        let policy = ProviderPolicy::from_lookup(ProviderId::TacticsTools, |name| {
            vars.get(name).map(|value| (*value).to_owned())
        })
        .expect("policy");

        assert_eq!(policy.base_url, "http://localhost:9000");
        assert_eq!(policy.api_key.as_deref(), Some("secret-key"));
        assert_eq!(policy.requests_per_minute, 5);
        assert!(!format!("{policy:?}").contains("secret-key"));
    }

    #[test]
    fn rejects_non_numeric_rate() {
        let error = ProviderPolicy::from_lookup(ProviderId::MetaTft, |name| {
            (name == "METASYNC_METATFT_REQUESTS_PER_MINUTE").then(|| String::from("fast"))
        })
        .expect_err("must fail");

        assert!(matches!(error, ValidationError::InvalidEnvValue { .. }));
    }
}
