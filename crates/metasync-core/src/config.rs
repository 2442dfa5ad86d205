use std::str::FromStr;
use std::time::Duration;

use crate::merge::MergeStrategy;
use crate::provider_policy::ProviderPolicy;
use crate::retry::RetryConfig;
use crate::{ProviderId, Source, ValidationError};

/// Orchestrator-wide settings.
///
/// | Field | Default | Variable |
/// |-------|---------|----------|
/// | `requests_per_minute` | 20 | `METASYNC_REQUESTS_PER_MINUTE` |
/// | `quota_window` | 60s | `METASYNC_QUOTA_WINDOW_MS` |
/// | `max_retries` | 3 | `METASYNC_MAX_RETRIES` |
/// | `retry_delay` | 1000ms | `METASYNC_RETRY_DELAY_MS` |
/// | `request_timeout_ms` | 10000 | `METASYNC_REQUEST_TIMEOUT_MS` |
/// | `cache_max_age` | 24h | `METASYNC_CACHE_MAX_AGE_MS` |
/// | `backup_retention` | 5 | `METASYNC_BACKUP_RETENTION` |
/// | `default_source` | `combined` | `METASYNC_DEFAULT_SOURCE` |
/// | `merge_strategy` | `sample-weight` | `METASYNC_MERGE_STRATEGY` |
/// | `normalize_names` | `true` | `METASYNC_NORMALIZE_NAMES` |
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub requests_per_minute: u32,
    pub quota_window: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout_ms: u64,
    pub cache_max_age: Duration,
    pub backup_retention: usize,
    pub default_source: Source,
    pub merge_strategy: MergeStrategy,
    pub normalize_names: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 20,
            quota_window: Duration::from_secs(60),
            max_retries: 3,
            retry_delay: Duration::from_millis(1_000),
            request_timeout_ms: 10_000,
            cache_max_age: Duration::from_secs(24 * 60 * 60),
            backup_retention: 5,
            default_source: Source::Combined,
            merge_strategy: MergeStrategy::SampleWeight,
            normalize_names: true,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let mut config = Self::default();
        let var = |name: &'static str| (name, lookup(name));

        let (name, value) = var("METASYNC_REQUESTS_PER_MINUTE");
        if let Some(rpm) = parse_var(name, value)? {
            config.requests_per_minute = rpm;
        }
        let (name, value) = var("METASYNC_QUOTA_WINDOW_MS");
        if let Some(ms) = parse_var(name, value)? {
            config.quota_window = Duration::from_millis(ms);
        }
        let (name, value) = var("METASYNC_MAX_RETRIES");
        if let Some(retries) = parse_var(name, value)? {
            config.max_retries = retries;
        }
        let (name, value) = var("METASYNC_RETRY_DELAY_MS");
        if let Some(ms) = parse_var(name, value)? {
            config.retry_delay = Duration::from_millis(ms);
        }
        let (name, value) = var("METASYNC_REQUEST_TIMEOUT_MS");
        if let Some(ms) = parse_var(name, value)? {
            config.request_timeout_ms = ms;
        }
        let (name, value) = var("METASYNC_CACHE_MAX_AGE_MS");
        if let Some(ms) = parse_var(name, value)? {
            config.cache_max_age = Duration::from_millis(ms);
        }
        let (name, value) = var("METASYNC_BACKUP_RETENTION");
        if let Some(count) = parse_var(name, value)? {
            config.backup_retention = count;
        }
        if let Some(source) = lookup("METASYNC_DEFAULT_SOURCE") {
            config.default_source = source.parse()?;
        }
        if let Some(strategy) = lookup("METASYNC_MERGE_STRATEGY") {
            config.merge_strategy = strategy.parse()?;
        }
        let (name, value) = var("METASYNC_NORMALIZE_NAMES");
        if let Some(enabled) = parse_var(name, value)? {
            config.normalize_names = enabled;
        }

        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::exponential(self.max_retries, self.retry_delay)
    }

    /// Provider defaults with this config's pacing and retry knobs applied.
    pub fn base_policy(&self, provider_id: ProviderId) -> ProviderPolicy {
        ProviderPolicy {
            requests_per_minute: self.requests_per_minute,
            quota_window: self.quota_window,
            retry: self.retry_config(),
            timeout_ms: self.request_timeout_ms,
            ..ProviderPolicy::default_for(provider_id)
        }
    }

    /// Policies for every provider, with per-provider environment overrides.
    pub fn provider_policies_from_env(&self) -> Result<Vec<ProviderPolicy>, ValidationError> {
        ProviderId::ALL
            .into_iter()
            .map(|id| {
                self.base_policy(id)
                    .with_env_overrides(|name| std::env::var(name).ok())
            })
            .collect()
    }
}

/// Parses an optional variable, treating blank values as unset.
pub(crate) fn parse_var<T: FromStr>(
    name: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ValidationError::InvalidEnvValue {
            name,
            value: trimmed.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<SyncConfig, ValidationError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        SyncConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(config_from(&[]).expect("config"), SyncConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("METASYNC_CACHE_MAX_AGE_MS", "60000"),
            ("METASYNC_DEFAULT_SOURCE", "metatft"),
            ("METASYNC_MERGE_STRATEGY", "precedence"),
            ("METASYNC_NORMALIZE_NAMES", "false"),
            ("METASYNC_MAX_RETRIES", " "),
        ])
        .expect("config");

        assert_eq!(config.cache_max_age, Duration::from_secs(60));
        assert_eq!(config.default_source, Source::Provider(ProviderId::MetaTft));
        assert_eq!(config.merge_strategy, MergeStrategy::Precedence);
        assert!(!config.normalize_names);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let error = config_from(&[("METASYNC_BACKUP_RETENTION", "-1")]).expect_err("must fail");
        assert_eq!(
            error,
            ValidationError::InvalidEnvValue {
                name: "METASYNC_BACKUP_RETENTION",
                value: String::from("-1"),
            }
        );
    }

    #[test]
    fn base_policy_carries_retry_knobs() {
        let config = SyncConfig {
            retry_delay: Duration::from_millis(250),
            max_retries: 1,
            ..SyncConfig::default()
        };
        let policy = config.base_policy(ProviderId::TacticsTools);

        assert_eq!(policy.retry.max_attempts(), 2);
        assert_eq!(policy.retry.delay_for_attempt(1), Duration::from_millis(500));
        assert!(policy.base_url.contains("tactics.tools"));
    }
}
