//! # Metasync Core
//!
//! Sync pipeline for Teamfight Tactics metagame data: team compositions,
//! items and augments pulled from community statistics providers, mapped onto
//! one canonical model, validated, and cached per patch.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | MetaTFT and tactics.tools clients and raw payload shapes |
//! | [`cache`] | Versioned cache with backups (memory or DuckDB backend) |
//! | [`config`] | Orchestrator settings from `METASYNC_*` variables |
//! | [`domain`] | Canonical models, cache keys, timestamps |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`merge`] | Combined-source merge by id |
//! | [`normalizer`] | Raw payload to canonical model |
//! | [`orchestrator`] | Cache-first, single-flight sync with fallback |
//! | [`provider`] | Provider contract and shared transport |
//! | [`provider_policy`] | Per-provider URL, key, pacing and retry |
//! | [`retry`] | Retry with backoff |
//! | [`scheduler`] | Periodic refresh |
//! | [`source`] | Provider and source identifiers |
//! | [`throttling`] | Per-provider rate-limited FIFO queue |
//! | [`validator`] | Advisory model validation |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use metasync_core::{FetchOptions, SyncOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = SyncOrchestrator::builder().with_real_clients()?.build();
//!
//!     for comp in orchestrator.get_team_comps(&FetchOptions::default()).await {
//!         println!("{} ({:.2})", comp.name, comp.avg_placement);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │ SyncOrchestrator │────▶│ CacheStore       │──▶ memory / DuckDB
//! └────────┬─────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │ ProviderClient   │────▶│ RateLimitedQueue │
//! │ (retry/backoff)  │     │ + HttpClient     │
//! └────────┬─────────┘     └──────────────────┘
//!          │ RawPayload
//!          ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │ Normalizer       │────▶│ Validator        │
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! ## Security
//!
//! - API keys come from the environment and are never logged
//! - Transport errors are stripped of request URLs, which carry the key

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod merge;
pub mod normalizer;
pub mod orchestrator;
pub mod provider;
pub mod provider_policy;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod throttling;
pub mod validator;

// Provider clients
pub use adapters::{MetaTftClient, TacticsToolsClient};

// Caching
pub use cache::{
    BackupInfo, CacheBackend, CacheError, CacheStatus, CacheStore, DataTypes,
    MemoryCacheBackend, SyncRecord, SyncStatus,
};

pub use config::SyncConfig;

// Domain models
pub use domain::{
    Augment, AugmentTier, CacheKey, Canonical, Champion, DataModel, Dataset, Domain, Item,
    ModelMetadata, Patch, TeamComp, UtcDateTime, SCHEMA_VERSION,
};

// Error types
pub use error::{CoreError, ValidationError};

// HTTP client types
pub use http_client::{
    FixtureHttpClient, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
};

pub use merge::MergeStrategy;
pub use normalizer::{NormalizeError, NormalizeOptions, Normalizer};

// Orchestration
pub use orchestrator::{FetchOptions, RefreshSummary, SyncOrchestrator, SyncOrchestratorBuilder};
pub use scheduler::{RefreshScheduler, SchedulerHandle};

// Providers
pub use provider::{
    FetchFailure, ProviderClient, ProviderTransport, RawPayload, SourceError, SourceErrorKind,
};
pub use provider_policy::ProviderPolicy;

// Retry logic
pub use retry::{Backoff, RetryConfig, RetryExhausted};

// Source identifiers
pub use source::{ProviderId, Source};

pub use throttling::RateLimitedQueue;
pub use validator::{FieldViolation, Validate, ValidationReport, Validator};

// Warehouse (re-exported from metasync-warehouse)
pub use metasync_warehouse::{Warehouse, WarehouseConfig, WarehouseError};
