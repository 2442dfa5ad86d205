mod cache;
mod fetch;
mod sources;
mod sync;
mod validate;

use std::sync::Arc;
use std::time::Instant;

use metasync_core::{
    CacheStore, Dataset, Domain, FetchOptions, Patch, SyncConfig, SyncOrchestrator, UtcDateTime,
    ValidationError, Warehouse, WarehouseConfig,
};
use serde_json::Value;
use uuid::Uuid;

use crate::cli::{Cli, Command, SourceSelector};
use crate::error::CliError;
use crate::output::{Output, OutputMeta};

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub degraded: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            degraded: false,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn degraded(mut self, reason: impl Into<String>) -> Self {
        self.degraded = true;
        self.with_warning(reason)
    }
}

pub async fn run(cli: &Cli) -> Result<Output, CliError> {
    let started = Instant::now();
    let orchestrator = build_orchestrator(cli)?;

    let (command, result) = match &cli.command {
        Command::Comps(args) => {
            ("comps", fetch::run(Domain::TeamComps, args, &orchestrator).await?)
        }
        Command::Items(args) => ("items", fetch::run(Domain::Items, args, &orchestrator).await?),
        Command::Augments(args) => {
            ("augments", fetch::run(Domain::Augments, args, &orchestrator).await?)
        }
        Command::Sync => ("sync", sync::run(&orchestrator).await?),
        Command::Watch(args) => ("watch", sync::watch(args, &orchestrator).await?),
        Command::Status(args) => ("status", cache::status(args, &orchestrator).await?),
        Command::Clear(args) => ("clear", cache::clear(args, &orchestrator).await?),
        Command::Backups(args) => ("backups", cache::backups(args, &orchestrator).await?),
        Command::History(args) => ("history", cache::history(args, &orchestrator).await?),
        Command::Validate(args) => ("validate", validate::run(args, &orchestrator).await?),
        Command::Sources => ("sources", sources::run(&orchestrator)?),
    };

    let CommandResult {
        data,
        warnings,
        degraded,
    } = result;

    Ok(Output {
        meta: OutputMeta {
            request_id: Uuid::new_v4(),
            command,
            generated_at: UtcDateTime::now(),
            latency_ms: started.elapsed().as_millis() as u64,
            degraded,
            warnings,
        },
        data,
    })
}

fn build_orchestrator(cli: &Cli) -> Result<SyncOrchestrator, CliError> {
    let config = SyncConfig::from_env()?;

    let cache = if cli.ephemeral {
        CacheStore::in_memory(config.backup_retention)
    } else {
        let warehouse_config = match &cli.home {
            Some(home) => WarehouseConfig::at_home(home.clone()),
            None => WarehouseConfig::default(),
        };
        let warehouse = Warehouse::open(warehouse_config)?;
        tracing::debug!(path = %warehouse.db_path().display(), "warehouse opened");
        CacheStore::new(Arc::new(warehouse), config.backup_retention)
    };

    let builder = SyncOrchestrator::builder()
        .with_config(config)
        .with_cache(cache);
    let builder = if cli.offline {
        builder.with_offline_fixtures()
    } else {
        builder.with_real_clients()?
    };

    Ok(builder.build())
}

pub(crate) fn fetch_options(
    source: Option<SourceSelector>,
    patch: Option<&str>,
    force_refresh: bool,
) -> Result<FetchOptions, ValidationError> {
    Ok(FetchOptions {
        source: source.map(Into::into),
        patch: patch.map(Patch::parse).transpose()?,
        force_refresh,
    })
}

pub(crate) fn dataset_value(dataset: &Dataset) -> Result<Value, serde_json::Error> {
    match dataset {
        Dataset::TeamComps(model) => serde_json::to_value(model),
        Dataset::Items(model) => serde_json::to_value(model),
        Dataset::Augments(model) => serde_json::to_value(model),
    }
}
