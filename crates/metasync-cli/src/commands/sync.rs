use std::time::Duration;

use metasync_core::{RefreshScheduler, SyncOrchestrator};
use serde_json::json;

use crate::cli::WatchArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(orchestrator: &SyncOrchestrator) -> Result<CommandResult, CliError> {
    let summary = orchestrator.refresh_all().await;
    let available = orchestrator
        .is_offline_data_available(summary.patch.as_ref())
        .await;

    let mut result = CommandResult::ok(serde_json::to_value(&summary)?);
    if !summary.item_references.is_valid {
        result = result.with_warning(format!(
            "{} unit item(s) missing from the item catalog",
            summary.item_references.errors.len()
        ));
    }
    if !available {
        result = result.degraded("no provider answered and the cache is empty");
    }
    Ok(result)
}

pub async fn watch(
    args: &WatchArgs,
    orchestrator: &SyncOrchestrator,
) -> Result<CommandResult, CliError> {
    let scheduler =
        RefreshScheduler::new(orchestrator.clone(), Duration::from_secs(args.interval_secs));
    tracing::info!(interval_secs = scheduler.interval().as_secs(), "watching");
    let handle = scheduler.start();

    tokio::signal::ctrl_c().await?;
    let runs = handle.stop().await;

    Ok(CommandResult::ok(json!({
        "runs": runs,
        "patch": orchestrator.current_patch(),
    })))
}
