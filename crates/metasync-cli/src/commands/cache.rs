use metasync_core::{Domain, Patch, SyncOrchestrator};
use serde_json::json;

use crate::cli::{BackupsArgs, HistoryArgs, PatchArgs};
use crate::error::CliError;

use super::{fetch_options, CommandResult};

pub async fn status(
    args: &PatchArgs,
    orchestrator: &SyncOrchestrator,
) -> Result<CommandResult, CliError> {
    let patch = args.patch.as_deref().map(Patch::parse).transpose()?;
    let status = orchestrator.get_cache_status(patch.as_ref()).await;
    Ok(CommandResult::ok(serde_json::to_value(status)?))
}

pub async fn clear(
    args: &PatchArgs,
    orchestrator: &SyncOrchestrator,
) -> Result<CommandResult, CliError> {
    match args.patch.as_deref().map(Patch::parse).transpose()? {
        Some(patch) => {
            let removed = orchestrator.clear_patch_cache(&patch).await?;
            Ok(CommandResult::ok(json!({ "patch": patch, "removed": removed })))
        }
        None => {
            orchestrator.clear_cache().await?;
            Ok(CommandResult::ok(json!({ "cleared": true })))
        }
    }
}

pub async fn backups(
    args: &BackupsArgs,
    orchestrator: &SyncOrchestrator,
) -> Result<CommandResult, CliError> {
    let domain: Domain = args.entry.domain.parse()?;
    let options = fetch_options(args.entry.source, args.entry.patch.as_deref(), false)?;
    let key = orchestrator.resolve_key(domain, &options);

    let mut result_warning = None;
    let restored = if args.restore {
        let restored = orchestrator.restore_backup(domain, &options).await?;
        if !restored {
            result_warning = Some(format!("{key} has no backup to restore"));
        }
        Some(restored)
    } else {
        None
    };
    let backups = orchestrator.backups(domain, &options).await?;

    let mut result = CommandResult::ok(json!({
        "key": key.to_string(),
        "restored": restored,
        "backups": backups,
    }));
    if let Some(warning) = result_warning {
        result = result.with_warning(warning);
    }
    Ok(result)
}

pub async fn history(
    args: &HistoryArgs,
    orchestrator: &SyncOrchestrator,
) -> Result<CommandResult, CliError> {
    let syncs = orchestrator.recent_syncs(args.limit).await?;
    Ok(CommandResult::ok(serde_json::to_value(syncs)?))
}
