use metasync_core::SyncOrchestrator;
use serde::Serialize;
use serde_json::json;

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceRow {
    id: &'static str,
    precedence: usize,
    api_key_configured: bool,
}

pub fn run(orchestrator: &SyncOrchestrator) -> Result<CommandResult, CliError> {
    let sources: Vec<SourceRow> = orchestrator
        .providers()
        .into_iter()
        .enumerate()
        .map(|(precedence, id)| {
            let key_var = format!("METASYNC_{}_API_KEY", id.env_prefix());
            SourceRow {
                id: id.as_str(),
                precedence,
                api_key_configured: std::env::var_os(key_var)
                    .is_some_and(|value| !value.is_empty()),
            }
        })
        .collect();

    let config = orchestrator.config();
    Ok(CommandResult::ok(json!({
        "sources": serde_json::to_value(sources)?,
        "defaultSource": config.default_source,
        "mergeStrategy": config.merge_strategy,
        "currentPatch": orchestrator.current_patch(),
    })))
}
