use metasync_core::{Domain, SyncOrchestrator};
use serde_json::json;

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::{dataset_value, fetch_options, CommandResult};

pub async fn run(
    domain: Domain,
    args: &FetchArgs,
    orchestrator: &SyncOrchestrator,
) -> Result<CommandResult, CliError> {
    let options = fetch_options(args.source, args.patch.as_deref(), args.refresh)?;
    let key = orchestrator.resolve_key(domain, &options);

    match orchestrator.get_dataset(domain, &options).await {
        Some(dataset) => {
            let mut result = CommandResult::ok(dataset_value(&dataset)?);
            if dataset.metadata().timestamp.age() > orchestrator.config().cache_max_age {
                result = result.with_warning(format!(
                    "serving stale data for {key} saved at {}",
                    dataset.metadata().timestamp
                ));
            }
            Ok(result)
        }
        None => Ok(CommandResult::ok(json!({ "data": [] }))
            .degraded(format!("no provider answered and nothing is cached for {key}"))),
    }
}
