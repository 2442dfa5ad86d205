use metasync_core::{Domain, SyncOrchestrator};

use crate::cli::EntryArgs;
use crate::error::CliError;

use super::{fetch_options, CommandResult};

pub async fn run(
    args: &EntryArgs,
    orchestrator: &SyncOrchestrator,
) -> Result<CommandResult, CliError> {
    let domain: Domain = args.domain.parse()?;
    let options = fetch_options(args.source, args.patch.as_deref(), false)?;

    let Some(report) = orchestrator.revalidate(domain, &options).await else {
        let key = orchestrator.resolve_key(domain, &options);
        return Err(CliError::Degraded(format!("nothing is cached for {key}")));
    };

    let mut result = CommandResult::ok(serde_json::to_value(&report)?);
    if !report.is_valid {
        result = result.with_warning(format!("{} violation(s)", report.errors.len()));
    }
    Ok(result)
}
