use metasync_core::UtcDateTime;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMeta {
    pub request_id: Uuid,
    pub command: &'static str,
    pub generated_at: UtcDateTime,
    pub latency_ms: u64,
    /// No provider answered and nothing was cached.
    pub degraded: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Output {
    pub meta: OutputMeta,
    pub data: Value,
}

pub fn render(output: &Output, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(output)?
    } else {
        serde_json::to_string(output)?
    };
    println!("{payload}");
    Ok(())
}
