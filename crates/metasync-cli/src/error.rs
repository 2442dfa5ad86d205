use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] metasync_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error("no data available: {0}")]
    Degraded(String),

    #[error(transparent)]
    Cache(#[from] metasync_core::CacheError),

    #[error(transparent)]
    Warehouse(#[from] metasync_warehouse::WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Degraded(_) => 3,
            Self::Serialization(_) => 4,
            Self::Cache(_) => 10,
            Self::Warehouse(_) => 10,
            Self::Io(_) => 10,
        }
    }
}
