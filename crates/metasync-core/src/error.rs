use thiserror::Error;

/// Validation and contract errors exposed by `metasync-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid domain '{value}', expected one of teamComps, items, augments")]
    InvalidDomain { value: String },
    #[error("invalid source '{value}', expected one of metatft, tacticstools, combined")]
    InvalidSource { value: String },
    #[error("patch cannot be empty")]
    EmptyPatch,
    #[error("patch contains invalid character '{ch}'")]
    InvalidPatchChar { ch: char },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("invalid merge strategy '{value}', expected sample-weight or precedence")]
    InvalidMergeStrategy { value: String },

    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnvValue { name: &'static str, value: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Cache(#[from] crate::cache::CacheError),
}
