// Failure taxonomy of the query assembler and view filter.

use thiserror::Error;

/// Client-input faults: unknown filter fields and malformed search metadata.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown search field: {0}")]
    UnknownField(String),

    #[error("malformed search metadata: {0}")]
    MalformedMetadata(String),

    #[error("unsupported sort field: {0}")]
    UnsupportedSortField(String),

    #[error("value is not a trusted identifier: {0}")]
    UntrustedLiteral(String),
}

/// The caller holds no read grant on the case type.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("caller lacks read access to case type {case_type_id}")]
pub struct AccessDeniedError {
    pub case_type_id: String,
}

impl AccessDeniedError {
    pub fn new(case_type_id: impl Into<String>) -> Self {
        Self { case_type_id: case_type_id.into() }
    }
}
