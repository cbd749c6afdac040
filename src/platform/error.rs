//! Error types shared by the library and the CLI.

use thiserror::Error;

pub type MatrixResult<T> = Result<T, MatrixError>;

#[derive(Debug, Error)]
pub enum MatrixError {
    /// Catalog misconfiguration or a combination that does not fit its model.
    /// Fatal for the affected test.
    #[error("modeling error: {0}")]
    Modeling(String),

    /// An algorithm property could not be resolved for a candidate value
    /// (GREASE or unknown code points).
    #[error("resolve error: {0}")]
    Resolve(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("capability probe failed: {0}")]
    Capabilities(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MatrixError {
    pub fn is_modeling(&self) -> bool {
        matches!(self, Self::Modeling(_))
    }
}
