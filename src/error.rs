use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OraError {
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("invalid entry name: {0}")]
    InvalidName(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("subscriber {subscriber} failed: {source}")]
    Dispatch {
        subscriber: Uuid,
        #[source]
        source: Box<OraError>,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl OraError {
    /// True when the backend reported the entry as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OraError::NotFound(_))
    }

    pub fn is_dispatch(&self) -> bool {
        matches!(self, OraError::Dispatch { .. })
    }
}

pub type OraResult<T> = Result<T, OraError>;
