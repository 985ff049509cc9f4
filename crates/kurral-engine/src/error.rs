use std::fmt;

/// Result type for kurral-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the replay and comparison layer
#[derive(Debug)]
pub enum Error {
    /// Artifact failed schema or integrity validation. Fatal, never retried.
    ArtifactInvalid(String),

    /// Cache layer error
    Cache(kurral_core::Error),

    /// Comparison input mismatch (e.g. unequal batch lengths)
    InvalidComparison(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ArtifactInvalid(msg) => write!(f, "Invalid artifact: {}", msg),
            Error::Cache(err) => write!(f, "Cache error: {}", err),
            Error::InvalidComparison(msg) => write!(f, "Invalid comparison: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Cache(err) => Some(err),
            Error::ArtifactInvalid(_) | Error::InvalidComparison(_) => None,
        }
    }
}

impl From<kurral_core::Error> for Error {
    fn from(err: kurral_core::Error) -> Self {
        Error::Cache(err)
    }
}
