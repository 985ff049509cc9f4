use std::fmt;

/// Result type for kurral-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the schema layer
#[derive(Debug)]
pub enum Error {
    /// Artifact failed schema validation or an integrity check
    ArtifactInvalid(String),

    /// A sealing-time invariant was breached
    InvariantViolation(String),

    /// Artifact schema major is newer than this reader supports
    UnsupportedSchema { found: String, supported: u64 },

    /// JSON (de)serialization failed
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ArtifactInvalid(msg) => write!(f, "Invalid artifact: {}", msg),
            Error::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
            Error::UnsupportedSchema { found, supported } => write!(
                f,
                "Unsupported schema version {} (reader supports major {})",
                found, supported
            ),
            Error::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(err) => Some(err),
            Error::ArtifactInvalid(_)
            | Error::InvariantViolation(_)
            | Error::UnsupportedSchema { .. } => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
