use std::fmt;

/// Result type for kurral-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the storage layer
#[derive(Debug)]
pub enum Error {
    /// Schema layer error
    Schema(kurral_types::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// JSON (de)serialization failed
    Json(serde_json::Error),

    /// Storage backend is unreachable or rejected the request
    StorageUnavailable(String),

    /// No artifact with the requested identity
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema(err) => write!(f, "Schema error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            Error::NotFound(msg) => write!(f, "Artifact not found: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Schema(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::StorageUnavailable(_) | Error::NotFound(_) => None,
        }
    }
}

impl From<kurral_types::Error> for Error {
    fn from(err: kurral_types::Error) -> Self {
        Error::Schema(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}
