use std::fmt;

/// Result type for kurral-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the cache and scoring layer
#[derive(Debug)]
pub enum Error {
    /// Schema layer error
    Schema(kurral_types::Error),

    /// SQLite cache backend failed
    Sqlite(rusqlite::Error),

    /// JSON (de)serialization failed
    Json(serde_json::Error),

    /// Scorer weights do not sum to 1.0
    InvalidWeights(f64),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema(err) => write!(f, "Schema error: {}", err),
            Error::Sqlite(err) => write!(f, "SQLite cache error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::InvalidWeights(total) => {
                write!(f, "Scorer weights must sum to 1.0, got {}", total)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Schema(err) => Some(err),
            Error::Sqlite(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::InvalidWeights(_) => None,
        }
    }
}

impl From<kurral_types::Error> for Error {
    fn from(err: kurral_types::Error) -> Self {
        Error::Schema(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Sqlite(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
