use std::fmt;

/// Result type for kurral-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the capture layer
#[derive(Debug)]
pub enum Error {
    /// Schema layer error
    Schema(kurral_types::Error),

    /// Cache/scoring layer error
    Core(kurral_core::Error),

    /// Storage layer error
    Store(kurral_store::Error),

    /// Configuration error
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema(err) => write!(f, "Schema error: {}", err),
            Error::Core(err) => write!(f, "Core error: {}", err),
            Error::Store(err) => write!(f, "Storage error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Schema(err) => Some(err),
            Error::Core(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::Config(_) => None,
        }
    }
}

impl From<kurral_types::Error> for Error {
    fn from(err: kurral_types::Error) -> Self {
        Error::Schema(err)
    }
}

impl From<kurral_core::Error> for Error {
    fn from(err: kurral_core::Error) -> Self {
        Error::Core(err)
    }
}

impl From<kurral_store::Error> for Error {
    fn from(err: kurral_store::Error) -> Self {
        Error::Store(err)
    }
}
