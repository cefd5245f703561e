use thiserror::Error;

/// Errors produced by the facade, its query builder and its collaborators
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl DataError {
    /// Stable code recorded alongside the message in the error log
    pub fn code(&self) -> &'static str {
        match self {
            DataError::Driver(_) => "DRIVER_ERROR",
            DataError::Connection(_) => "CONNECTION_ERROR",
            DataError::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
            DataError::MalformedRequest(_) => "MALFORMED_REQUEST",
            DataError::Serialization(_) => "SERIALIZATION_ERROR",
            DataError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    /// Message without the variant prefix, as reported by the failing component
    pub fn detail(&self) -> String {
        match self {
            DataError::Driver(msg)
            | DataError::Connection(msg)
            | DataError::CacheUnavailable(msg)
            | DataError::MalformedRequest(msg)
            | DataError::Validation(msg) => msg.clone(),
            DataError::Serialization(err) => err.to_string(),
        }
    }
}

/// Convert rusqlite::Error to DataError
impl From<rusqlite::Error> for DataError {
    fn from(err: rusqlite::Error) -> Self {
        DataError::Driver(err.to_string())
    }
}

/// Convert mysql_async::Error to DataError
impl From<mysql_async::Error> for DataError {
    fn from(err: mysql_async::Error) -> Self {
        DataError::Driver(err.to_string())
    }
}
