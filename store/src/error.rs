use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Conflict(String),

    #[error("Store read error: {0}")]
    ReadError(String),

    #[error("Store write error: {0}")]
    WriteError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StoreError> for common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => common::Error::NotFound(msg),
            StoreError::Conflict(msg) => common::Error::Conflict(msg),
            StoreError::ConfigError(msg) => common::Error::ConfigError(msg),
            other => common::Error::PersistenceError(other.to_string()),
        }
    }
}
