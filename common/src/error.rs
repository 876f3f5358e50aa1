use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Upstream price provider error: {0}")]
    UpstreamError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Parsing error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// True for failures that originate at the price provider.
    ///
    /// These are recovered locally by the poller and surface as 502 on
    /// request paths.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::HttpError(_) | Error::UpstreamError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_classification() {
        assert!(Error::UpstreamError("429".into()).is_upstream());
        assert!(!Error::ValidationError("amount".into()).is_upstream());
        assert!(!Error::PersistenceError("write".into()).is_upstream());
    }
}
