/// Shared error type used across all Parlor crates.
///
/// The variants map onto the engine's error taxonomy: `NotFound` and
/// `InvalidState` are client errors and are never retried;
/// `Transient` marks store/registry connectivity failures that are safe
/// to retry at the boundary where the operation is idempotent;
/// `Provider` wraps LLM backend failures, which surface as a terminal
/// `error` event on the turn stream rather than being retried.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("transient: {0}")]
    Transient(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("retrieval: {0}")]
    Retrieval(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Client errors are surfaced to the caller and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidState(_))
    }

    /// Transient errors may be retried where the operation is idempotent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_transient() {
        let e = Error::InvalidState("double accept".into());
        assert!(e.is_client_error());
        assert!(!e.is_transient());
    }

    #[test]
    fn io_errors_are_transient() {
        let e = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(e.is_transient());
        assert!(!e.is_client_error());
    }
}
