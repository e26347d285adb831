//! Error taxonomy shared by every backend
//!
//! The one variant callers are expected to branch on is [`Error::NotFound`]:
//! existence checks and tolerant batch deletes depend on it being
//! distinguishable from ordinary I/O failures.

/// Errors produced by file store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested path does not exist on the backend
    #[error("not found: {0}")]
    NotFound(String),

    /// A malformed request value, e.g. an unusable object source
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A byte range expression that failed to parse or is out of bounds
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Transient network or service failure from a remote backend
    #[error("network error: {0}")]
    Network(String),

    /// Local I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Backend construction failure (bad credentials, unsupported options)
    #[error("configuration error: {0}")]
    Config(String),

    /// A multipart operation referenced an unknown or expired upload session
    #[error("upload session error: {0}")]
    Session(String),

    /// The operation observed a cancelled token and stopped
    #[error("operation cancelled")]
    Cancelled,

    /// Anything that does not fit the categories above
    #[error("{0}")]
    General(String),
}

impl Error {
    /// True when the error is the distinguished not-found kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
            || matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(Error::NotFound("/a/b".to_string()).is_not_found());
        assert!(
            Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).is_not_found()
        );
        assert!(!Error::Network("timeout".to_string()).is_not_found());
    }
}
