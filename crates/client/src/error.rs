// crates/client/src/error.rs
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the watch client.
///
/// Connection failures are handled by the reconnect loop and only logged.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url '{0}': expected ws://, wss://, http:// or https://")]
    InvalidUrl(String),

    #[error("connect failed: {0}")]
    Connect(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("version store I/O error at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("version store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ClientError {
    pub(crate) fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::InvalidUrl("ftp://x".to_string());
        assert!(err.to_string().contains("ftp://x"));

        let err = ClientError::store(
            "/tmp/v.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/v.json"));

        let err = ClientError::ConnectTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "connect timed out after 10s");
    }
}
