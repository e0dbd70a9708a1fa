use std::io;
use std::path::PathBuf;

/// Failures raised below the envelope layer.
///
/// The executor never hands these to callers directly; they are folded into
/// [`crate::ApiError`] and kept as its `cause`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("timed out while {operation}")]
    Timeout {
        operation: &'static str,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("invalid http response: {message}")]
    InvalidResponse { message: String },

    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl TransportError {
    /// Returns `true` for connect and read timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Sorts a client error by the crate's own timeout and connect signals.
    pub(crate) fn from_http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let operation =
                if err.is_connect() { "connecting" } else { "waiting for the response" };
            return Self::Timeout { operation, source: Some(err) };
        }
        if err.is_connect() {
            let url = err.url().map(ToString::to_string).unwrap_or_default();
            return Self::Connect { url, source: err };
        }
        Self::Http(err)
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse { message: message.into() }
    }
}

/// Errors from persisting session credentials.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode session file: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("invalid session file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Rejections from [`crate::PageLoader::load`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("a page load is already in flight for this list")]
    InFlight,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        assert!(TransportError::Timeout { operation: "connecting", source: None }.is_timeout());
        assert!(!TransportError::invalid_response("garbage").is_timeout());
        assert!(!TransportError::InvalidUrl { url: "x".into(), reason: "relative".into() }
            .is_timeout());
    }
}
