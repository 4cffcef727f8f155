//! Error taxonomy for navigations and transports.

use thiserror::Error;

/// Failure of a single navigation.
///
/// `MissingUrl`, `InvalidTarget` and `InvalidUrl` are returned synchronously from
/// [`crate::Navigator::navigate`] before any network activity. The remaining variants
/// are delivered to `error` hooks once the response has been classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("navigation requires a url")]
    MissingUrl,
    #[error("no element matches target selector `{0}`")]
    InvalidTarget(String),
    #[error("cannot resolve url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("invalid selector `{0}`")]
    InvalidSelector(String),
}

impl From<TransportError> for NavigationError {
    #[inline]
    fn from(err: TransportError) -> Self {
        Self::Network(err.to_string())
    }
}

/// Failure to obtain a response at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),
}
