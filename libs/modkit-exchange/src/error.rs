use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL is empty
    Missing,
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Exchange error types
///
/// Variants fall into four groups:
/// - invalid arguments, returned by [`Exchange::execute`] before any I/O
/// - transport failures, captured into [`ResponseEnvelope::error`] instead of being returned
/// - decode contract misuse ([`UnsuccessfulResponse`], [`NoErrorPresent`])
/// - codec failures while encoding a request body or decoding a response body
///
/// [`Exchange::execute`]: crate::Exchange::execute
/// [`ResponseEnvelope::error`]: crate::ResponseEnvelope::error
/// [`UnsuccessfulResponse`]: HttpError::UnsuccessfulResponse
/// [`NoErrorPresent`]: HttpError::NoErrorPresent
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// A required request field is missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },

    /// The exchange did not complete within the request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The proxy refused or failed to open a tunnel
    #[error("Proxy {proxy} refused CONNECT: {reason}")]
    ProxyConnect {
        /// Proxy address
        proxy: String,
        /// Status line or I/O failure reported while tunnelling
        reason: String,
    },

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Gzip payload could not be decompressed
    #[error("Failed to decompress gzip response body: {0}")]
    Decompression(#[source] std::io::Error),

    /// Success-only decode called on an unsuccessful envelope
    #[error("Request to {url} failed with status {status} {reason}: {body_preview}")]
    UnsuccessfulResponse {
        /// Target URL of the executed request
        url: String,
        /// Status code (0 when no response was received)
        status: u16,
        /// Human-readable status phrase
        reason: String,
        /// Leading part of the decoded body text
        body_preview: String,
        /// Transport failure captured during the exchange, if any
        #[source]
        cause: Option<Arc<HttpError>>,
    },

    /// Error-only decode called on a successful envelope
    #[error("decode_error called with no error present")]
    NoErrorPresent,

    /// JSON encoding or parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// XML parsing error
    #[error("XML parsing failed: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),
}

impl HttpError {
    /// Returns `true` for errors raised before any I/O because the request was malformed.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            HttpError::InvalidArgument(_)
                | HttpError::RequestBuild(_)
                | HttpError::InvalidHeaderName(_)
                | HttpError::InvalidHeaderValue(_)
                | HttpError::InvalidUri { .. }
                | HttpError::InvalidScheme { .. }
        )
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}
