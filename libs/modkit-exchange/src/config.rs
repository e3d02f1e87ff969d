use crate::request::Proxy;
use std::time::Duration;

/// Default User-Agent string, added only when a request carries none
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-exchange/", env!("CARGO_PKG_VERSION"));

/// Header the engine writes the correlation id into on every outgoing request
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Timeout applied when a request does not set its own
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum response body size (10 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Configuration for redirect behavior
///
/// Redirects are followed by default. A single request opts out with
/// [`RequestSpec::disable_auto_redirect`](crate::RequestSpec::disable_auto_redirect).
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    /// Maximum number of redirects to follow (default: 10)
    ///
    /// Set to `0` to disable redirect following entirely.
    pub max_redirects: usize,

    /// Strip sensitive headers on cross-origin redirects (default: true)
    ///
    /// When a redirect goes to a different origin, this removes
    /// `Authorization`, `Cookie` and `Proxy-Authorization`.
    pub strip_sensitive_headers: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            strip_sensitive_headers: true,
        }
    }
}

impl RedirectConfig {
    /// Create a configuration that disables redirect following
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_redirects: 0,
            ..Default::default()
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the engine enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock servers only)
    AllowInsecureHttp,
}

/// Overall exchange engine configuration
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Timeout for requests that do not set one (default: 10 seconds)
    ///
    /// Covers connect, request write and response read as a single deadline.
    pub default_timeout: Duration,

    /// Maximum response body size in bytes, measured after decompression (default: 10 MiB)
    pub max_body_size: usize,

    /// User-Agent header value used when the request has none
    pub user_agent: String,

    /// Header that carries the correlation id (default: `X-Correlation-ID`)
    pub correlation_header: String,

    /// Proxy used by requests that do not name their own
    pub default_proxy: Option<Proxy>,

    /// Redirect policy configuration
    pub redirect: RedirectConfig,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate source (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Idle timeout for pooled connections (default: 90 seconds, `None` keeps them indefinitely)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            correlation_header: CORRELATION_ID_HEADER.to_owned(),
            default_proxy: None,
            redirect: RedirectConfig::default(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::WebPki,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl ExchangeConfig {
    /// Configuration for short-lived calls: 5 second timeout, no redirects, no idle pooling
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
            redirect: RedirectConfig::disabled(),
            pool_idle_timeout: None,
            pool_max_idle_per_host: 0,
            ..Default::default()
        }
    }

    /// Configuration for tests against local mock servers (plain HTTP allowed)
    ///
    /// **WARNING**: Never use in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            transport: TransportSecurity::AllowInsecureHttp,
            ..Default::default()
        }
    }
}
