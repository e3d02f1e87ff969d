use crate::config::{ExchangeConfig, RedirectConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::exchange::Exchange;
use crate::request::Proxy;
use crate::response::ResponseBody;
use crate::transport::{HyperTransport, TransportService};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Request, Response};
use http_body_util::Full;
use std::time::Duration;
use tower::Service;

/// Builder for an [`Exchange`].
///
/// Every setter writes into an [`ExchangeConfig`]; [`build`](Self::build)
/// creates the hyper transport from it, [`build_with`](Self::build_with)
/// plugs in any other tower service.
pub struct ExchangeBuilder {
    config: ExchangeConfig,
}

impl Default for ExchangeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig::default(),
        }
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: ExchangeConfig) -> Self {
        Self { config }
    }

    /// Set the timeout for requests that do not carry their own
    ///
    /// The timeout is a single deadline covering connect, send and the
    /// complete body read.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Set the User-Agent sent when a request has none
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum response body size, measured after decompression
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set transport security mode
    ///
    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow insecure HTTP connections (for testing only)
    ///
    /// Equivalent to `.transport(TransportSecurity::AllowInsecureHttp)`.
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Never use in production as it exposes traffic to interception.
    ///
    /// # Compile-time Safety
    ///
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "modkit_exchange::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Set the maximum number of redirects to follow
    ///
    /// `0` returns every 3xx response as-is. Default: 10
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.redirect.max_redirects = max_redirects;
        self
    }

    /// Disable redirect following for every request
    #[must_use]
    pub fn no_redirects(mut self) -> Self {
        self.config.redirect = RedirectConfig::disabled();
        self
    }

    #[must_use]
    pub fn redirect(mut self, config: RedirectConfig) -> Self {
        self.config.redirect = config;
        self
    }

    /// Proxy for requests that do not name their own
    #[must_use]
    pub fn default_proxy(mut self, proxy: Proxy) -> Self {
        self.config.default_proxy = Some(proxy);
        self
    }

    /// Header that carries the correlation id (default: `X-Correlation-ID`)
    #[must_use]
    pub fn correlation_header(mut self, header: impl Into<String>) -> Self {
        self.config.correlation_header = header.into();
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Set the idle connection timeout for the connection pool
    ///
    /// `None` keeps idle connections indefinitely. Default: 90 seconds.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host
    ///
    /// `0` disables connection reuse. Default: 32.
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Build the engine over the hyper transport
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails, or if the user agent or
    /// correlation header cannot be sent as a header.
    pub fn build(self) -> Result<Exchange, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        HeaderValue::from_str(&self.config.user_agent)?;
        HeaderName::from_bytes(self.config.correlation_header.as_bytes())?;

        let transport = HyperTransport::new(&self.config)?;
        Ok(Exchange::from_parts(
            TransportService::new(transport),
            self.config,
        ))
    }

    /// Build the engine over a caller-supplied transport.
    ///
    /// Redirect, proxy and pool settings are the transport's business; the
    /// engine still applies timeouts, body limits, gzip and headers.
    pub fn build_with<S>(self, transport: S) -> Exchange
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Exchange::from_parts(TransportService::new(transport), self.config)
    }
}
