//! Transport seam of the exchange engine.
//!
//! The engine talks to a [`TransportService`]: any cloneable tower service from
//! `Request<Full<Bytes>>` to `Response<ResponseBody>`. [`HyperTransport`] is the
//! production implementation; tests plug in `tower::service_fn` closures.
//!
//! `HyperTransport` keeps one pooled hyper client for direct connections and one
//! per proxy route, created on first use. Each client is wrapped in
//! `FollowRedirect` with [`RedirectPolicy`](crate::layers::RedirectPolicy).

pub mod proxy;
pub mod tls;

use crate::config::{ExchangeConfig, RedirectConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::RedirectPolicy;
use crate::response::ResponseBody;
use bytes::Bytes;
use dashmap::DashMap;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use proxy::{ProxyConnector, ProxyRoute};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http::follow_redirect::FollowRedirectLayer;

/// Type-erased transport the engine sends every request through
pub type TransportService =
    BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// Settings shared by every hyper client the transport creates
#[derive(Debug)]
struct ClientSettings {
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
    redirect: RedirectConfig,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: usize,
}

impl ClientSettings {
    fn from_config(config: &ExchangeConfig) -> Self {
        Self {
            tls_roots: config.tls_roots,
            transport: config.transport,
            redirect: config.redirect.clone(),
            pool_idle_timeout: config.pool_idle_timeout,
            pool_max_idle_per_host: config.pool_max_idle_per_host,
        }
    }

    fn client<C>(&self, connector: C) -> TransportService
    where
        C: Connect + Clone + Send + Sync + 'static,
    {
        let mut builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect
        builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(idle_timeout);
        }
        let client = builder.build::<_, Full<Bytes>>(connector);

        let service = ServiceBuilder::new()
            .layer(FollowRedirectLayer::with_policy(RedirectPolicy::new(
                self.redirect.clone(),
            )))
            .service(client)
            .map_response(box_response)
            .map_err(HttpError::from);
        BoxCloneSyncService::new(service)
    }
}

fn box_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    response.map(|body| body.map_err(Into::into).boxed())
}

/// Production transport: hyper-util pooled clients over rustls.
#[derive(Clone)]
pub struct HyperTransport {
    direct: TransportService,
    proxied: Arc<DashMap<ProxyRoute, TransportService>>,
    settings: Arc<ClientSettings>,
}

impl HyperTransport {
    /// # Errors
    ///
    /// Returns `HttpError::Tls` if the TLS root store cannot be built.
    pub fn new(config: &ExchangeConfig) -> Result<Self, HttpError> {
        let settings = ClientSettings::from_config(config);

        let mut tcp_connector = HttpConnector::new();
        tcp_connector.enforce_http(false);
        let direct = settings.client(tls::wrap_connector(
            tcp_connector,
            settings.tls_roots,
            settings.transport,
        )?);

        Ok(Self {
            direct,
            proxied: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
        })
    }

    /// Client for `route`, built on first use.
    ///
    /// Concurrent first uses may each build a client; the first one published wins.
    fn proxied_client(&self, route: &ProxyRoute) -> Result<TransportService, HttpError> {
        if let Some(client) = self.proxied.get(route) {
            return Ok(client.value().clone());
        }

        let connector = tls::wrap_connector(
            ProxyConnector::new(route.clone()),
            self.settings.tls_roots,
            self.settings.transport,
        )?;
        let client = self.settings.client(connector);
        tracing::debug!(proxy = %route.address, "created proxied HTTP client");

        Ok(self
            .proxied
            .entry(route.clone())
            .or_insert(client)
            .value()
            .clone())
    }

    /// Number of proxy routes with a cached client
    #[must_use]
    pub fn proxy_routes(&self) -> usize {
        self.proxied.len()
    }
}

impl Service<Request<Full<Bytes>>> for HyperTransport {
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Full<Bytes>>) -> Self::Future {
        let client = match request.extensions().get::<ProxyRoute>() {
            Some(route) => self.proxied_client(route),
            None => Ok(self.direct.clone()),
        };
        Box::pin(async move { client?.oneshot(request).await })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn test_config() -> ExchangeConfig {
        ExchangeConfig::for_testing()
    }

    #[tokio::test]
    async fn test_proxied_clients_are_cached_per_route() {
        let transport = HyperTransport::new(&test_config()).unwrap();
        let route = ProxyRoute::parse("http://127.0.0.1:3128", None).unwrap();
        let other = ProxyRoute::parse("http://127.0.0.1:3129", None).unwrap();

        transport.proxied_client(&route).unwrap();
        transport.proxied_client(&route).unwrap();
        assert_eq!(transport.proxy_routes(), 1);

        transport.proxied_client(&other).unwrap();
        assert_eq!(transport.proxy_routes(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_the_proxy_cache() {
        let transport = HyperTransport::new(&test_config()).unwrap();
        let clone = transport.clone();
        clone
            .proxied_client(&ProxyRoute::parse("http://127.0.0.1:3128", None).unwrap())
            .unwrap();
        assert_eq!(transport.proxy_routes(), 1);
    }

    #[tokio::test]
    async fn test_tls_only_transport_builds() {
        assert!(HyperTransport::new(&ExchangeConfig::default()).is_ok());
    }
}
