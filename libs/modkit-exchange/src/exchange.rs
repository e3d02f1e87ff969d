use crate::builder::ExchangeBuilder;
use crate::config::{ExchangeConfig, TransportSecurity};
use crate::context::CorrelationContext;
use crate::error::{HttpError, InvalidUriKind};
use crate::headers::HeaderMultimap;
use crate::layers::RedirectMode;
use crate::request::{Proxy, RequestSpec};
use crate::response::{ResponseBody, ResponseEnvelope};
use crate::transport::TransportService;
use crate::transport::proxy::ProxyRoute;
use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower::ServiceExt;
use tracing::{Instrument, Level};

/// Cap on the request deadline; longer timeouts behave as no limit
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// HTTP exchange engine.
///
/// Executes [`RequestSpec`]s and reports every outcome that got past argument
/// validation as a [`ResponseEnvelope`]: transport failures are captured in the
/// envelope instead of being returned, non-2xx statuses are ordinary responses.
///
/// `Exchange` is cheap to clone; clones share the connection pools.
///
/// # Example
///
/// ```ignore
/// use modkit_exchange::{CorrelationContext, Exchange, RequestSpec};
///
/// let exchange = Exchange::builder().build()?;
/// let envelope = exchange
///     .execute(&RequestSpec::get("https://api.example.com/items/7"), &CorrelationContext::generate())
///     .await?;
///
/// if envelope.is_success() {
///     let item: Item = envelope.structured()?;
/// } else {
///     let problem: Problem = envelope.structured_error()?;
/// }
/// ```
#[derive(Clone)]
pub struct Exchange {
    transport: TransportService,
    config: Arc<ExchangeConfig>,
}

impl Exchange {
    /// Engine with default configuration and the hyper transport.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Tls` if TLS initialization fails.
    pub fn new() -> Result<Self, HttpError> {
        ExchangeBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> ExchangeBuilder {
        ExchangeBuilder::new()
    }

    pub(crate) fn from_parts(transport: TransportService, config: ExchangeConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Execute `spec` once, tagging it with the correlation id of `ctx`.
    ///
    /// `spec` is not modified; the envelope embeds the copy that was executed,
    /// including the correlation, `Accept-Encoding` and `User-Agent` headers
    /// the engine added.
    ///
    /// # Errors
    ///
    /// Only for requests that cannot be sent at all: empty or malformed method,
    /// missing or malformed URL, scheme not allowed by the transport security
    /// mode, invalid header name or value, malformed proxy address. Everything
    /// that goes wrong after that is captured in [`ResponseEnvelope::error`].
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        ctx: &CorrelationContext,
    ) -> Result<ResponseEnvelope, HttpError> {
        let method = parse_method(spec.method())?;
        let uri = validate_url(spec.url(), self.config.transport)?;
        let route = spec
            .request_proxy()
            .or(self.config.default_proxy.as_ref())
            .map(proxy_route)
            .transpose()?;

        let mut executed = spec.clone();
        executed
            .headers_mut()
            .set(&self.config.correlation_header, ctx.id());
        let negotiated = negotiate_gzip(executed.headers_mut(), &method);
        if !executed.headers().contains("User-Agent") {
            executed
                .headers_mut()
                .set("User-Agent", Some(&self.config.user_agent));
        }

        let request = build_request(&executed, method.clone(), &uri, route)?;

        let span = tracing::span!(
            Level::INFO, "outgoing_http",
            http.method = %method,
            http.url = %sanitized_url(&uri),
            otel.kind = "client",
            http.status_code = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        Ok(self
            .send(request, executed, negotiated)
            .instrument(span)
            .await)
    }

    async fn send(
        &self,
        request: Request<Full<Bytes>>,
        executed: RequestSpec,
        negotiated: bool,
    ) -> ResponseEnvelope {
        let timeout = executed
            .request_timeout()
            .unwrap_or(self.config.default_timeout);
        let deadline = deadline_after(timeout);

        let sent = tokio::time::timeout_at(deadline, self.transport.clone().oneshot(request)).await;
        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return captured_no_response(executed, err),
            Err(_) => return captured_no_response(executed, HttpError::Timeout(timeout)),
        };

        let (parts, body) = response.into_parts();
        let status = parts.status.as_u16();
        tracing::Span::current().record("http.status_code", status);
        let headers = HeaderMultimap::from_header_map(&parts.headers);

        let limit = self.config.max_body_size;
        let mut raw = Vec::new();
        let read = tokio::time::timeout_at(deadline, read_body_limited(body, limit, &mut raw))
            .await
            .unwrap_or(Err(HttpError::Timeout(timeout)));

        let gzip = negotiated && is_gzip(headers.get("Content-Encoding"));
        let (body, decompressed, error) = extract_body(raw, gzip, limit, read);

        if let Some(err) = &error {
            tracing::Span::current().record("error", tracing::field::display(err));
            tracing::warn!(status, error = %err, "HTTP exchange failed after response head");
        }
        ResponseEnvelope::new(executed, status, headers, body, decompressed, error)
    }
}

/// `now + timeout`, capped at a deadline that is never reached in practice.
fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout.min(FAR_FUTURE)
}

fn captured_no_response(executed: RequestSpec, err: HttpError) -> ResponseEnvelope {
    tracing::Span::current().record("error", tracing::field::display(&err));
    tracing::warn!(error = %err, "HTTP exchange failed without a response");
    ResponseEnvelope::no_response(executed, err)
}

fn parse_method(method: &str) -> Result<Method, HttpError> {
    if method.is_empty() {
        return Err(HttpError::InvalidArgument(
            "request method is empty".to_owned(),
        ));
    }
    Method::from_bytes(method.as_bytes())
        .map_err(|_| HttpError::InvalidArgument(format!("invalid request method '{method}'")))
}

/// Parse `url` and check it against the transport security mode.
fn validate_url(url: &str, transport: TransportSecurity) -> Result<Uri, HttpError> {
    if url.is_empty() {
        return Err(HttpError::InvalidUri {
            url: String::new(),
            kind: InvalidUriKind::Missing,
            reason: "request URL is empty".to_owned(),
        });
    }

    let uri: Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    match uri.scheme_str() {
        Some("https") => Ok(uri),
        Some("http") => match transport {
            TransportSecurity::AllowInsecureHttp => Ok(uri),
            TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
        },
        Some(scheme) => Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "only http:// and https:// schemes are supported".to_owned(),
        }),
        None => Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        }),
    }
}

fn proxy_route(proxy: &Proxy) -> Result<ProxyRoute, HttpError> {
    let authorization = proxy
        .credentials()
        .map(|credentials| sensitive_value(&credentials.basic_authorization()))
        .transpose()?;
    ProxyRoute::parse(proxy.address(), authorization)
}

fn sensitive_value(value: &str) -> Result<HeaderValue, HttpError> {
    let mut value = HeaderValue::from_str(value)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Ask for gzip unless the caller already negotiated an encoding or a byte range,
/// or the method carries no body. Returns whether the engine asked.
fn negotiate_gzip(headers: &mut HeaderMultimap, method: &Method) -> bool {
    if headers.contains("Accept-Encoding") || headers.contains("Range") || method == Method::HEAD {
        return false;
    }
    headers.set("Accept-Encoding", Some("gzip"));
    true
}

fn is_gzip(content_encoding: &str) -> bool {
    content_encoding.trim().eq_ignore_ascii_case("gzip")
}

/// Transport request for `spec`.
///
/// Header pairs are appended one by one, so repeated fields stay separate
/// header lines. Credentials, keep-alive and proxy authorization are applied
/// here and do not show up in the envelope's request copy.
fn build_request(
    spec: &RequestSpec,
    method: Method,
    uri: &Uri,
    route: Option<ProxyRoute>,
) -> Result<Request<Full<Bytes>>, HttpError> {
    let mut headers = HeaderMap::with_capacity(spec.headers().len() + 4);
    for (name, value) in spec.headers().iter() {
        headers.append(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }

    if let Some(credentials) = spec.request_credentials()
        && !headers.contains_key(header::AUTHORIZATION)
    {
        headers.insert(
            header::AUTHORIZATION,
            sensitive_value(&credentials.basic_authorization())?,
        );
    }

    if spec.is_keep_alive_disabled() {
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    }

    // Forwarded plain-HTTP requests authenticate per request; tunnels authenticate on CONNECT
    if let Some(authorization) = route.as_ref().and_then(|route| route.authorization.clone())
        && uri.scheme() == Some(&http::uri::Scheme::HTTP)
        && !headers.contains_key(header::PROXY_AUTHORIZATION)
    {
        headers.insert(header::PROXY_AUTHORIZATION, authorization);
    }

    let body = spec.body().cloned().unwrap_or_default();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    let mut request = Request::builder()
        .method(method)
        .uri(uri.clone())
        .body(Full::new(body))?;
    *request.headers_mut() = headers;

    let redirect = if spec.is_auto_redirect_disabled() {
        RedirectMode::Manual
    } else {
        RedirectMode::Follow
    };
    request.extensions_mut().insert(redirect);
    if let Some(route) = route {
        request.extensions_mut().insert(route);
    }
    Ok(request)
}

/// URL for logs: scheme, authority and path, without the query string.
fn sanitized_url(uri: &Uri) -> String {
    format!(
        "{}://{}{}",
        uri.scheme_str().unwrap_or("https"),
        uri.authority().map_or("", http::uri::Authority::as_str),
        uri.path()
    )
}

/// Collect body frames into `collected`, which keeps what arrived if reading fails.
async fn read_body_limited(
    body: ResponseBody,
    limit: usize,
    collected: &mut Vec<u8>,
) -> Result<(), HttpError> {
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }
    Ok(())
}

/// Inflate every gzip member of a body, enforcing `limit` on the inflated size.
fn gunzip(compressed: &[u8], limit: usize) -> Result<Vec<u8>, HttpError> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut inflated = Vec::new();
    MultiGzDecoder::new(compressed)
        .take(cap)
        .read_to_end(&mut inflated)
        .map_err(HttpError::Decompression)?;
    if inflated.len() > limit {
        return Err(HttpError::BodyTooLarge {
            limit,
            actual: inflated.len(),
        });
    }
    Ok(inflated)
}

/// Final body, decompressed flag and captured error.
///
/// A decompression failure is the captured error when the body was read in
/// full. When reading already failed, the read error is kept and the
/// decompression failure only logged.
fn extract_body(
    raw: Vec<u8>,
    gzip: bool,
    limit: usize,
    read: Result<(), HttpError>,
) -> (Bytes, bool, Option<HttpError>) {
    if !gzip {
        return (raw.into(), false, read.err());
    }
    // An empty gzip-labelled body (204, HEAD-like replies) inflates to nothing
    if raw.is_empty() {
        return (Bytes::new(), true, read.err());
    }
    match (gunzip(&raw, limit), read) {
        (Ok(inflated), read) => (inflated.into(), true, read.err()),
        (Err(err), Ok(())) => (raw.into(), false, Some(err)),
        (Err(secondary), Err(primary)) => {
            tracing::debug!(error = %secondary, "ignoring decompression failure of a partial body");
            (raw.into(), false, Some(primary))
        }
    }
}
