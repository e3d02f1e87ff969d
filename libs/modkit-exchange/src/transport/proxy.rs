//! Connector that reaches every destination through one HTTP proxy.
//!
//! `https://` destinations get a `CONNECT host:port` tunnel, and TLS is then
//! layered on top by the wrapping `HttpsConnector`. `http://` destinations
//! use the proxy connection as-is and mark it proxied, which makes hyper send
//! absolute-form request targets.

use crate::error::{HttpError, InvalidUriKind};
use http::{HeaderValue, Uri};
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tower::Service;

/// Upper bound on the proxy's reply to `CONNECT`
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Proxy destination plus the `Proxy-Authorization` value sent when tunnelling.
///
/// Also used as the key of the transport's per-proxy client cache, and
/// attached to outgoing requests as an extension to select that client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyRoute {
    pub(crate) address: Uri,
    pub(crate) authorization: Option<HeaderValue>,
}

impl ProxyRoute {
    /// # Errors
    ///
    /// Returns `HttpError::InvalidUri` unless `address` is an absolute
    /// `http://host[:port]` URL.
    pub(crate) fn parse(address: &str, authorization: Option<HeaderValue>) -> Result<Self, HttpError> {
        let invalid = |kind, reason: &str| HttpError::InvalidUri {
            url: address.to_owned(),
            kind,
            reason: reason.to_owned(),
        };

        let uri: Uri = address
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(InvalidUriKind::ParseError, &e.to_string()))?;
        if uri.authority().is_none() {
            return Err(invalid(
                InvalidUriKind::MissingAuthority,
                "proxy address has no host",
            ));
        }
        match uri.scheme_str() {
            Some("http") => Ok(Self {
                address: uri,
                authorization,
            }),
            Some(scheme) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// proxies are supported".to_owned(),
            }),
            None => Err(invalid(
                InvalidUriKind::MissingScheme,
                "proxy address has no scheme",
            )),
        }
    }
}

#[derive(Clone)]
pub struct ProxyConnector {
    http: HttpConnector,
    route: ProxyRoute,
}

impl ProxyConnector {
    #[must_use]
    pub fn new(route: ProxyRoute) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        Self { http, route }
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = ProxyStream;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<ProxyStream, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http
            .poll_ready(cx)
            .map_err(|e| HttpError::Transport(Box::new(e)))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let mut tcp_connector = self.http.clone();
        let route = self.route.clone();

        Box::pin(async move {
            let io = tcp_connector
                .call(route.address.clone())
                .await
                .map_err(|e| HttpError::Transport(Box::new(e)))?;

            if dst.scheme() == Some(&http::uri::Scheme::HTTPS) {
                let mut tcp = io.into_inner();
                open_tunnel(&mut tcp, &dst, route.authorization.as_ref())
                    .await
                    .map_err(|reason| HttpError::ProxyConnect {
                        proxy: route.address.to_string(),
                        reason,
                    })?;
                tracing::debug!(proxy = %route.address, target = %dst, "CONNECT tunnel established");
                Ok(ProxyStream {
                    inner: TokioIo::new(tcp),
                    forwarding: false,
                })
            } else {
                Ok(ProxyStream {
                    inner: io,
                    forwarding: true,
                })
            }
        })
    }
}

/// Send `CONNECT` for `dst` and consume the proxy's reply headers.
async fn open_tunnel(
    stream: &mut TcpStream,
    dst: &Uri,
    authorization: Option<&HeaderValue>,
) -> Result<(), String> {
    let host = dst.host().ok_or("target URL has no host")?;
    let port = dst.port_u16().unwrap_or(443);

    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n").into_bytes();
    if let Some(value) = authorization {
        request.extend_from_slice(b"Proxy-Authorization: ");
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
    }
    request.extend_from_slice(b"\r\n");
    stream
        .write_all(&request)
        .await
        .map_err(|e| format!("failed to send CONNECT: {e}"))?;

    let mut response = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];
    while !response.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| format!("failed to read CONNECT response: {e}"))?;
        if n == 0 {
            return Err("proxy closed the connection during CONNECT".to_owned());
        }
        response.extend_from_slice(&chunk[..n]);
        if response.len() > MAX_CONNECT_RESPONSE {
            return Err("CONNECT response headers too large".to_owned());
        }
    }

    let status_line = response
        .split(|&b| b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).trim().to_owned())
        .unwrap_or_default();
    let accepted = status_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code.len() == 3 && code.starts_with('2'));
    if accepted {
        Ok(())
    } else {
        Err(status_line)
    }
}

/// Connection to (or tunnelled through) the proxy.
#[derive(Debug)]
pub struct ProxyStream {
    inner: TokioIo<TcpStream>,
    forwarding: bool,
}

impl Connection for ProxyStream {
    fn connected(&self) -> Connected {
        let connected = self.inner.connected();
        if self.forwarding {
            connected.proxy(true)
        } else {
            connected
        }
    }
}

impl Read for ProxyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl Write for ProxyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_route_parse() {
        let route = ProxyRoute::parse("http://proxy.internal:3128", None).unwrap();
        assert_eq!(route.address.port_u16(), Some(3128));

        assert!(matches!(
            ProxyRoute::parse("socks5://proxy:1080", None),
            Err(HttpError::InvalidScheme { .. })
        ));
        assert!(matches!(
            ProxyRoute::parse("not a url", None),
            Err(HttpError::InvalidUri { .. })
        ));
        assert!(matches!(
            ProxyRoute::parse("/relative", None),
            Err(HttpError::InvalidUri {
                kind: InvalidUriKind::MissingAuthority,
                ..
            })
        ));
    }

    /// Proxy stub that answers one CONNECT with `reply` and reports the request head it saw.
    async fn connect_stub(reply: &'static str) -> (Uri, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = tokio::io::BufReader::new(socket);
            let mut head = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                head.push_str(&line);
            }
            reader.get_mut().write_all(reply.as_bytes()).await.unwrap();
            head
        });
        (format!("http://{addr}").parse().unwrap(), handle)
    }

    #[tokio::test]
    async fn test_connect_tunnel_sends_authority_and_credentials() {
        let (proxy, seen) = connect_stub("HTTP/1.1 200 Connection established\r\n\r\n").await;
        let mut tcp = TcpStream::connect(proxy.authority().unwrap().as_str())
            .await
            .unwrap();

        let auth = HeaderValue::from_static("Basic dXNlcjpwYXNz");
        open_tunnel(&mut tcp, &"https://api.example.com/x".parse().unwrap(), Some(&auth))
            .await
            .unwrap();

        let head = seen.await.unwrap();
        assert!(head.starts_with("CONNECT api.example.com:443 HTTP/1.1\r\n"));
        assert!(head.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
    }

    #[tokio::test]
    async fn test_connect_refused_by_proxy() {
        let (proxy, _seen) = connect_stub("HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;
        let mut connector = ProxyConnector::new(ProxyRoute::parse(&proxy.to_string(), None).unwrap());

        let err = connector
            .call("https://api.example.com:8443/".parse().unwrap())
            .await
            .unwrap_err();
        match err {
            HttpError::ProxyConnect { reason, .. } => assert!(reason.contains("407"), "{reason}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plain_http_destination_is_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let mut connector =
            ProxyConnector::new(ProxyRoute::parse(&format!("http://{addr}"), None).unwrap());
        let stream = connector
            .call("http://plain.example.com/".parse().unwrap())
            .await
            .unwrap();

        assert!(stream.connected().is_proxied());
        accept.await.unwrap().unwrap();
    }
}
