use crate::error::HttpError;
use crate::headers::HeaderMultimap;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use zeroize::Zeroizing;

/// Username/password pair sent as HTTP Basic authentication.
///
/// The password is zeroed on drop and never printed by `Debug`.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// `Basic <base64(username:password)>` header value
    pub(crate) fn basic_authorization(&self) -> Zeroizing<String> {
        let pair = Zeroizing::new(format!("{}:{}", self.username, self.password.as_str()));
        Zeroizing::new(format!("Basic {}", STANDARD.encode(pair.as_bytes())))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HTTP proxy used to reach the target.
///
/// `http://` targets are forwarded through the proxy; `https://` targets are
/// tunnelled with `CONNECT`.
#[derive(Debug, Clone)]
pub struct Proxy {
    address: String,
    credentials: Option<Credentials>,
}

impl Proxy {
    /// Proxy at `address`, e.g. `http://proxy.internal:3128`
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
        }
    }

    /// Authenticate against the proxy with `Proxy-Authorization: Basic`
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

/// Options for JSON request bodies
#[derive(Debug, Clone, Copy)]
pub struct JsonOptions {
    /// Keep object fields whose value is `null`, `false` or zero (default: true)
    pub include_default_valued_fields: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            include_default_valued_fields: true,
        }
    }
}

/// Description of one outgoing HTTP request.
///
/// A `RequestSpec` is plain data. [`Exchange::execute`](crate::Exchange::execute)
/// borrows it, works on its own copy, and embeds that copy in the resulting
/// [`ResponseEnvelope`](crate::ResponseEnvelope).
///
/// # Example
///
/// ```
/// use modkit_exchange::{JsonOptions, RequestSpec};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), modkit_exchange::HttpError> {
/// let spec = RequestSpec::post("https://api.example.com/users")
///     .header("Accept", "application/json")
///     .timeout(Duration::from_secs(3))
///     .json(&serde_json::json!({ "name": "Alice" }), JsonOptions::default())?;
///
/// assert_eq!(spec.method(), "POST");
/// assert_eq!(spec.headers().get("content-type"), "application/json; charset=utf-8");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    method: String,
    url: String,
    headers: HeaderMultimap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    proxy: Option<Proxy>,
    credentials: Option<Credentials>,
    disable_auto_redirect: bool,
    disable_keep_alive: bool,
    disable_compression: bool,
}

impl RequestSpec {
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    #[must_use]
    pub fn head(url: impl Into<String>) -> Self {
        Self::new("HEAD", url)
    }

    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new("PUT", url)
    }

    #[must_use]
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new("PATCH", url)
    }

    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new("DELETE", url)
    }

    /// Copy `base`, then overlay `extra_headers` (fields present there replace the copied ones).
    #[must_use]
    pub fn derive_from(base: &RequestSpec, extra_headers: &HeaderMultimap) -> Self {
        let mut spec = base.clone();
        spec.headers.merge(extra_headers);
        spec
    }

    /// Append a header, keeping any existing values of the same field
    #[must_use]
    pub fn header(mut self, field: &str, value: &str) -> Self {
        self.headers.add(field, Some(value));
        self
    }

    /// Set the body from raw bytes
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the body from a string
    #[must_use]
    pub fn body_string(self, body: impl Into<String>) -> Self {
        self.body_bytes(body.into())
    }

    /// Serialize `value` as the JSON body.
    ///
    /// Sets `Content-Type: application/json; charset=utf-8` unless a
    /// Content-Type was already provided.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Json` if serialization fails.
    pub fn json<T: Serialize>(self, value: &T, options: JsonOptions) -> Result<Self, HttpError> {
        let mut value = serde_json::to_value(value)?;
        if !options.include_default_valued_fields {
            prune_default_fields(&mut value);
        }
        let body = serde_json::to_vec(&value)?;
        Ok(self
            .with_default_content_type("application/json; charset=utf-8")
            .body_bytes(body))
    }

    /// Serialize the fields of `value` as a URL-encoded form body.
    ///
    /// Sets `Content-Type: application/x-www-form-urlencoded` unless a
    /// Content-Type was already provided.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::FormEncode` if `value` does not serialize to a flat
    /// sequence of key/value pairs.
    pub fn form<T: Serialize>(self, value: &T) -> Result<Self, HttpError> {
        let encoded = serde_urlencoded::to_string(value)?;
        Ok(self
            .with_default_content_type("application/x-www-form-urlencoded")
            .body_string(encoded))
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Return 3xx responses as-is instead of following `Location`
    #[must_use]
    pub fn disable_auto_redirect(mut self, disable: bool) -> Self {
        self.disable_auto_redirect = disable;
        self
    }

    /// Ask for the connection to be closed after this exchange
    #[must_use]
    pub fn disable_keep_alive(mut self, disable: bool) -> Self {
        self.disable_keep_alive = disable;
        self
    }

    /// Do not negotiate gzip on this request
    #[must_use]
    pub fn disable_compression(mut self, disable: bool) -> Self {
        self.disable_compression = disable;
        self
    }

    fn with_default_content_type(mut self, content_type: &str) -> Self {
        if !self.headers.contains("Content-Type") {
            self.headers.set("Content-Type", Some(content_type));
        }
        self
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMultimap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMultimap {
        &mut self.headers
    }

    /// Request body, `None` when the request has no body
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub fn request_proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    #[must_use]
    pub fn request_credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn is_auto_redirect_disabled(&self) -> bool {
        self.disable_auto_redirect
    }

    #[must_use]
    pub fn is_keep_alive_disabled(&self) -> bool {
        self.disable_keep_alive
    }

    #[must_use]
    pub fn is_compression_disabled(&self) -> bool {
        self.disable_compression
    }
}

/// Drop object fields holding `null`, `false` or numeric zero, at every depth.
fn prune_default_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, field| !is_default_valued(field));
            map.values_mut().for_each(prune_default_fields);
        }
        Value::Array(items) => items.iter_mut().for_each(prune_default_fields),
        _ => {}
    }
}

fn is_default_valued(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => {
            number.as_u64() == Some(0)
                || number.as_i64() == Some(0)
                || number.as_f64().is_some_and(|n| n.abs() < f64::EPSILON)
        }
        _ => false,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verb_constructors() {
        assert_eq!(RequestSpec::get("https://a").method(), "GET");
        assert_eq!(RequestSpec::head("https://a").method(), "HEAD");
        assert_eq!(RequestSpec::delete("https://a").method(), "DELETE");
        assert!(RequestSpec::get("https://a").body().is_none());
    }

    #[test]
    fn test_derive_from_is_a_copy_with_merged_headers() {
        let base = RequestSpec::get("https://api.example.com")
            .header("Accept", "text/plain")
            .header("X-Tenant", "t1");
        let extra: HeaderMultimap = [("accept", "application/json")].into_iter().collect();

        let derived = RequestSpec::derive_from(&base, &extra);

        assert_eq!(derived.headers().get("Accept"), "application/json");
        assert_eq!(derived.headers().get("X-Tenant"), "t1");
        assert_eq!(base.headers().get("Accept"), "text/plain");
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let spec = RequestSpec::post("https://a")
            .json(&json!({"a": 1}), JsonOptions::default())
            .unwrap();
        assert_eq!(
            spec.headers().get("Content-Type"),
            "application/json; charset=utf-8"
        );
        assert_eq!(spec.body().unwrap().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn test_json_keeps_caller_content_type() {
        let spec = RequestSpec::post("https://a")
            .header("content-type", "application/vnd.api+json")
            .json(&json!({}), JsonOptions::default())
            .unwrap();
        assert_eq!(spec.headers().get_all("Content-Type").count(), 1);
        assert_eq!(spec.headers().get("Content-Type"), "application/vnd.api+json");
    }

    #[test]
    fn test_json_omits_default_valued_fields() {
        let options = JsonOptions {
            include_default_valued_fields: false,
        };
        let spec = RequestSpec::post("https://a")
            .json(
                &json!({"name": "x", "note": null, "count": 0, "active": false, "nested": {"n": null, "k": 2}}),
                options,
            )
            .unwrap();
        let sent: Value = serde_json::from_slice(spec.body().unwrap()).unwrap();
        assert_eq!(sent, json!({"name": "x", "nested": {"k": 2}}));
    }

    #[test]
    fn test_form_body() {
        #[derive(Serialize)]
        struct Login<'a> {
            grant_type: &'a str,
            client_id: &'a str,
        }

        let spec = RequestSpec::post("https://a")
            .form(&Login {
                grant_type: "client_credentials",
                client_id: "my app",
            })
            .unwrap();
        assert_eq!(
            spec.headers().get("content-type"),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(
            spec.body().unwrap().as_ref(),
            b"grant_type=client_credentials&client_id=my+app"
        );
    }

    #[test]
    fn test_credentials_basic_header_and_redaction() {
        let credentials = Credentials::new("Aladdin", "open sesame");
        assert_eq!(
            credentials.basic_authorization().as_str(),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("open sesame"));
    }

    #[test]
    fn test_flags_default_off() {
        let spec = RequestSpec::get("https://a");
        assert!(!spec.is_auto_redirect_disabled());
        assert!(!spec.is_keep_alive_disabled());
        assert!(!spec.is_compression_disabled());
        let spec = spec.disable_compression(true);
        assert!(spec.is_compression_disabled());
    }
}
