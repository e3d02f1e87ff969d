use crate::decode::{self, DecodeBody, Structured};
use crate::error::HttpError;
use crate::headers::HeaderMultimap;
use crate::request::RequestSpec;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Type alias for the boxed response body produced by the transport.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Complete outcome of one request execution.
///
/// Produced by [`Exchange::execute`](crate::Exchange::execute) for every
/// exchange that got past argument validation, whether or not the server
/// answered. Non-2xx statuses and captured transport failures are both
/// represented here; [`is_success`](Self::is_success) tells them apart from
/// a good response.
///
/// Body-reading API:
/// - [`decode::<T>()`](Self::decode) / [`structured::<T>()`](Self::structured) - success only
/// - [`decode_error::<T>()`](Self::decode_error) / [`structured_error::<T>()`](Self::structured_error) - failure only
/// - [`body()`](Self::body) / [`text()`](Self::text) - no status check
#[derive(Debug)]
pub struct ResponseEnvelope {
    status: u16,
    headers: HeaderMultimap,
    body: Bytes,
    decompressed: bool,
    request: RequestSpec,
    error: Option<Arc<HttpError>>,
}

impl ResponseEnvelope {
    pub(crate) fn new(
        request: RequestSpec,
        status: u16,
        headers: HeaderMultimap,
        body: Bytes,
        decompressed: bool,
        error: Option<HttpError>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            decompressed,
            request,
            error: error.map(Arc::new),
        }
    }

    /// Envelope for an exchange that never produced a response
    pub(crate) fn no_response(request: RequestSpec, error: HttpError) -> Self {
        Self::new(
            request,
            0,
            HeaderMultimap::new(),
            Bytes::new(),
            false,
            Some(error),
        )
    }

    /// Status code; `0` when no response was received
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Status as a typed code, `None` when no response was received
    #[must_use]
    pub fn status_code(&self) -> Option<http::StatusCode> {
        http::StatusCode::from_u16(self.status).ok()
    }

    /// Canonical reason phrase of the status
    #[must_use]
    pub fn reason(&self) -> &'static str {
        if self.status == 0 {
            return "No Response";
        }
        self.status_code()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown Status")
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMultimap {
        &self.headers
    }

    /// Body bytes, already decompressed when [`is_decompressed`](Self::is_decompressed) is set
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the engine negotiated gzip and inflated the body
    #[must_use]
    pub fn is_decompressed(&self) -> bool {
        self.decompressed
    }

    /// Copy of the request as it was executed (with engine-added headers)
    #[must_use]
    pub fn request(&self) -> &RequestSpec {
        &self.request
    }

    /// Transport failure captured during the exchange
    #[must_use]
    pub fn error(&self) -> Option<&Arc<HttpError>> {
        self.error.as_ref()
    }

    /// Status in 200..=299 and no captured transport failure
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status) && self.error.is_none()
    }

    /// Value of the `Content-Type` header, or `""`
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.headers.get("Content-Type")
    }

    /// Body as charset-resolved text, without a status check
    #[must_use]
    pub fn text(&self) -> String {
        decode::body_text(self)
    }

    /// Decode the body of a successful exchange.
    ///
    /// `T` selects the decoding: [`Bytes`] and `Vec<u8>` return the body
    /// verbatim, [`String`] decodes text, [`Structured<T>`] parses XML or JSON
    /// depending on the Content-Type.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::UnsuccessfulResponse` if the exchange was not
    /// successful, or the codec error if the body does not decode into `T`.
    pub fn decode<T: DecodeBody>(&self) -> Result<T, HttpError> {
        if !self.is_success() {
            return Err(decode::unsuccessful(self));
        }
        T::decode_body(self)
    }

    /// Decode the body of an unsuccessful exchange (e.g. a problem-details document).
    ///
    /// # Errors
    ///
    /// Returns `HttpError::NoErrorPresent` if the exchange was successful, or
    /// the codec error if the body does not decode into `T`.
    pub fn decode_error<T: DecodeBody>(&self) -> Result<T, HttpError> {
        if self.is_success() {
            return Err(HttpError::NoErrorPresent);
        }
        T::decode_body(self)
    }

    /// Shorthand for `decode::<Structured<T>>()`
    ///
    /// # Errors
    ///
    /// Same as [`decode`](Self::decode).
    pub fn structured<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        self.decode::<Structured<T>>().map(Structured::into_inner)
    }

    /// Shorthand for `decode_error::<Structured<T>>()`
    ///
    /// # Errors
    ///
    /// Same as [`decode_error`](Self::decode_error).
    pub fn structured_error<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        self.decode_error::<Structured<T>>()
            .map(Structured::into_inner)
    }
}
