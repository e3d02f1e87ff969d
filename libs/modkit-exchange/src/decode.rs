//! Response body decoding.
//!
//! The target type picks the decoding through [`DecodeBody`]:
//!
//! | target            | result                                              |
//! |-------------------|-----------------------------------------------------|
//! | `Bytes`, `Vec<u8>`| body verbatim                                       |
//! | `String`          | body text, charset resolved from Content-Type / BOM |
//! | `Structured<T>`   | XML if Content-Type contains `xml`, JSON otherwise  |

use crate::charset;
use crate::error::HttpError;
use crate::response::ResponseEnvelope;
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// Number of characters of body text carried by `HttpError::UnsuccessfulResponse`
pub const BODY_PREVIEW_CHARS: usize = 1000;

/// Conversion from a response envelope's body into a value.
pub trait DecodeBody: Sized {
    /// # Errors
    ///
    /// Returns the codec error when the body cannot be represented as `Self`.
    fn decode_body(envelope: &ResponseEnvelope) -> Result<Self, HttpError>;
}

impl DecodeBody for Bytes {
    fn decode_body(envelope: &ResponseEnvelope) -> Result<Self, HttpError> {
        Ok(envelope.body().clone())
    }
}

impl DecodeBody for Vec<u8> {
    fn decode_body(envelope: &ResponseEnvelope) -> Result<Self, HttpError> {
        Ok(envelope.body().to_vec())
    }
}

impl DecodeBody for String {
    fn decode_body(envelope: &ResponseEnvelope) -> Result<Self, HttpError> {
        Ok(body_text(envelope))
    }
}

/// Any `serde` type, parsed from XML or JSON depending on the Content-Type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structured<T>(pub T);

impl<T> Structured<T> {
    #[must_use]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> DecodeBody for Structured<T> {
    fn decode_body(envelope: &ResponseEnvelope) -> Result<Self, HttpError> {
        let text = body_text(envelope);
        let value = if is_xml(envelope.content_type()) {
            quick_xml::de::from_str(&text)?
        } else {
            serde_json::from_str(&text)?
        };
        Ok(Structured(value))
    }
}

fn is_xml(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("xml")
}

pub(crate) fn body_text(envelope: &ResponseEnvelope) -> String {
    charset::decode_text(envelope.content_type(), envelope.body())
}

/// Error returned by a success-only decode on an unsuccessful envelope
pub(crate) fn unsuccessful(envelope: &ResponseEnvelope) -> HttpError {
    let body_preview: String = body_text(envelope)
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .collect();
    HttpError::UnsuccessfulResponse {
        url: envelope.request().url().to_owned(),
        status: envelope.status(),
        reason: envelope.reason().to_owned(),
        body_preview,
        cause: envelope.error().cloned(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::response::tests::envelope;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        a: i64,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Problem {
        title: String,
        status: u16,
    }

    #[test]
    fn test_json_object() {
        let env = envelope(200, Some("application/json; charset=utf-8"), br#"{"a":1}"#);
        let item: Item = env.structured().unwrap();
        assert_eq!(item, Item { a: 1 });
    }

    #[test]
    fn test_xml_dispatch_is_case_insensitive() {
        let env = envelope(200, Some("Application/XML"), b"<Item><a>5</a></Item>");
        let item: Item = env.structured().unwrap();
        assert_eq!(item.a, 5);

        let env = envelope(200, Some("application/problem+xml"), b"<p><a>6</a></p>");
        assert_eq!(env.structured::<Item>().unwrap().a, 6);
    }

    #[test]
    fn test_missing_content_type_parses_json() {
        let env = envelope(200, None, br#"{"a":2}"#);
        assert_eq!(env.structured::<Item>().unwrap().a, 2);
    }

    #[test]
    fn test_malformed_json_is_codec_error() {
        let env = envelope(200, Some("application/json"), b"{not json");
        let err = env.structured::<Item>().unwrap_err();
        assert!(matches!(err, HttpError::Json(_)), "got {err:?}");
    }

    #[test]
    fn test_bytes_and_text_targets() {
        let env = envelope(200, Some("text/plain; charset=ISO-8859-1"), &[b'n', 0xE9]);
        assert_eq!(env.decode::<Vec<u8>>().unwrap(), vec![b'n', 0xE9]);
        assert_eq!(env.decode::<Bytes>().unwrap().len(), 2);
        assert_eq!(env.decode::<String>().unwrap(), "n\u{e9}");
    }

    #[test]
    fn test_decode_on_failure_reports_status_url_and_preview() {
        let env = envelope(404, Some("text/plain"), b"no such item");
        let err = env.decode::<String>().unwrap_err();
        match &err {
            HttpError::UnsuccessfulResponse {
                url,
                status,
                reason,
                body_preview,
                cause,
            } => {
                assert_eq!(url, "https://api.example.com/items/7");
                assert_eq!(*status, 404);
                assert_eq!(reason, "Not Found");
                assert_eq!(body_preview, "no such item");
                assert!(cause.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("https://api.example.com/items/7"));
        assert!(message.contains("404"));
    }

    #[test]
    fn test_preview_is_truncated() {
        let body = "x".repeat(BODY_PREVIEW_CHARS * 3);
        let env = envelope(500, None, body.as_bytes());
        let Err(HttpError::UnsuccessfulResponse { body_preview, .. }) = env.decode::<Bytes>() else {
            panic!("expected UnsuccessfulResponse");
        };
        assert_eq!(body_preview.chars().count(), BODY_PREVIEW_CHARS);
    }

    #[test]
    fn test_decode_error_reads_problem_document() {
        let env = envelope(
            404,
            Some("application/problem+json"),
            br#"{"title":"Not Found","status":404}"#,
        );
        let problem: Problem = env.structured_error().unwrap();
        assert_eq!(problem.status, 404);
        assert_eq!(problem.title, "Not Found");
    }

    #[test]
    fn test_decode_error_on_success_is_no_error_present() {
        let env = envelope(200, Some("application/json"), br#"{"a":1}"#);
        let err = env.decode_error::<String>().unwrap_err();
        assert!(matches!(err, HttpError::NoErrorPresent));
        assert_eq!(err.to_string(), "decode_error called with no error present");
    }

    #[test]
    fn test_empty_body_json_fails() {
        let env = envelope(200, Some("application/json"), b"");
        assert!(env.structured::<Item>().is_err());
    }
}
