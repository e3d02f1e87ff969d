#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP exchange engine for `ModKit`
//!
//! This crate executes plain-data [`RequestSpec`]s over a hyper/rustls
//! transport and hands back a [`ResponseEnvelope`] holding everything that
//! happened:
//! - Ordered, case-insensitive header multimap ([`HeaderMultimap`])
//! - Correlation id written into every outgoing request ([`CorrelationContext`])
//! - Gzip negotiation and decompression, with the body limit applied to inflated bytes
//! - Per-request timeout, proxy, basic credentials and redirect opt-out
//! - Charset-aware decoding of bodies into bytes, text, JSON or XML
//!
//! # Failure model
//!
//! [`Exchange::execute`] returns `Err` only for requests that cannot be sent.
//! Once I/O has started, failures are captured in the envelope: a request that
//! never got a response has status `0`, a body that broke midway keeps the
//! status, headers and partial bytes. Status codes outside `2xx` are normal
//! responses; the decode methods turn them into
//! [`HttpError::UnsuccessfulResponse`].
//!
//! # Example
//!
//! ```ignore
//! use modkit_exchange::{CorrelationContext, Exchange, RequestSpec};
//! use std::time::Duration;
//!
//! let exchange = Exchange::builder()
//!     .timeout(Duration::from_secs(10))
//!     .user_agent("my-app/1.0")
//!     .build()?;
//!
//! let spec = RequestSpec::get("https://example.com/api").header("Accept", "application/json");
//! let envelope = exchange.execute(&spec, &CorrelationContext::generate()).await?;
//! let data: MyData = envelope.structured()?;
//! ```

mod builder;
pub mod charset;
mod config;
mod context;
mod decode;
mod error;
mod exchange;
mod headers;
mod layers;
mod request;
mod response;
pub mod transport;

pub use builder::ExchangeBuilder;
pub use config::{
    CORRELATION_ID_HEADER, DEFAULT_MAX_BODY_SIZE, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
    ExchangeConfig, RedirectConfig, TlsRootConfig, TransportSecurity,
};
pub use context::CorrelationContext;
pub use decode::{BODY_PREVIEW_CHARS, DecodeBody, Structured};
pub use error::{HttpError, InvalidUriKind};
pub use exchange::Exchange;
pub use headers::HeaderMultimap;
pub use layers::{RedirectMode, RedirectPolicy};
pub use request::{Credentials, JsonOptions, Proxy, RequestSpec};
pub use response::{ResponseBody, ResponseEnvelope};
pub use transport::{HyperTransport, TransportService};
