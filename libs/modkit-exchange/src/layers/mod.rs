//! Tower middleware used by the hyper transport
//!
//! - [`RedirectPolicy`] - redirect policy for `tower_http::follow_redirect`,
//!   with a per-request opt-out via [`RedirectMode`]

mod redirect;

pub use redirect::{RedirectMode, RedirectPolicy};
