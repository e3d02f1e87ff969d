//! Redirect policy for the hyper transport
//!
//! - follows up to [`RedirectConfig::max_redirects`] hops
//! - a single request opts out through the [`RedirectMode`] extension
//! - strips `Authorization`, `Cookie` and `Proxy-Authorization` once the chain
//!   leaves the original origin

use crate::config::RedirectConfig;
use http::{Request, Uri, header};
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Per-request redirect handling, attached as a request extension by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectMode {
    #[default]
    Follow,
    /// Hand 3xx responses back to the caller untouched
    Manual,
}

/// Redirect policy plugged into `tower_http::follow_redirect`.
///
/// A fresh clone is taken for every request, so the counters below are
/// per-exchange.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    config: RedirectConfig,
    follow: bool,
    redirect_count: usize,
    cross_origin_detected: bool,
}

impl RedirectPolicy {
    #[must_use]
    pub fn new(config: RedirectConfig) -> Self {
        Self {
            config,
            follow: true,
            redirect_count: 0,
            cross_origin_detected: false,
        }
    }

    /// Same scheme, host and port. A missing scheme counts as `https`.
    fn is_same_origin(original: &Uri, target: &Uri) -> bool {
        let orig_scheme = original.scheme_str().unwrap_or("https");
        let target_scheme = target.scheme_str().unwrap_or("https");

        let orig_port = original
            .port_u16()
            .unwrap_or_else(|| default_port(orig_scheme));
        let target_port = target
            .port_u16()
            .unwrap_or_else(|| default_port(target_scheme));

        orig_scheme == target_scheme
            && original.host().unwrap_or("") == target.host().unwrap_or("")
            && orig_port == target_port
    }
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "http" => 80,
        "https" => 443,
        _ => 0,
    }
}

impl<B: Clone, E> Policy<B, E> for RedirectPolicy {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, E> {
        if !self.follow {
            return Ok(Action::Stop);
        }

        self.redirect_count += 1;
        if self.redirect_count > self.config.max_redirects {
            tracing::debug!(
                count = self.redirect_count,
                max = self.config.max_redirects,
                "redirect limit reached"
            );
            return Ok(Action::Stop);
        }

        let original = attempt.previous();
        let target = attempt.location();
        if !Self::is_same_origin(original, target) {
            self.cross_origin_detected = true;
            tracing::debug!(%original, %target, "cross-origin redirect");
        }

        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        // Extensions are only present on the first request of the chain
        if request.extensions().get::<RedirectMode>() == Some(&RedirectMode::Manual) {
            self.follow = false;
        }

        if self.cross_origin_detected && self.config.strip_sensitive_headers {
            let headers = request.headers_mut();
            for name in SENSITIVE_HEADERS {
                if headers.remove(name).is_some() {
                    tracing::debug!(header = %name, "stripped sensitive header on cross-origin redirect");
                }
            }
        }
    }

    fn clone_body(&self, body: &B) -> Option<B> {
        // 307/308 replay the body
        Some(body.clone())
    }
}
