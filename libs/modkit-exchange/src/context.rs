//! Correlation id propagation.
//!
//! A [`CorrelationContext`] is passed explicitly to
//! [`Exchange::execute`](crate::Exchange::execute), which writes its id into the
//! configured correlation header of every outgoing request.
//!
//! For call trees that do not thread the value by hand, a context can be bound
//! to a task scope with [`CorrelationContext::scope`]; everything awaited inside
//! the scope sees it through [`CorrelationContext::current`], and nested scopes
//! override it for their own subtree only.
//!
//! ```ignore
//! let ctx = CorrelationContext::generate();
//! ctx.scope(async {
//!     // deep inside the call tree
//!     let envelope = exchange.execute(&spec, &CorrelationContext::current()).await?;
//! }).await;
//! ```

use std::future::Future;

tokio::task_local! {
    static CURRENT: CorrelationContext;
}

/// Correlation identifier carried by one logical call tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationContext {
    id: Option<String>,
}

impl CorrelationContext {
    /// Context carrying `id`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }

    /// Context without an id; the engine removes the correlation header.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context with a fresh random (UUID v4) id
    #[must_use]
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Same context with `id` replacing the current one
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Context bound by the innermost enclosing [`scope`](Self::scope), or an empty one.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.try_with(Self::clone).unwrap_or_default()
    }

    /// Run `future` with this context as [`current`](Self::current).
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT.scope(self, future).await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_current_outside_scope_is_empty() {
        assert_eq!(CorrelationContext::current(), CorrelationContext::empty());
        assert!(CorrelationContext::current().id().is_none());
    }

    #[tokio::test]
    async fn test_nested_calls_inherit_scope() {
        async fn child() -> Option<String> {
            CorrelationContext::current().id().map(str::to_owned)
        }

        let seen = CorrelationContext::new("req-1")
            .scope(async { child().await })
            .await;
        assert_eq!(seen.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_inner_scope_overrides_only_its_subtree() {
        let (inner, outer) = CorrelationContext::new("outer")
            .scope(async {
                let inner = CorrelationContext::current()
                    .with_id("inner")
                    .scope(async { CorrelationContext::current() })
                    .await;
                (inner, CorrelationContext::current())
            })
            .await;

        assert_eq!(inner.id(), Some("inner"));
        assert_eq!(outer.id(), Some("outer"));
    }

    #[test]
    fn test_generate_produces_distinct_ids() {
        let a = CorrelationContext::generate();
        let b = CorrelationContext::generate();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().map(str::len), Some(36));
    }
}
