//! Request descriptors.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::LoaderError;
use crate::key::CompositeKey;

/// Boxed future produced by a loader.
pub type LoaderFuture<T> = BoxFuture<'static, Result<Option<T>, LoaderError>>;

/// A lazy asynchronous source of one payload. Invoked at most once, and
/// only when the cache cannot answer from a stored record.
pub type Loader<T> = Box<dyn FnOnce() -> LoaderFuture<T> + Send>;

/// Which key scope a request clears before its result is stored.
///
/// The directive fires whether or not the loader succeeds, so a caller can
/// rely on the eviction having happened regardless of the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictDirective {
    /// Clear nothing.
    #[default]
    None,
    /// Clear both layers entirely.
    All,
    /// Clear every entry under the provider key.
    Provider,
    /// Clear every group under `(provider, dynamic)`.
    DynamicKey,
    /// Clear the single `(provider, dynamic, group)` entry.
    DynamicKeyGroup,
}

impl EvictDirective {
    /// Whether this directive clears any scope at all.
    pub(crate) fn demands_eviction(self) -> bool {
        self != EvictDirective::None
    }
}

/// Everything one provider invocation carries into the cache.
pub struct RequestDescriptor<T> {
    pub(crate) provider_key: String,
    pub(crate) dynamic_key: Option<String>,
    pub(crate) group_key: Option<String>,
    pub(crate) lifetime: Duration,
    pub(crate) expirable: bool,
    pub(crate) requires_detailed_response: bool,
    pub(crate) evict: EvictDirective,
    pub(crate) type_tag: String,
    pub(crate) loader: Loader<T>,
}

impl<T> RequestDescriptor<T> {
    /// Describe a request for `provider_key` backed by `loader`.
    ///
    /// Defaults: no dynamic or group key, zero lifetime (never expires),
    /// expirable, bare response, no eviction, and a type tag derived from
    /// the payload type's name.
    pub fn new<F, Fut>(provider_key: impl Into<String>, loader: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, LoaderError>> + Send + 'static,
    {
        Self {
            provider_key: provider_key.into(),
            dynamic_key: None,
            group_key: None,
            lifetime: Duration::ZERO,
            expirable: true,
            requires_detailed_response: false,
            evict: EvictDirective::None,
            type_tag: std::any::type_name::<T>().to_string(),
            loader: Box::new(move || Box::pin(loader()) as LoaderFuture<T>),
        }
    }

    /// Address a specific dynamic key under the provider.
    pub fn with_dynamic_key(mut self, dynamic_key: impl Into<String>) -> Self {
        self.dynamic_key = Some(dynamic_key.into());
        self
    }

    /// Address a group under the dynamic key.
    pub fn with_group_key(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    /// Set the record lifetime. [`Duration::ZERO`] means never expires.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Exempt the record from the sweeper and budget reclamation. It
    /// still counts against the size budget and still honours explicit
    /// evictions.
    pub fn non_expirable(mut self) -> Self {
        self.expirable = false;
        self
    }

    /// Return a [`crate::record::Reply`] (payload + source) instead of the
    /// bare payload.
    pub fn detailed(mut self) -> Self {
        self.requires_detailed_response = true;
        self
    }

    /// Clear a key scope as part of this request.
    pub fn with_eviction(mut self, directive: EvictDirective) -> Self {
        self.evict = directive;
        self
    }

    /// Override the structural type tag stored for schema migrations.
    /// Pin this explicitly for records that must survive refactors.
    pub fn with_type_tag(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = type_tag.into();
        self
    }

    /// The composite key this request addresses.
    pub(crate) fn key(&self) -> CompositeKey {
        CompositeKey {
            provider: self.provider_key.clone(),
            dynamic: self.dynamic_key.clone(),
            group: self.group_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let descriptor: RequestDescriptor<u32> =
            RequestDescriptor::new("users", || async { Ok(Some(1)) });

        assert_eq!(descriptor.provider_key, "users");
        assert!(descriptor.dynamic_key.is_none());
        assert!(descriptor.group_key.is_none());
        assert_eq!(descriptor.lifetime, Duration::ZERO);
        assert!(descriptor.expirable);
        assert!(!descriptor.requires_detailed_response);
        assert_eq!(descriptor.evict, EvictDirective::None);
        assert_eq!(descriptor.type_tag, std::any::type_name::<u32>());
    }

    #[test]
    fn test_builder_methods() {
        let descriptor: RequestDescriptor<u32> =
            RequestDescriptor::new("users", || async { Ok(None) })
                .with_dynamic_key("v1")
                .with_group_key("g1")
                .with_lifetime(Duration::from_secs(60))
                .non_expirable()
                .detailed()
                .with_eviction(EvictDirective::Provider)
                .with_type_tag("User");

        assert_eq!(descriptor.key().dynamic.as_deref(), Some("v1"));
        assert_eq!(descriptor.key().group.as_deref(), Some("g1"));
        assert_eq!(descriptor.lifetime, Duration::from_secs(60));
        assert!(!descriptor.expirable);
        assert!(descriptor.requires_detailed_response);
        assert_eq!(descriptor.evict, EvictDirective::Provider);
        assert_eq!(descriptor.type_tag, "User");
    }

    #[tokio::test]
    async fn test_loader_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let descriptor: RequestDescriptor<u32> = RequestDescriptor::new("users", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some(7)) }
        });

        // Building the descriptor must not touch the loader.
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = (descriptor.loader)().await.unwrap();
        assert_eq!(result, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_directive_demands() {
        assert!(!EvictDirective::None.demands_eviction());
        assert!(EvictDirective::All.demands_eviction());
        assert!(EvictDirective::Provider.demands_eviction());
        assert!(EvictDirective::DynamicKey.demands_eviction());
        assert!(EvictDirective::DynamicKeyGroup.demands_eviction());
    }
}
