//! Active-provider selection published by the hosting application.
//!
//! The weather service only reads the store and reacts to switches; it
//! never writes to it.

use parking_lot::Mutex;
use skycast_core::ProviderKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub type ProviderListener = Box<dyn Fn(ProviderKind) + Send + Sync>;

/// External source of the preferred provider.
pub trait ActiveProviderStore: Send + Sync {
    fn current_provider(&self) -> ProviderKind;

    /// Register `listener` for provider switches until the returned handle
    /// is dropped or unsubscribed.
    fn subscribe(&self, listener: ProviderListener) -> Subscription;
}

/// Handle to a store registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

struct StoreInner {
    current: Mutex<ProviderKind>,
    listeners: Mutex<Vec<(u64, Arc<dyn Fn(ProviderKind) + Send + Sync>)>>,
    next_id: AtomicU64,
}

/// In-process store. Listeners run synchronously on the caller of
/// [`InMemoryProviderStore::set_provider`].
#[derive(Clone)]
pub struct InMemoryProviderStore {
    inner: Arc<StoreInner>,
}

impl InMemoryProviderStore {
    pub fn new(initial: ProviderKind) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                current: Mutex::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Switch the active provider, notifying listeners when it changed
    pub fn set_provider(&self, provider: ProviderKind) {
        {
            let mut current = self.inner.current.lock();
            if *current == provider {
                return;
            }
            *current = provider;
        }

        // Snapshot so a listener can (un)subscribe without deadlocking
        let listeners: Vec<_> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        tracing::debug!(
            "Active provider set to {}, notifying {} listener(s)",
            provider,
            listeners.len()
        );
        for listener in listeners {
            listener(provider);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl Default for InMemoryProviderStore {
    fn default() -> Self {
        Self::new(ProviderKind::default())
    }
}

impl ActiveProviderStore for InMemoryProviderStore {
    fn current_provider(&self) -> ProviderKind {
        *self.inner.current.lock()
    }

    fn subscribe(&self, listener: ProviderListener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::from(listener)));

        let inner: Weak<StoreInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.lock().retain(|(existing, _)| *existing != id);
            }
        })
    }
}
