//! Subscriber registry with owned subscription handles
//!
//! Every subscriber gets its own channel and a [`SubscriptionHandle`] that
//! removes exactly that subscriber. Handles unsubscribe on drop; calling
//! [`SubscriptionHandle::unsubscribe`] more than once is a no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

type Dispose = Box<dyn FnOnce() + Send>;

/// Owned registration. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    id: u64,
    dispose: Mutex<Option<Dispose>>,
}

impl SubscriptionHandle {
    /// Wrap an arbitrary release action
    pub fn new(id: u64, dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            dispose: Mutex::new(Some(Box::new(dispose))),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.dispose
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Release the registration. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        let dispose = self
            .dispose
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(dispose) = dispose {
            dispose();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

struct Registry<T> {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<T>>>,
}

impl<T> Registry<T> {
    fn remove(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }
}

/// Fan-out of `T` to every live subscriber
pub struct EventEmitter<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Clone + Send + 'static> EventEmitter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);

        self.registry
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);

        let registry: Weak<Registry<T>> = Arc::downgrade(&self.registry);
        let handle = SubscriptionHandle::new(id, move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(id);
            }
        });

        (handle, rx)
    }

    /// Deliver `event` to every subscriber, returning how many received it.
    /// Subscribers whose receiver is gone are pruned.
    pub fn emit(&self, event: &T) -> usize {
        let mut subscribers = self
            .registry
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
