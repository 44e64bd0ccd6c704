//! Typed callback signals.
//!
//! A [`Signal`] is an append-only list of callbacks invoked in registration
//! order. It backs the transport's named events as well as the model's
//! `mesh_ready` and `component_removed` notifications.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Callback stored in a signal.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of callbacks for one payload type.
pub struct Signal<T> {
    callbacks: RwLock<Vec<Callback<T>>>,
}

impl<T> Signal<T> {
    /// Create a signal with no callbacks.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Append a callback.
    pub fn connect<F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Invoke every callback with `payload`, returning how many ran.
    ///
    /// Callbacks run on a snapshot of the list, so a callback may connect
    /// further callbacks without deadlocking; those only see later emits.
    pub fn emit(&self, payload: &T) -> usize {
        let callbacks = self.callbacks.read().clone();
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    /// Number of connected callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("callbacks", &self.len())
            .finish()
    }
}
