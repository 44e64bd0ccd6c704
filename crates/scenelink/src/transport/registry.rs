//! Named event registry.

use std::sync::Arc;

use dashmap::DashMap;
use scenelink_ecs::Signal;
use serde_json::Value;

/// Append-only map from event name to the callbacks bound under it.
#[derive(Debug, Default)]
pub struct EventRegistry {
    events: DashMap<String, Arc<Signal<Value>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a callback under `name`.
    pub fn bind<F>(&self, name: &str, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events
            .entry(name.to_string())
            .or_default()
            .connect(callback);
    }

    /// Invoke the callbacks bound under `name` in registration order.
    ///
    /// Returns how many ran; an unbound name is a no-op.
    pub fn trigger(&self, name: &str, payload: &Value) -> usize {
        // Clone the signal out so callbacks can bind without holding the shard lock
        let signal = self.events.get(name).map(|entry| Arc::clone(entry.value()));
        signal.map_or(0, |signal| signal.emit(payload))
    }

    /// Number of callbacks bound under `name`.
    pub fn bound(&self, name: &str) -> usize {
        self.events.get(name).map_or(0, |entry| entry.len())
    }
}
