//! Subscriber callback registry.
//!
//! Multiple subscribers can watch the same device; each registration gets a
//! token so it can be removed independently. The registry never invokes
//! callbacks itself: callers take a [`subscribers`](HandlerRegistry::subscribers)
//! snapshot, release whatever lock guards the registry, and invoke the
//! clones. That keeps callbacks free to re-enter register/unregister.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use strum_macros::Display;
use uuid::Uuid;

use crate::light::LightId;

pub type StateCallback = Arc<dyn Fn(EventKind, &Value) + Send + Sync + 'static>;

/// Why a state message is being delivered.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// First sighting of a device, or the initial snapshot on registration.
    #[strum(serialize = "new")]
    New,
    /// A reconciled state change on an already-known device.
    #[strum(serialize = "update")]
    Update,
}

/// Registered callbacks, keyed by device then registration token.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<LightId, HashMap<Uuid, StateCallback>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one device. The returned token is the handle
    /// for [`unregister`](Self::unregister).
    pub fn register(&mut self, id: LightId, callback: StateCallback) -> Uuid {
        let token = Uuid::new_v4();
        self.handlers.entry(id).or_default().insert(token, callback);
        token
    }

    /// Remove one registration. Returns whether anything was removed;
    /// unknown tokens are a no-op.
    pub fn unregister(&mut self, id: &LightId, token: &Uuid) -> bool {
        let Some(per_device) = self.handlers.get_mut(id) else {
            return false;
        };
        let removed = per_device.remove(token).is_some();
        if per_device.is_empty() {
            self.handlers.remove(id);
        }
        removed
    }

    /// Snapshot of every callback registered for `id`.
    ///
    /// The clones stay valid after the registry is unlocked or mutated, so
    /// delivery can happen without holding any lock.
    pub fn subscribers(&self, id: &LightId) -> Vec<StateCallback> {
        self.handlers
            .get(id)
            .map(|per_device| per_device.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, id: &LightId) -> usize {
        self.handlers.get(id).map_or(0, HashMap::len)
    }

    pub fn total_subscribers(&self) -> usize {
        self.handlers.values().map(HashMap::len).sum()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
