//! Listener bookkeeping shared by the loader and every drawable.
//!
//! [`Evented`] keeps its own registry of listeners, independent of whatever
//! native event system it may later be bound to, so listeners can be
//! registered before a native object exists and replayed onto it afterwards.

pub mod evented;
pub mod registry;

pub use evented::Evented;
pub use registry::{EventRegistry, Registration};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An event delivered to listeners.
///
/// `detail` carries structured event data; a bare event has none.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub detail: Option<serde_json::Value>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, detail: Option<serde_json::Value>) -> Self {
        Self {
            event_type: event_type.into(),
            detail,
        }
    }

    /// Event without any detail payload
    pub fn bare(event_type: impl Into<String>) -> Self {
        Self::new(event_type, None)
    }

    pub fn is_bare(&self) -> bool {
        self.detail.is_none()
    }
}

/// Listener callback signature
pub type EventHandler = dyn Fn(&Event) + Send + Sync;

/// A shareable listener callback.
///
/// Two callbacks are equal when they are clones of the same allocation,
/// which is what removal and `has_listener` queries match on. Keep a clone
/// of the callback around to remove it later.
#[derive(Clone)]
pub struct Callback(Arc<EventHandler>);

impl Callback {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }

    pub fn ptr_eq(&self, other: &Callback) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Callback {}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// Options attached to a listener registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerOptions {
    /// Remove the registration before its first invocation.
    pub once: bool,
    /// Capture-phase flag of the native event system. This is the only
    /// field removal and lookup refine on.
    pub capture: bool,
}

impl ListenerOptions {
    pub fn once() -> Self {
        Self {
            once: true,
            ..Self::default()
        }
    }

    pub fn capture() -> Self {
        Self {
            capture: true,
            ..Self::default()
        }
    }

    /// Whether a removal or lookup request with these options refers to a
    /// registration made with `registered`.
    pub fn refines(&self, registered: &ListenerOptions) -> bool {
        self.capture == registered.capture
    }
}
