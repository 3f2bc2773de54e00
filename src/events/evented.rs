use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::{
    backend::NativeEvents,
    events::{Callback, Event, EventRegistry, ListenerOptions, Registration},
    prelude::lock,
};

#[derive(Default)]
struct EventedInner {
    registry: EventRegistry,
    native: Option<Arc<dyn NativeEvents>>,
}

/// Uniform `on / once / off / dispatch / has_listener` surface.
///
/// Cloning an `Evented` yields another handle to the same registry. When a
/// native dispatcher is bound, registrations are forwarded to it as well;
/// registrations made before binding are the pending listeners that
/// [`Evented::bind_native`] replays.
///
/// No operation fails: blank event types are ignored and removing an
/// unknown listener is a no-op.
#[derive(Clone, Default)]
pub struct Evented {
    inner: Arc<Mutex<EventedInner>>,
}

impl Evented {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repeating listener
    pub fn on(&self, event_type: &str, callback: Callback) {
        self.on_with(event_type, callback, ListenerOptions::default());
    }

    /// Register a listener that is removed before its first invocation
    pub fn once(&self, event_type: &str, callback: Callback) {
        self.on_with(event_type, callback, ListenerOptions::once());
    }

    pub fn on_with(&self, event_type: &str, callback: Callback, options: ListenerOptions) {
        if is_blank(event_type) {
            return;
        }

        let (id, native) = {
            let mut inner = lock(&self.inner);
            let id = inner.registry.add(event_type, callback.clone(), options);
            (id, inner.native.clone())
        };
        if let Some(native) = native {
            let registration = Registration {
                id,
                callback,
                options,
                native_id: None,
            };
            self.forward(&native, vec![(event_type.to_string(), registration)]);
        }
    }

    /// Remove listeners.
    ///
    /// - `off(Some(t), Some(cb), _)` removes that listener from `t`
    /// - `off(Some(t), None, _)` removes every listener of `t`
    /// - `off(None, None, None)` removes everything
    ///
    /// `options` only narrows the match by its `capture` flag.
    pub fn off(
        &self,
        event_type: Option<&str>,
        callback: Option<&Callback>,
        options: Option<&ListenerOptions>,
    ) {
        if event_type.is_some_and(is_blank) {
            return;
        }

        let (removed, native) = {
            let mut inner = lock(&self.inner);
            let removed = inner.registry.remove_matching(event_type, callback, options);
            (removed, inner.native.clone())
        };
        if let Some(native) = native {
            for native_id in removed.iter().filter_map(|reg| reg.native_id) {
                native.remove_listener(native_id);
            }
        }
    }

    pub fn off_listener(&self, event_type: &str, callback: &Callback) {
        self.off(Some(event_type), Some(callback), None);
    }

    pub fn off_type(&self, event_type: &str) {
        self.off(Some(event_type), None, None);
    }

    pub fn off_all(&self) {
        self.off(None, None, None);
    }

    /// Invoke the listeners of `event_type` synchronously, in registration
    /// order.
    ///
    /// The listener set is captured when dispatch starts: listeners added by
    /// a listener wait for the next dispatch, listeners removed by an
    /// earlier listener in the same pass are skipped.
    pub fn dispatch(&self, event_type: &str, detail: Option<serde_json::Value>) {
        if is_blank(event_type) {
            return;
        }

        let event = Event::new(event_type, detail);
        let snapshot = lock(&self.inner).registry.snapshot(event_type);

        for registration in snapshot {
            let live = if registration.options.once {
                self.remove_registration(event_type, registration.id)
            } else {
                lock(&self.inner)
                    .registry
                    .contains_id(event_type, registration.id)
            };
            if live {
                registration.callback.call(&event);
            }
        }
    }

    pub fn has_listener(
        &self,
        event_type: &str,
        callback: Option<&Callback>,
        options: Option<&ListenerOptions>,
    ) -> bool {
        if is_blank(event_type) {
            return false;
        }
        lock(&self.inner)
            .registry
            .has_matching(event_type, callback, options)
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        lock(&self.inner).registry.count(event_type)
    }

    /// Registrations not yet forwarded to a native dispatcher
    pub fn pending_listeners(&self) -> usize {
        lock(&self.inner).registry.unattached().len()
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.inner).native.is_some()
    }

    /// Bind a native dispatcher and replay every pending registration onto
    /// it, in registration order. Later registrations are forwarded as they
    /// happen.
    pub fn bind_native(&self, native: Arc<dyn NativeEvents>) {
        let pending = {
            let mut inner = lock(&self.inner);
            inner.native = Some(native.clone());
            inner.registry.unattached()
        };
        let replayed = pending.len();
        self.forward(&native, pending);
        log::debug!("bound native dispatcher, replayed {replayed} listener(s)");
    }

    /// Hand registrations to the native dispatcher, then record their native
    /// ids. The registry is unlocked while the dispatcher runs, so it may
    /// call back into this `Evented`. Registrations removed in between are
    /// withdrawn from the dispatcher again.
    fn forward(&self, native: &Arc<dyn NativeEvents>, pending: Vec<(String, Registration)>) {
        let forwarded: Vec<_> = pending
            .into_iter()
            .map(|(event_type, registration)| {
                let callback = self.native_callback(
                    &event_type,
                    registration.id,
                    &registration.callback,
                    registration.options,
                );
                let native_id = native.add_listener(&event_type, callback);
                (event_type, registration.id, native_id)
            })
            .collect();

        let stale: Vec<_> = {
            let mut inner = lock(&self.inner);
            forwarded
                .into_iter()
                .filter(|(event_type, id, native_id)| {
                    !inner.registry.set_native_id(event_type, *id, *native_id)
                })
                .map(|(_, _, native_id)| native_id)
                .collect()
        };
        for native_id in stale {
            native.remove_listener(native_id);
        }
    }

    fn remove_registration(&self, event_type: &str, id: u64) -> bool {
        let (removed, native) = {
            let mut inner = lock(&self.inner);
            (inner.registry.remove_id(event_type, id), inner.native.clone())
        };
        match removed {
            Some(registration) => {
                if let (Some(native), Some(native_id)) = (native, registration.native_id) {
                    native.remove_listener(native_id);
                }
                true
            }
            None => false,
        }
    }

    /// The callback handed to the native dispatcher. Once-listeners are
    /// wrapped so the native side also drops them before the first call.
    fn native_callback(
        &self,
        event_type: &str,
        id: u64,
        callback: &Callback,
        options: ListenerOptions,
    ) -> Callback {
        if !options.once {
            return callback.clone();
        }

        let weak: Weak<Mutex<EventedInner>> = Arc::downgrade(&self.inner);
        let event_type = event_type.to_string();
        let callback = callback.clone();
        Callback::new(move |event| {
            let live = weak
                .upgrade()
                .map(|inner| Evented { inner }.remove_registration(&event_type, id))
                .unwrap_or(false);
            if live {
                callback.call(event);
            }
        })
    }
}

impl fmt::Debug for Evented {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Evented")
            .field("listeners", &inner.registry.len())
            .field("bound", &inner.native.is_some())
            .finish()
    }
}

fn is_blank(event_type: &str) -> bool {
    event_type.trim().is_empty()
}
