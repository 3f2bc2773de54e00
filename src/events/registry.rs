use crate::{
    backend::NativeListenerId,
    events::{Callback, ListenerOptions},
    prelude::HashMap,
};

/// A single listener registration.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Registry-wide, monotonically increasing id. Ordering by id is
    /// registration order across all event types.
    pub id: u64,
    pub callback: Callback,
    pub options: ListenerOptions,
    /// Set once the registration has been forwarded to a native dispatcher.
    pub native_id: Option<NativeListenerId>,
}

impl Registration {
    fn matches(&self, callback: Option<&Callback>, options: Option<&ListenerOptions>) -> bool {
        callback.map_or(true, |cb| self.callback == *cb)
            && options.map_or(true, |opts| opts.refines(&self.options))
    }
}

/// Listeners by event type, in insertion order.
///
/// Duplicate `(callback, options)` pairs are kept; every one of them is
/// dispatched.
#[derive(Debug, Default)]
pub struct EventRegistry {
    listeners: HashMap<String, Vec<Registration>>,
    next_id: u64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a registration and returns its id
    pub fn add(&mut self, event_type: &str, callback: Callback, options: ListenerOptions) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Registration {
                id,
                callback,
                options,
                native_id: None,
            });
        id
    }

    /// Removes every registration matching the filter.
    ///
    /// `event_type == None` spans all types; `callback` and `options` narrow
    /// the match when given.
    pub fn remove_matching(
        &mut self,
        event_type: Option<&str>,
        callback: Option<&Callback>,
        options: Option<&ListenerOptions>,
    ) -> Vec<Registration> {
        let mut removed = Vec::new();
        let types: Vec<String> = match event_type {
            Some(event_type) => vec![event_type.to_string()],
            None => self.listeners.keys().cloned().collect(),
        };

        for event_type in types {
            if let Some(registrations) = self.listeners.get_mut(&event_type) {
                let (gone, kept): (Vec<_>, Vec<_>) = registrations
                    .drain(..)
                    .partition(|reg| reg.matches(callback, options));
                *registrations = kept;
                removed.extend(gone);
                if registrations.is_empty() {
                    self.listeners.remove(&event_type);
                }
            }
        }

        removed.sort_by_key(|reg| reg.id);
        removed
    }

    /// Removes one registration by id
    pub fn remove_id(&mut self, event_type: &str, id: u64) -> Option<Registration> {
        let registrations = self.listeners.get_mut(event_type)?;
        let index = registrations.iter().position(|reg| reg.id == id)?;
        let removed = registrations.remove(index);
        if registrations.is_empty() {
            self.listeners.remove(event_type);
        }
        Some(removed)
    }

    pub fn contains_id(&self, event_type: &str, id: u64) -> bool {
        self.listeners
            .get(event_type)
            .is_some_and(|regs| regs.iter().any(|reg| reg.id == id))
    }

    pub fn has_matching(
        &self,
        event_type: &str,
        callback: Option<&Callback>,
        options: Option<&ListenerOptions>,
    ) -> bool {
        self.listeners
            .get(event_type)
            .is_some_and(|regs| regs.iter().any(|reg| reg.matches(callback, options)))
    }

    /// Copy of the registrations for a type, in registration order
    pub fn snapshot(&self, event_type: &str) -> Vec<Registration> {
        self.listeners.get(event_type).cloned().unwrap_or_default()
    }

    /// Registrations not yet forwarded to a native dispatcher, ordered by
    /// registration across all types.
    pub fn unattached(&self) -> Vec<(String, Registration)> {
        let mut pending: Vec<(String, Registration)> = self
            .listeners
            .iter()
            .flat_map(|(event_type, regs)| {
                regs.iter()
                    .filter(|reg| reg.native_id.is_none())
                    .map(move |reg| (event_type.clone(), reg.clone()))
            })
            .collect();
        pending.sort_by_key(|(_, reg)| reg.id);
        pending
    }

    /// Record where a registration was forwarded. Returns `false` when it
    /// was removed in the meantime.
    pub fn set_native_id(&mut self, event_type: &str, id: u64, native_id: NativeListenerId) -> bool {
        match self
            .listeners
            .get_mut(event_type)
            .and_then(|regs| regs.iter_mut().find(|reg| reg.id == id))
        {
            Some(reg) => {
                reg.native_id = Some(native_id);
                true
            }
            None => false,
        }
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.listeners.get(event_type).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Callback::new(|_| {})
    }

    #[test]
    fn test_remove_requires_callback_match() {
        let mut registry = EventRegistry::new();
        let kept = noop();
        let dropped = noop();
        registry.add("click", kept.clone(), ListenerOptions::default());
        registry.add("click", dropped.clone(), ListenerOptions::once());

        // Options differ from the registration but capture matches, so the
        // callback alone decides.
        let removed = registry.remove_matching(
            Some("click"),
            Some(&dropped),
            Some(&ListenerOptions::default()),
        );

        assert_eq!(removed.len(), 1);
        assert!(registry.has_matching("click", Some(&kept), None));
        assert!(!registry.has_matching("click", Some(&dropped), None));
    }

    #[test]
    fn test_capture_refines_removal() {
        let mut registry = EventRegistry::new();
        let cb = noop();
        registry.add("click", cb.clone(), ListenerOptions::capture());

        let removed =
            registry.remove_matching(Some("click"), Some(&cb), Some(&ListenerOptions::default()));
        assert!(removed.is_empty());
        assert_eq!(registry.count("click"), 1);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut registry = EventRegistry::new();
        let cb = noop();
        registry.add("click", cb.clone(), ListenerOptions::default());
        registry.add("click", cb.clone(), ListenerOptions::default());

        assert_eq!(registry.snapshot("click").len(), 2);
        assert_eq!(registry.remove_matching(Some("click"), Some(&cb), None).len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unattached_in_registration_order() {
        let mut registry = EventRegistry::new();
        let first = registry.add("mouseover", noop(), ListenerOptions::default());
        let second = registry.add("click", noop(), ListenerOptions::default());
        let third = registry.add("mouseover", noop(), ListenerOptions::default());
        registry.set_native_id("click", second, 7);

        let ids: Vec<u64> = registry.unattached().iter().map(|(_, r)| r.id).collect();
        assert_eq!(ids, vec![first, third]);
    }
}
