//! Popup and tooltip binding for drawables that can anchor them.
//!
//! [`PopupAnchor`] is implemented by [`Marker`], [`Polyline`] and
//! [`Overlay`]. The binding logic lives in the trait's provided methods;
//! implementors only say where their events live and how to find their
//! anchor position and map.

use std::sync::{Arc, Weak};

use crate::{
    core::{
        constants::{CLICK_EVENT, MOUSEOUT_EVENT, MOUSEOVER_EVENT},
        geo::LatLng,
    },
    events::{Callback, Evented},
    layers::{
        map::Map,
        marker::{Marker, MarkerInner},
        polyline::{Polyline, PolylineInner},
    },
    overlay::{
        base::{Overlay, OverlayInner},
        popup::Popup,
        tooltip::Tooltip,
    },
};

/// Where a bound popup or tooltip opens.
pub trait AnchorSource: Send + Sync {
    fn anchor_position(&self) -> Option<LatLng>;
    fn anchor_map(&self) -> Option<Map>;
}

impl AnchorSource for MarkerInner {
    fn anchor_position(&self) -> Option<LatLng> {
        Some(self.position())
    }

    fn anchor_map(&self) -> Option<Map> {
        self.parent.get()
    }
}

impl AnchorSource for PolylineInner {
    fn anchor_position(&self) -> Option<LatLng> {
        self.center()
    }

    fn anchor_map(&self) -> Option<Map> {
        self.parent.get()
    }
}

impl AnchorSource for OverlayInner {
    fn anchor_position(&self) -> Option<LatLng> {
        Some(self.position())
    }

    fn anchor_map(&self) -> Option<Map> {
        self.parent.get()
    }
}

fn resolve(source: &Weak<dyn AnchorSource>) -> Option<(Map, LatLng)> {
    let source = source.upgrade()?;
    Some((source.anchor_map()?, source.anchor_position()?))
}

/// Listeners installed by a `bind_*` call.
#[derive(Debug)]
pub struct AnchorBinding {
    listeners: Vec<(&'static str, Callback)>,
}

impl AnchorBinding {
    /// Remove the listeners from `anchor`
    pub fn unbind<A: PopupAnchor + ?Sized>(self, anchor: &A) {
        for (event_type, callback) in &self.listeners {
            anchor.anchor_events().off_listener(event_type, callback);
        }
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.listeners.iter().map(|(event_type, _)| *event_type).collect()
    }
}

/// A drawable that popups and tooltips can be bound to.
pub trait PopupAnchor {
    fn anchor_events(&self) -> &Evented;

    /// Held weakly by the bound listeners
    fn anchor_source(&self) -> Weak<dyn AnchorSource>;

    /// Open `popup` at the anchor whenever the anchor is clicked
    fn bind_popup(&self, popup: &Popup) -> AnchorBinding {
        let source = self.anchor_source();
        let popup = popup.clone();
        let on_click = Callback::new(move |_| {
            let Some((map, position)) = resolve(&source) else {
                return;
            };
            if let Err(err) = popup.open_sync(&map, position) {
                log::warn!("could not open {}: {err}", popup.id());
            }
        });

        self.anchor_events().on(CLICK_EVENT, on_click.clone());
        AnchorBinding {
            listeners: vec![(CLICK_EVENT, on_click)],
        }
    }

    /// Show `tooltip` while the pointer is over the anchor. Permanent
    /// tooltips stay open after the pointer leaves.
    fn bind_tooltip(&self, tooltip: &Tooltip) -> AnchorBinding {
        let on_over = {
            let source = self.anchor_source();
            let tooltip = tooltip.clone();
            Callback::new(move |_| {
                let Some((map, position)) = resolve(&source) else {
                    return;
                };
                if let Err(err) = tooltip.show_at_sync(&map, position) {
                    log::warn!("could not show {}: {err}", tooltip.overlay().id());
                }
            })
        };
        let on_out = {
            let tooltip = tooltip.clone();
            Callback::new(move |_| {
                if !tooltip.is_permanent() {
                    tooltip.hide();
                }
            })
        };

        self.anchor_events().on(MOUSEOVER_EVENT, on_over.clone());
        self.anchor_events().on(MOUSEOUT_EVENT, on_out.clone());
        AnchorBinding {
            listeners: vec![(MOUSEOVER_EVENT, on_over), (MOUSEOUT_EVENT, on_out)],
        }
    }
}

impl PopupAnchor for Marker {
    fn anchor_events(&self) -> &Evented {
        &self.inner.events
    }

    fn anchor_source(&self) -> Weak<dyn AnchorSource> {
        let weak: Weak<MarkerInner> = Arc::downgrade(&self.inner);
        weak
    }
}

impl PopupAnchor for Polyline {
    fn anchor_events(&self) -> &Evented {
        &self.inner.events
    }

    fn anchor_source(&self) -> Weak<dyn AnchorSource> {
        let weak: Weak<PolylineInner> = Arc::downgrade(&self.inner);
        weak
    }
}

impl PopupAnchor for Overlay {
    fn anchor_events(&self) -> &Evented {
        &self.inner.events
    }

    fn anchor_source(&self) -> Weak<dyn AnchorSource> {
        let weak: Weak<OverlayInner> = Arc::downgrade(&self.inner);
        weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::marker::MarkerOptions;
    use crate::loader::{Loader, LoaderState};

    #[test]
    fn test_bind_and_unbind_popup() {
        let marker = Marker::with_loader(
            MarkerOptions::new((1.0, 1.0)),
            Loader::with_state(LoaderState::new()),
        );
        let popup = Popup::new("Hi");

        let binding = marker.bind_popup(&popup);
        assert_eq!(binding.event_types(), vec![CLICK_EVENT]);
        assert!(marker.has_listener(CLICK_EVENT, None));

        binding.unbind(&marker);
        assert!(!marker.has_listener(CLICK_EVENT, None));
    }

    #[test]
    fn test_click_without_map_is_ignored() {
        let marker = Marker::with_loader(
            MarkerOptions::new((1.0, 1.0)),
            Loader::with_state(LoaderState::new()),
        );
        let popup = Popup::new("Hi");
        marker.bind_popup(&popup);

        marker.dispatch(CLICK_EVENT, None);
        assert!(!popup.is_open());
    }

    #[test]
    fn test_tooltip_binding_listens_for_hover() {
        let line = Polyline::with_loader(
            crate::layers::polyline::PolylineOptions::new([(0.0, 0.0), (2.0, 2.0)]),
            Loader::with_state(LoaderState::new()),
        );
        let binding = line.bind_tooltip(&Tooltip::new("Route"));
        assert_eq!(binding.event_types(), vec![MOUSEOVER_EVENT, MOUSEOUT_EVENT]);
        assert!(line.has_listener(MOUSEOVER_EVENT, None));
        assert!(line.has_listener(MOUSEOUT_EVENT, None));
    }
}
