//! Base for custom-drawn overlays.
//!
//! The mapping runtime drives a custom overlay through three hooks: `on_add`
//! when it joins a map's panes, `draw` whenever the view changes, and
//! `on_remove` when it leaves. [`OverlayAdapter`] is the object handed to the
//! runtime; it forwards the hooks to the overlay, which recomputes its pixel
//! position and re-dispatches `add`, `draw` and `remove` on its own events.

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::json;
use std::sync::{Arc, Mutex, Weak};

use crate::{
    backend::{
        same_native_map, MapsLibrary, NativeEvents, NativeMap, NativeOverlayView, OverlayHooks,
        Projection,
    },
    core::{
        constants::{
            MAX_OVERLAY_PIXEL_OFFSET, OVERLAY_ADD_EVENT, OVERLAY_DRAW_EVENT, OVERLAY_REMOVE_EVENT,
        },
        geo::{LatLng, Point},
    },
    events::Evented,
    layers::{
        base::{check_same_loader, next_layer_id, LayerType, ParentSlot},
        map::Map,
    },
    loader::Loader,
    materialize::{
        ensure_materialized, ensure_materialized_sync, MaterializationState, Materialize,
        NativeCell,
    },
    prelude::lock,
    Result,
};

/// Local state of an overlay, valid whether or not it is materialized.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlayState {
    pub position: LatLng,
    /// Pixel offset added to the projected position
    pub offset: Point,
    /// Requested by the caller: `show` was called and `hide` was not
    pub displayed: bool,
    /// Between the runtime's `on_add` and `on_remove`
    pub added: bool,
    /// Last drawn container pixel, `None` when out of bounds or removed
    pub pixel: Option<Point>,
}

impl OverlayState {
    pub fn is_visible(&self) -> bool {
        self.displayed && self.added && self.pixel.is_some()
    }
}

/// Whether a projected pixel is close enough to the pane origin to draw
fn within_draw_bounds(pixel: &Point) -> bool {
    pixel.x.abs() <= MAX_OVERLAY_PIXEL_OFFSET && pixel.y.abs() <= MAX_OVERLAY_PIXEL_OFFSET
}

pub(crate) struct OverlayInner {
    pub(crate) id: String,
    state: Mutex<OverlayState>,
    cell: NativeCell<dyn NativeOverlayView>,
    pub(crate) events: Evented,
    loader: Loader,
    pub(crate) parent: ParentSlot,
    attached: Mutex<Option<Arc<dyn NativeMap>>>,
}

impl OverlayInner {
    /// Attach the native view to the current parent, or detach it. Does
    /// nothing when it already sits where it should.
    fn sync_parent(&self) {
        let Some(native) = self.cell.handle() else {
            return;
        };
        let target = self.parent.native_target();
        {
            let mut attached = lock(&self.attached);
            let unchanged = match (attached.as_ref(), target.as_ref()) {
                (Some(current), Some(next)) => same_native_map(current, next),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return;
            }
            *attached = target.clone();
        }
        native.set_map(target);
    }

    fn on_add(&self) {
        lock(&self.state).added = true;
        self.events.dispatch(OVERLAY_ADD_EVENT, None);
    }

    fn draw(&self, projection: &dyn Projection) {
        let (pixel, visible) = {
            let mut state = lock(&self.state);
            let pixel = projection
                .from_lat_lng_to_div_pixel(state.position)
                .add(&state.offset);
            state.pixel = within_draw_bounds(&pixel).then_some(pixel);
            (pixel, state.is_visible())
        };
        if !visible {
            log::trace!("{} hidden at ({:.0}, {:.0})", self.id, pixel.x, pixel.y);
        }
        self.events.dispatch(
            OVERLAY_DRAW_EVENT,
            Some(json!({ "x": pixel.x, "y": pixel.y, "visible": visible })),
        );
    }

    fn on_remove(&self) {
        {
            let mut state = lock(&self.state);
            state.added = false;
            state.pixel = None;
        }
        self.events.dispatch(OVERLAY_REMOVE_EVENT, None);
    }

    /// Draw again with the parent's current projection
    fn redraw(&self) {
        if !lock(&self.state).added {
            return;
        }
        if let Some(projection) = self.parent.native_target().and_then(|map| map.projection()) {
            self.draw(projection.as_ref());
        }
    }

    pub(crate) fn position(&self) -> LatLng {
        lock(&self.state).position
    }
}

impl Materialize for OverlayInner {
    type Handle = dyn NativeOverlayView;

    crate::impl_materialize_accessors!(parented);

    fn construct(
        this: &Arc<Self>,
        library: &dyn MapsLibrary,
    ) -> Result<Arc<dyn NativeOverlayView>> {
        let adapter = OverlayAdapter {
            target: Arc::downgrade(this),
        };
        library.create_overlay_view(Arc::new(adapter))
    }

    fn native_events(handle: Arc<dyn NativeOverlayView>) -> Arc<dyn NativeEvents> {
        handle.into_events()
    }

    fn on_materialized(this: &Arc<Self>, _handle: &Arc<dyn NativeOverlayView>) -> Result<()> {
        this.sync_parent();
        Ok(())
    }
}

/// The hooks object handed to the runtime. Holds the overlay weakly so a
/// dropped overlay never keeps drawing.
pub struct OverlayAdapter {
    target: Weak<OverlayInner>,
}

impl OverlayHooks for OverlayAdapter {
    fn on_add(&self) {
        if let Some(overlay) = self.target.upgrade() {
            overlay.on_add();
        }
    }

    fn draw(&self, projection: &dyn Projection) {
        if let Some(overlay) = self.target.upgrade() {
            overlay.draw(projection);
        }
    }

    fn on_remove(&self) {
        if let Some(overlay) = self.target.upgrade() {
            overlay.on_remove();
        }
    }
}

/// A custom-drawn overlay anchored at a geographic position.
#[derive(Clone)]
pub struct Overlay {
    pub(crate) inner: Arc<OverlayInner>,
}

impl Overlay {
    pub fn new(position: impl Into<LatLng>) -> Self {
        Self::with_loader(position, Loader::new())
    }

    pub fn with_loader(position: impl Into<LatLng>, loader: Loader) -> Self {
        Self::with_kind(LayerType::Overlay, position.into(), Point::default(), loader)
    }

    pub(crate) fn with_kind(
        layer_type: LayerType,
        position: LatLng,
        offset: Point,
        loader: Loader,
    ) -> Self {
        Self {
            inner: Arc::new(OverlayInner {
                id: next_layer_id(layer_type),
                state: Mutex::new(OverlayState {
                    position,
                    offset,
                    ..OverlayState::default()
                }),
                cell: NativeCell::new(),
                events: Evented::new(),
                loader,
                parent: ParentSlot::new(),
                attached: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> MaterializationState {
        self.inner.cell.state()
    }

    pub fn overlay_state(&self) -> OverlayState {
        lock(&self.inner.state).clone()
    }

    /// Attach to `map`, loading and materializing through the map's loader
    /// as needed. Resolves to this overlay once the native view is
    /// attached. The work starts right away.
    pub fn show(&self, map: &Map) -> BoxFuture<'static, Result<Overlay>> {
        if let Err(err) = check_same_loader(&self.inner.id, &self.inner.cell, map) {
            return future::ready(Err(err)).boxed();
        }
        self.inner.parent.set(map);
        lock(&self.inner.state).displayed = true;
        let map_ready = map.load();
        let native = ensure_materialized(&self.inner);
        let overlay = self.clone();
        async move {
            let (map_ready, native) = futures::join!(map_ready, native);
            map_ready?;
            native?;
            overlay.inner.sync_parent();
            Ok(overlay)
        }
        .boxed()
    }

    /// [`Overlay::show`] for callers that know the library is loaded
    pub fn show_sync(&self, map: &Map) -> Result<Overlay> {
        check_same_loader(&self.inner.id, &self.inner.cell, map)?;
        self.inner.parent.set(map);
        lock(&self.inner.state).displayed = true;
        map.native_sync()?;
        ensure_materialized_sync(&self.inner)?;
        self.inner.sync_parent();
        Ok(self.clone())
    }

    /// Detach from the map. Idempotent.
    pub fn hide(&self) {
        let was_shown = {
            let mut state = lock(&self.inner.state);
            std::mem::replace(&mut state.displayed, false)
        };
        self.inner.parent.clear();
        self.inner.sync_parent();
        if was_shown {
            log::debug!("{} hidden", self.inner.id);
        }
    }

    pub fn is_shown(&self) -> bool {
        lock(&self.inner.state).displayed
    }

    /// Drawn on screen right now: shown, added by the runtime and inside
    /// the pixel bounds
    pub fn is_visible(&self) -> bool {
        lock(&self.inner.state).is_visible()
    }

    pub fn pixel(&self) -> Option<Point> {
        lock(&self.inner.state).pixel
    }

    /// Recompute the pixel position from `projection`. Normally called by
    /// the runtime's render loop through the adapter.
    pub fn draw(&self, projection: &dyn Projection) {
        self.inner.draw(projection);
    }

    pub fn set_position(&self, position: impl Into<LatLng>) -> &Self {
        lock(&self.inner.state).position = position.into();
        self.inner.redraw();
        self
    }

    pub fn position(&self) -> LatLng {
        self.inner.position()
    }

    pub fn set_offset(&self, offset: impl Into<Point>) -> &Self {
        lock(&self.inner.state).offset = offset.into();
        self.inner.redraw();
        self
    }

    pub fn offset(&self) -> Point {
        lock(&self.inner.state).offset
    }

    pub fn native(&self) -> BoxFuture<'static, Result<Arc<dyn NativeOverlayView>>> {
        ensure_materialized(&self.inner)
    }

    pub fn to_native(&self) -> Option<Arc<dyn NativeOverlayView>> {
        self.inner.cell.handle()
    }

    crate::impl_evented_delegate!(inner);
}

crate::impl_layer_trait!(Overlay, LayerType::Overlay);

impl std::fmt::Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("id", &self.inner.id)
            .field("overlay", &self.overlay_state())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderState;

    struct FixedProjection(Point);

    impl Projection for FixedProjection {
        fn from_lat_lng_to_div_pixel(&self, _position: LatLng) -> Point {
            self.0
        }
    }

    fn isolated() -> Overlay {
        Overlay::with_loader((0.0, 0.0), Loader::with_state(LoaderState::new()))
    }

    #[test]
    fn test_draw_applies_offset() {
        let overlay = isolated();
        overlay.set_offset((5.0, -5.0));
        overlay.draw(&FixedProjection(Point::new(100.0, 100.0)));
        assert_eq!(overlay.pixel(), Some(Point::new(105.0, 95.0)));
    }

    #[test]
    fn test_draw_hides_far_positions() {
        let overlay = isolated();
        overlay.draw(&FixedProjection(Point::new(4000.0, -4000.0)));
        assert!(overlay.pixel().is_some());

        overlay.draw(&FixedProjection(Point::new(4000.5, 0.0)));
        assert_eq!(overlay.pixel(), None);

        overlay.draw(&FixedProjection(Point::new(0.0, -9000.0)));
        assert_eq!(overlay.pixel(), None);
    }

    #[test]
    fn test_hooks_are_repeatable() {
        let overlay = isolated();
        let adapter = OverlayAdapter {
            target: Arc::downgrade(&overlay.inner),
        };
        adapter.on_add();
        adapter.on_add();
        adapter.draw(&FixedProjection(Point::new(1.0, 1.0)));
        adapter.draw(&FixedProjection(Point::new(1.0, 1.0)));
        assert!(overlay.overlay_state().added);
        assert!(!overlay.is_visible());

        adapter.on_remove();
        adapter.on_remove();
        assert!(!overlay.overlay_state().added);
        assert_eq!(overlay.pixel(), None);
    }

    #[test]
    fn test_hide_is_idempotent() {
        let overlay = isolated();
        overlay.hide();
        overlay.hide();
        assert!(!overlay.is_shown());
    }

    #[test]
    fn test_adapter_outlives_overlay() {
        let overlay = isolated();
        let adapter = OverlayAdapter {
            target: Arc::downgrade(&overlay.inner),
        };
        drop(overlay);
        adapter.on_add();
        adapter.draw(&FixedProjection(Point::new(0.0, 0.0)));
        adapter.on_remove();
    }
}
