use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::{
    backend::{MapsLibrary, NativeEvents, NativeMarker},
    core::geo::LatLng,
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

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkerOptions {
    pub position: LatLng,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub draggable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
}

impl MarkerOptions {
    pub fn new(position: impl Into<LatLng>) -> Self {
        Self {
            position: position.into(),
            ..Self::default()
        }
    }
}

pub(crate) struct MarkerInner {
    pub(crate) id: String,
    options: Mutex<MarkerOptions>,
    cell: NativeCell<dyn NativeMarker>,
    pub(crate) events: Evented,
    loader: Loader,
    pub(crate) parent: ParentSlot,
}

impl MarkerInner {
    /// Point the native marker at the current parent, if any
    fn sync_parent(&self) {
        if let Some(native) = self.cell.handle() {
            native.set_map(self.parent.native_target());
        }
    }

    pub(crate) fn position(&self) -> LatLng {
        lock(&self.options).position
    }
}

impl Materialize for MarkerInner {
    type Handle = dyn NativeMarker;

    crate::impl_materialize_accessors!(parented);

    fn construct(this: &Arc<Self>, library: &dyn MapsLibrary) -> Result<Arc<dyn NativeMarker>> {
        let options = lock(&this.options).clone();
        library.create_marker(&options)
    }

    fn native_events(handle: Arc<dyn NativeMarker>) -> Arc<dyn NativeEvents> {
        handle.into_events()
    }

    fn on_materialized(this: &Arc<Self>, _handle: &Arc<dyn NativeMarker>) -> Result<()> {
        this.sync_parent();
        Ok(())
    }
}

/// A point marker.
#[derive(Clone)]
pub struct Marker {
    pub(crate) inner: Arc<MarkerInner>,
}

impl Marker {
    pub fn new(position: impl Into<LatLng>) -> Self {
        Self::with_options(MarkerOptions::new(position))
    }

    pub fn with_options(options: MarkerOptions) -> Self {
        Self::with_loader(options, Loader::new())
    }

    pub fn with_loader(options: MarkerOptions, loader: Loader) -> Self {
        Self {
            inner: Arc::new(MarkerInner {
                id: next_layer_id(LayerType::Marker),
                options: Mutex::new(options),
                cell: NativeCell::new(),
                events: Evented::new(),
                loader,
                parent: ParentSlot::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> MaterializationState {
        self.inner.cell.state()
    }

    /// Show on `map`, materializing through the map's loader. Resolves once
    /// the marker is attached, or once it is known that it was removed
    /// again in the meantime. The work starts right away; dropping the
    /// future does not cancel it.
    pub fn show(&self, map: &Map) -> BoxFuture<'static, Result<()>> {
        if let Err(err) = check_same_loader(&self.inner.id, &self.inner.cell, map) {
            return future::ready(Err(err)).boxed();
        }
        self.inner.parent.set(map);
        let map_ready = map.load();
        let native = ensure_materialized(&self.inner);
        let inner = self.inner.clone();
        async move {
            let (map_ready, native) = futures::join!(map_ready, native);
            map_ready?;
            native?;
            inner.sync_parent();
            Ok(())
        }
        .boxed()
    }

    /// Show on a map whose library is already loaded
    pub fn show_sync(&self, map: &Map) -> Result<()> {
        check_same_loader(&self.inner.id, &self.inner.cell, map)?;
        self.inner.parent.set(map);
        map.native_sync()?;
        ensure_materialized_sync(&self.inner)?;
        self.inner.sync_parent();
        Ok(())
    }

    /// Detach from the map. Pending materialization will not attach it.
    pub fn hide(&self) {
        if self.inner.parent.clear().is_some() {
            log::debug!("{} removed from its map", self.inner.id);
        }
        if let Some(native) = self.to_native() {
            native.set_map(None);
        }
    }

    pub fn is_shown(&self) -> bool {
        self.inner.parent.get().is_some()
    }

    pub fn native(&self) -> BoxFuture<'static, Result<Arc<dyn NativeMarker>>> {
        ensure_materialized(&self.inner)
    }

    pub fn native_sync(&self) -> Result<Arc<dyn NativeMarker>> {
        ensure_materialized_sync(&self.inner)
    }

    pub fn to_native(&self) -> Option<Arc<dyn NativeMarker>> {
        self.inner.cell.handle()
    }

    /// Move the marker. Out-of-range coordinates are ignored.
    pub fn set_position(&self, position: impl Into<LatLng>) -> &Self {
        let position = position.into();
        if !position.is_valid() {
            return self;
        }
        lock(&self.inner.options).position = position;
        if let Some(native) = self.to_native() {
            native.set_position(position);
        }
        self
    }

    pub fn position(&self) -> LatLng {
        self.inner.position()
    }

    pub fn set_title(&self, title: Option<&str>) -> &Self {
        lock(&self.inner.options).title = title.map(str::to_string);
        if let Some(native) = self.to_native() {
            native.set_title(title);
        }
        self
    }

    pub fn title(&self) -> Option<String> {
        lock(&self.inner.options).title.clone()
    }

    pub fn set_draggable(&self, draggable: bool) -> &Self {
        lock(&self.inner.options).draggable = draggable;
        if let Some(native) = self.to_native() {
            native.set_draggable(draggable);
        }
        self
    }

    pub fn is_draggable(&self) -> bool {
        lock(&self.inner.options).draggable
    }

    pub fn set_z_index(&self, z_index: Option<i32>) -> &Self {
        lock(&self.inner.options).z_index = z_index;
        if let Some(native) = self.to_native() {
            native.set_z_index(z_index);
        }
        self
    }

    pub fn z_index(&self) -> Option<i32> {
        lock(&self.inner.options).z_index
    }

    pub fn options(&self) -> MarkerOptions {
        lock(&self.inner.options).clone()
    }

    crate::impl_evented_delegate!(inner);
}

crate::impl_layer_trait!(Marker, LayerType::Marker);

impl std::fmt::Debug for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marker")
            .field("id", &self.inner.id)
            .field("position", &self.position())
            .field("state", &self.state())
            .finish()
    }
}
