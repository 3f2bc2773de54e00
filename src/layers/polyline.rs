use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::{
    backend::{MapsLibrary, NativeEvents, NativePolyline},
    core::geo::{LatLng, LatLngBounds},
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolylineOptions {
    pub path: Vec<LatLng>,
    pub stroke_color: String,
    pub stroke_weight: f64,
    pub stroke_opacity: f64,
    pub geodesic: bool,
}

impl Default for PolylineOptions {
    fn default() -> Self {
        Self {
            path: Vec::new(),
            stroke_color: "#3388ff".to_string(),
            stroke_weight: 3.0,
            stroke_opacity: 1.0,
            geodesic: false,
        }
    }
}

impl PolylineOptions {
    pub fn new<I, P>(path: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LatLng>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The stroke settings in the shape the runtime's `set_options` takes
    fn style(&self) -> serde_json::Value {
        json!({
            "strokeColor": self.stroke_color,
            "strokeWeight": self.stroke_weight,
            "strokeOpacity": self.stroke_opacity,
            "geodesic": self.geodesic,
        })
    }
}

pub(crate) struct PolylineInner {
    pub(crate) id: String,
    options: Mutex<PolylineOptions>,
    cell: NativeCell<dyn NativePolyline>,
    pub(crate) events: Evented,
    loader: Loader,
    pub(crate) parent: ParentSlot,
}

impl PolylineInner {
    fn sync_parent(&self) {
        if let Some(native) = self.cell.handle() {
            native.set_map(self.parent.native_target());
        }
    }

    /// Center of the path's bounding box
    pub(crate) fn center(&self) -> Option<LatLng> {
        LatLngBounds::from_points(&lock(&self.options).path).map(|bounds| bounds.center())
    }
}

impl Materialize for PolylineInner {
    type Handle = dyn NativePolyline;

    crate::impl_materialize_accessors!(parented);

    fn construct(this: &Arc<Self>, library: &dyn MapsLibrary) -> Result<Arc<dyn NativePolyline>> {
        let options = lock(&this.options).clone();
        library.create_polyline(&options)
    }

    fn native_events(handle: Arc<dyn NativePolyline>) -> Arc<dyn NativeEvents> {
        handle.into_events()
    }

    fn on_materialized(this: &Arc<Self>, _handle: &Arc<dyn NativePolyline>) -> Result<()> {
        this.sync_parent();
        Ok(())
    }
}

/// An open path of connected segments.
#[derive(Clone)]
pub struct Polyline {
    pub(crate) inner: Arc<PolylineInner>,
}

impl Polyline {
    pub fn new<I, P>(path: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LatLng>,
    {
        Self::with_options(PolylineOptions::new(path))
    }

    pub fn with_options(options: PolylineOptions) -> Self {
        Self::with_loader(options, Loader::new())
    }

    pub fn with_loader(options: PolylineOptions, loader: Loader) -> Self {
        Self {
            inner: Arc::new(PolylineInner {
                id: next_layer_id(LayerType::Polyline),
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

    /// Show on `map`; see [`Marker::show`](crate::layers::marker::Marker::show)
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

    pub fn show_sync(&self, map: &Map) -> Result<()> {
        check_same_loader(&self.inner.id, &self.inner.cell, map)?;
        self.inner.parent.set(map);
        map.native_sync()?;
        ensure_materialized_sync(&self.inner)?;
        self.inner.sync_parent();
        Ok(())
    }

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

    pub fn native(&self) -> BoxFuture<'static, Result<Arc<dyn NativePolyline>>> {
        ensure_materialized(&self.inner)
    }

    pub fn native_sync(&self) -> Result<Arc<dyn NativePolyline>> {
        ensure_materialized_sync(&self.inner)
    }

    pub fn to_native(&self) -> Option<Arc<dyn NativePolyline>> {
        self.inner.cell.handle()
    }

    pub fn set_path<I, P>(&self, path: I) -> &Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LatLng>,
    {
        let path: Vec<LatLng> = path.into_iter().map(Into::into).collect();
        lock(&self.inner.options).path = path.clone();
        if let Some(native) = self.to_native() {
            native.set_path(&path);
        }
        self
    }

    /// Append a vertex
    pub fn push_point(&self, point: impl Into<LatLng>) -> &Self {
        let path = {
            let mut options = lock(&self.inner.options);
            options.path.push(point.into());
            options.path.clone()
        };
        if let Some(native) = self.to_native() {
            native.set_path(&path);
        }
        self
    }

    pub fn path(&self) -> Vec<LatLng> {
        lock(&self.inner.options).path.clone()
    }

    pub fn set_stroke_color(&self, color: &str) -> &Self {
        if color.trim().is_empty() {
            return self;
        }
        self.update_style(|options| options.stroke_color = color.to_string())
    }

    pub fn set_stroke_weight(&self, weight: f64) -> &Self {
        if !weight.is_finite() || weight < 0.0 {
            return self;
        }
        self.update_style(|options| options.stroke_weight = weight)
    }

    pub fn set_stroke_opacity(&self, opacity: f64) -> &Self {
        if !opacity.is_finite() {
            return self;
        }
        self.update_style(|options| options.stroke_opacity = opacity.clamp(0.0, 1.0))
    }

    fn update_style<F>(&self, update: F) -> &Self
    where
        F: FnOnce(&mut PolylineOptions),
    {
        let style = {
            let mut options = lock(&self.inner.options);
            update(&mut options);
            options.style()
        };
        if let Some(native) = self.to_native() {
            native.set_options(&style);
        }
        self
    }

    pub fn center(&self) -> Option<LatLng> {
        self.inner.center()
    }

    pub fn options(&self) -> PolylineOptions {
        lock(&self.inner.options).clone()
    }

    crate::impl_evented_delegate!(inner);
}

crate::impl_layer_trait!(Polyline, LayerType::Polyline);

impl std::fmt::Debug for Polyline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Polyline")
            .field("id", &self.inner.id)
            .field("points", &lock(&self.inner.options).path.len())
            .field("state", &self.state())
            .finish()
    }
}
