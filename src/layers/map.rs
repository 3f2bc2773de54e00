use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{
    backend::{MapsLibrary, NativeEvents, NativeMap},
    core::{constants::DEFAULT_ZOOM, geo::LatLng},
    events::Evented,
    layers::base::{next_layer_id, LayerType},
    loader::Loader,
    materialize::{
        ensure_materialized, ensure_materialized_sync, MaterializationState, Materialize,
        NativeCell,
    },
    prelude::lock,
    runtime::{self, AsyncHandle},
    Error, Result,
};

/// Map configuration. Serialized camelCase, which is also the shape
/// [`Map::set_options`] accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapOptions {
    pub center: LatLng,
    pub zoom: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_id: Option<String>,
    /// Options the runtime understands that lazymap only passes through
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            center: LatLng::default(),
            zoom: DEFAULT_ZOOM,
            min_zoom: None,
            max_zoom: None,
            map_id: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl MapOptions {
    pub fn new(center: impl Into<LatLng>, zoom: f64) -> Self {
        Self {
            center: center.into(),
            zoom,
            ..Self::default()
        }
    }

    /// Clamp `zoom` into `[min_zoom, max_zoom]`
    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        let zoom = self.min_zoom.map_or(zoom, |min| zoom.max(min));
        self.max_zoom.map_or(zoom, |max| zoom.min(max))
    }

    /// Merge a loosely typed options object. Known keys with the wrong type
    /// are ignored; unknown keys are kept in `extra`.
    pub fn merge(&mut self, options: &Value) {
        let Some(options) = options.as_object() else {
            return;
        };
        for (key, value) in options {
            match key.as_str() {
                "center" => {
                    if let Some(center) = LatLng::from_literal(value).filter(LatLng::is_valid) {
                        self.center = center;
                    }
                }
                "zoom" => {
                    if let Some(zoom) = value.as_f64() {
                        self.zoom = zoom;
                    }
                }
                "minZoom" => {
                    if let Some(min) = value.as_f64() {
                        self.min_zoom = Some(min);
                    }
                }
                "maxZoom" => {
                    if let Some(max) = value.as_f64() {
                        self.max_zoom = Some(max);
                    }
                }
                "mapId" => {
                    if let Some(map_id) = value.as_str() {
                        self.map_id = Some(map_id.to_string());
                    }
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
        self.zoom = self.clamp_zoom(self.zoom);
    }
}

pub(crate) struct MapInner {
    id: String,
    container: String,
    options: Mutex<MapOptions>,
    cell: NativeCell<dyn NativeMap>,
    events: Evented,
    loader: Loader,
}

impl Materialize for MapInner {
    type Handle = dyn NativeMap;

    crate::impl_materialize_accessors!();

    fn construct(this: &Arc<Self>, library: &dyn MapsLibrary) -> Result<Arc<dyn NativeMap>> {
        if this.container.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "{} has no container element",
                this.id
            )));
        }
        let options = lock(&this.options).clone();
        library.create_map(&this.container, &options)
    }

    fn native_events(handle: Arc<dyn NativeMap>) -> Arc<dyn NativeEvents> {
        handle.into_events()
    }

    fn on_materialized(this: &Arc<Self>, _handle: &Arc<dyn NativeMap>) -> Result<()> {
        this.loader.notify_map_loaded();
        Ok(())
    }
}

/// The root drawable.
///
/// Cloning a `Map` yields another handle to the same map. Setters always
/// update the local options and are forwarded to the native map once it
/// exists.
#[derive(Clone)]
pub struct Map {
    inner: Arc<MapInner>,
}

impl Map {
    /// Map rendered into `container`, using the process-wide loader
    pub fn new(container: &str, options: MapOptions) -> Self {
        Self::with_loader(container, options, Loader::new())
    }

    pub fn with_loader(container: &str, mut options: MapOptions, loader: Loader) -> Self {
        options.zoom = options.clamp_zoom(options.zoom);
        Self {
            inner: Arc::new(MapInner {
                id: next_layer_id(LayerType::Map),
                container: container.to_string(),
                options: Mutex::new(options),
                cell: NativeCell::new(),
                events: Evented::new(),
                loader,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn container(&self) -> &str {
        &self.inner.container
    }

    pub fn loader(&self) -> &Loader {
        &self.inner.loader
    }

    pub fn state(&self) -> MaterializationState {
        self.inner.cell.state()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.cell.is_materialized()
    }

    /// Whether both handles refer to the same map
    pub fn ptr_eq(&self, other: &Map) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Load the mapping library if needed and create the native map. Both
    /// start when this is called, whether or not the future is awaited.
    pub fn load(&self) -> BoxFuture<'static, Result<()>> {
        self.native().map(|native| native.map(|_| ())).boxed()
    }

    /// Start [`Map::load`] in the background. Failures are logged.
    pub fn init(&self) -> Result<Box<dyn AsyncHandle>> {
        let map = self.clone();
        runtime::spawn(async move {
            if let Err(err) = map.load().await {
                log::warn!("{} failed to initialise: {err}", map.id());
            }
        })
    }

    /// The native map, waiting for the library if necessary
    pub fn native(&self) -> BoxFuture<'static, Result<Arc<dyn NativeMap>>> {
        ensure_materialized(&self.inner)
    }

    /// The native map, or [`Error::NotReady`] if the library is not loaded
    pub fn native_sync(&self) -> Result<Arc<dyn NativeMap>> {
        ensure_materialized_sync(&self.inner)
    }

    /// The native map if it already exists
    pub fn to_native(&self) -> Option<Arc<dyn NativeMap>> {
        self.inner.cell.handle()
    }

    /// Recenter the map. Out-of-range coordinates are ignored.
    pub fn set_center(&self, center: impl Into<LatLng>) -> &Self {
        let center = center.into();
        if !center.is_valid() {
            return self;
        }
        lock(&self.inner.options).center = center;
        if let Some(native) = self.to_native() {
            native.set_center(center);
        }
        self
    }

    pub fn center(&self) -> LatLng {
        lock(&self.inner.options).center
    }

    /// Set the zoom, clamped to the configured bounds
    pub fn set_zoom(&self, zoom: f64) -> &Self {
        if !zoom.is_finite() {
            return self;
        }
        let zoom = {
            let mut options = lock(&self.inner.options);
            options.zoom = options.clamp_zoom(zoom);
            options.zoom
        };
        if let Some(native) = self.to_native() {
            native.set_zoom(zoom);
        }
        self
    }

    pub fn zoom(&self) -> f64 {
        lock(&self.inner.options).zoom
    }

    /// Merge a loosely typed options object; see [`MapOptions::merge`]
    pub fn set_options(&self, options: &Value) -> &Self {
        let merged = {
            let mut current = lock(&self.inner.options);
            current.merge(options);
            current.clone()
        };
        if let Some(native) = self.to_native() {
            native.set_options(options);
            native.set_center(merged.center);
            native.set_zoom(merged.zoom);
        }
        self
    }

    pub fn options(&self) -> MapOptions {
        lock(&self.inner.options).clone()
    }

    crate::impl_evented_delegate!(inner);
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.inner.id)
            .field("container", &self.inner.container)
            .field("state", &self.state())
            .finish()
    }
}
