//! The seam between lazymap and the external mapping runtime.
//!
//! A [`MapsBackend`] performs the one-time asynchronous import of the
//! runtime and yields a [`MapsLibrary`], whose constructors produce the
//! native handles every drawable wraps. Native handles are trait objects
//! with interior mutability, mirroring the reference semantics of the
//! runtime objects they stand for.

pub mod headless;

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use crate::{
    core::geo::{LatLng, Point},
    events::Callback,
    layers::{map::MapOptions, marker::MarkerOptions, polyline::PolylineOptions},
    loader::LoadConfig,
    Result,
};

/// Identifier handed out by a native dispatcher for one listener
pub type NativeListenerId = u64;

/// Whether two native maps are the same runtime object
pub fn same_native_map(a: &Arc<dyn NativeMap>, b: &Arc<dyn NativeMap>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// The native event-subscription API wrapped by [`crate::Evented`].
pub trait NativeEvents: Send + Sync {
    fn add_listener(&self, event_type: &str, callback: Callback) -> NativeListenerId;

    /// Unknown ids are ignored
    fn remove_listener(&self, id: NativeListenerId);

    /// Dynamic casting support
    fn as_any(&self) -> &dyn Any;
}

/// Converts the map pane's geographic positions to container pixels.
pub trait Projection: Send + Sync {
    fn from_lat_lng_to_div_pixel(&self, position: LatLng) -> Point;
}

pub trait NativeMap: NativeEvents {
    fn set_center(&self, center: LatLng);
    fn center(&self) -> LatLng;
    fn set_zoom(&self, zoom: f64);
    fn zoom(&self) -> f64;
    fn set_options(&self, options: &serde_json::Value);

    /// `None` until the runtime has laid the map out
    fn projection(&self) -> Option<Arc<dyn Projection>>;

    fn into_events(self: Arc<Self>) -> Arc<dyn NativeEvents>;
}

pub trait NativeMarker: NativeEvents {
    fn set_position(&self, position: LatLng);
    fn position(&self) -> LatLng;
    fn set_title(&self, title: Option<&str>);
    fn set_draggable(&self, draggable: bool);
    fn set_z_index(&self, z_index: Option<i32>);
    fn set_map(&self, map: Option<Arc<dyn NativeMap>>);
    fn into_events(self: Arc<Self>) -> Arc<dyn NativeEvents>;
}

pub trait NativePolyline: NativeEvents {
    fn set_path(&self, path: &[LatLng]);
    fn path(&self) -> Vec<LatLng>;
    fn set_options(&self, options: &serde_json::Value);
    fn set_map(&self, map: Option<Arc<dyn NativeMap>>);
    fn into_events(self: Arc<Self>) -> Arc<dyn NativeEvents>;
}

/// The three callbacks a custom overlay provides to the runtime's render
/// loop. The runtime may call each of them any number of times.
pub trait OverlayHooks: Send + Sync {
    fn on_add(&self);
    fn draw(&self, projection: &dyn Projection);
    fn on_remove(&self);
}

pub trait NativeOverlayView: NativeEvents {
    /// Attach to (or with `None`, detach from) a map's panes. The runtime
    /// answers with `on_add`/`draw` or `on_remove` on the overlay's hooks.
    fn set_map(&self, map: Option<Arc<dyn NativeMap>>);
    fn has_map(&self) -> bool;
    fn into_events(self: Arc<Self>) -> Arc<dyn NativeEvents>;
}

/// Constructors of the loaded runtime. Each drawable calls exactly one of
/// them exactly once.
pub trait MapsLibrary: Send + Sync {
    fn create_map(&self, container: &str, options: &MapOptions) -> Result<Arc<dyn NativeMap>>;
    fn create_marker(&self, options: &MarkerOptions) -> Result<Arc<dyn NativeMarker>>;
    fn create_polyline(&self, options: &PolylineOptions) -> Result<Arc<dyn NativePolyline>>;
    fn create_overlay_view(
        &self,
        hooks: Arc<dyn OverlayHooks>,
    ) -> Result<Arc<dyn NativeOverlayView>>;

    fn as_any(&self) -> &dyn Any;
}

/// The runtime's module loader.
#[async_trait]
pub trait MapsBackend: Send + Sync {
    /// Import the runtime for `config`. Resolves once, or fails with a
    /// diagnostic error; the loader never retries.
    async fn import_library(&self, config: &LoadConfig) -> Result<Arc<dyn MapsLibrary>>;
}
