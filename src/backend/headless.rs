//! In-process mapping runtime.
//!
//! `HeadlessBackend` implements the backend traits without a browser: maps
//! keep their view state, markers and polylines remember the map they are
//! attached to, overlay views call their hooks the way the real render loop
//! does, and every native object can fire events through `trigger`. Useful
//! for tests, server-side processing and demos.

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::{
    backend::{
        MapsBackend, MapsLibrary, NativeEvents, NativeListenerId, NativeMap, NativeMarker,
        NativeOverlayView, NativePolyline, OverlayHooks, Projection,
    },
    core::{
        constants::{DEFAULT_VIEWPORT_SIZE, TILE_SIZE},
        geo::{LatLng, Point},
    },
    events::{Callback, Event},
    layers::{map::MapOptions, marker::MarkerOptions, polyline::PolylineOptions},
    loader::LoadConfig,
    prelude::lock,
    Error, Result,
};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

type GateSignal = Shared<oneshot::Receiver<Result<()>>>;

enum ImportMode {
    Immediate,
    Gated(GateSignal),
    Failing(String),
}

/// Releases a gated import.
///
/// Dropping the gate without opening it fails the pending import.
pub struct LoadGate {
    sender: oneshot::Sender<Result<()>>,
}

impl LoadGate {
    /// Let the import resolve successfully
    pub fn open(self) {
        let _ = self.sender.send(Ok(()));
    }

    /// Let the import fail with `reason`
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.sender.send(Err(Error::ExternalLoad(reason.into())));
    }
}

/// Backend whose import resolves immediately, when a [`LoadGate`] is
/// opened, or never successfully.
pub struct HeadlessBackend {
    library: Arc<HeadlessLibrary>,
    mode: ImportMode,
    import_calls: AtomicUsize,
    last_request: Mutex<Option<LoadConfig>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_mode(ImportMode::Immediate)
    }

    /// Backend whose import stays pending until the returned gate is used
    pub fn gated() -> (Self, LoadGate) {
        let (sender, receiver) = oneshot::channel();
        (
            Self::with_mode(ImportMode::Gated(receiver.shared())),
            LoadGate { sender },
        )
    }

    /// Backend whose import always fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_mode(ImportMode::Failing(reason.into()))
    }

    fn with_mode(mode: ImportMode) -> Self {
        Self {
            library: Arc::new(HeadlessLibrary::new()),
            mode,
            import_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn library(&self) -> Arc<HeadlessLibrary> {
        self.library.clone()
    }

    /// Number of times the runtime import was started
    pub fn import_calls(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }

    /// The configuration the last import was started with
    pub fn last_request(&self) -> Option<LoadConfig> {
        lock(&self.last_request).clone()
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MapsBackend for HeadlessBackend {
    async fn import_library(&self, config: &LoadConfig) -> Result<Arc<dyn MapsLibrary>> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_request) = Some(config.clone());
        log::debug!(
            "headless import: version={} libraries={:?}",
            config.version,
            config.libraries
        );

        match &self.mode {
            ImportMode::Immediate => {}
            ImportMode::Gated(signal) => match signal.clone().await {
                Ok(outcome) => outcome?,
                Err(_) => return Err(Error::ExternalLoad("import aborted".to_string())),
            },
            ImportMode::Failing(reason) => return Err(Error::ExternalLoad(reason.clone())),
        }

        Ok(self.library.clone() as Arc<dyn MapsLibrary>)
    }
}

/// Listener table and registration journal shared by all headless objects.
#[derive(Default)]
pub struct ListenerTable {
    entries: Mutex<Vec<(NativeListenerId, String, Callback)>>,
    history: Mutex<Vec<String>>,
}

impl ListenerTable {
    fn add(&self, event_type: &str, callback: Callback) -> NativeListenerId {
        let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::SeqCst);
        lock(&self.entries).push((id, event_type.to_string(), callback));
        lock(&self.history).push(event_type.to_string());
        id
    }

    fn remove(&self, id: NativeListenerId) {
        lock(&self.entries).retain(|(entry_id, _, _)| *entry_id != id);
    }

    /// Fire a native event. The table is not locked while listeners run.
    pub fn trigger(&self, event_type: &str, detail: Option<serde_json::Value>) {
        let callbacks: Vec<Callback> = lock(&self.entries)
            .iter()
            .filter(|(_, entry_type, _)| entry_type == event_type)
            .map(|(_, _, callback)| callback.clone())
            .collect();
        let event = Event::new(event_type, detail);
        for callback in callbacks {
            callback.call(&event);
        }
    }

    /// Event types of every `add_listener` call, in call order
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|(_, entry_type, _)| entry_type == event_type)
            .count()
    }
}

macro_rules! impl_native_events {
    ($native:ty) => {
        impl NativeEvents for $native {
            fn add_listener(&self, event_type: &str, callback: Callback) -> NativeListenerId {
                self.listeners.add(event_type, callback)
            }

            fn remove_listener(&self, id: NativeListenerId) {
                self.listeners.remove(id)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        impl $native {
            pub fn trigger(&self, event_type: &str, detail: Option<serde_json::Value>) {
                self.listeners.trigger(event_type, detail)
            }

            pub fn listeners(&self) -> &ListenerTable {
                &self.listeners
            }
        }
    };
}

/// The loaded headless runtime. Counts what it constructs.
#[derive(Default)]
pub struct HeadlessLibrary {
    maps: Mutex<Vec<Arc<HeadlessMap>>>,
    markers: Mutex<Vec<Arc<HeadlessMarker>>>,
    polylines: Mutex<Vec<Arc<HeadlessPolyline>>>,
    overlays: Mutex<Vec<Arc<HeadlessOverlayView>>>,
}

impl HeadlessLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn maps_created(&self) -> usize {
        lock(&self.maps).len()
    }

    pub fn markers_created(&self) -> usize {
        lock(&self.markers).len()
    }

    pub fn polylines_created(&self) -> usize {
        lock(&self.polylines).len()
    }

    pub fn overlays_created(&self) -> usize {
        lock(&self.overlays).len()
    }

    pub fn maps(&self) -> Vec<Arc<HeadlessMap>> {
        lock(&self.maps).clone()
    }

    pub fn markers(&self) -> Vec<Arc<HeadlessMarker>> {
        lock(&self.markers).clone()
    }

    pub fn polylines(&self) -> Vec<Arc<HeadlessPolyline>> {
        lock(&self.polylines).clone()
    }

    pub fn overlays(&self) -> Vec<Arc<HeadlessOverlayView>> {
        lock(&self.overlays).clone()
    }
}

impl MapsLibrary for HeadlessLibrary {
    fn create_map(&self, container: &str, options: &MapOptions) -> Result<Arc<dyn NativeMap>> {
        let map = Arc::new_cyclic(|weak| HeadlessMap {
            container: container.to_string(),
            view: Mutex::new(MapView {
                center: options.center,
                zoom: options.zoom,
                options: serde_json::to_value(options).unwrap_or_default(),
            }),
            size: Point::new(DEFAULT_VIEWPORT_SIZE.0, DEFAULT_VIEWPORT_SIZE.1),
            overlays: Mutex::new(Vec::new()),
            listeners: ListenerTable::default(),
            self_ref: weak.clone(),
        });
        lock(&self.maps).push(map.clone());
        Ok(map)
    }

    fn create_marker(&self, options: &MarkerOptions) -> Result<Arc<dyn NativeMarker>> {
        let marker = Arc::new(HeadlessMarker {
            state: Mutex::new(MarkerState {
                position: options.position,
                title: options.title.clone(),
                draggable: options.draggable,
                z_index: options.z_index,
                map: None,
            }),
            listeners: ListenerTable::default(),
        });
        lock(&self.markers).push(marker.clone());
        Ok(marker)
    }

    fn create_polyline(&self, options: &PolylineOptions) -> Result<Arc<dyn NativePolyline>> {
        let polyline = Arc::new(HeadlessPolyline {
            state: Mutex::new(PolylineState {
                path: options.path.clone(),
                options: serde_json::to_value(options).unwrap_or_default(),
                map: None,
            }),
            listeners: ListenerTable::default(),
        });
        lock(&self.polylines).push(polyline.clone());
        Ok(polyline)
    }

    fn create_overlay_view(
        &self,
        hooks: Arc<dyn OverlayHooks>,
    ) -> Result<Arc<dyn NativeOverlayView>> {
        let view = Arc::new_cyclic(|weak| HeadlessOverlayView {
            hooks,
            map: Mutex::new(None),
            listeners: ListenerTable::default(),
            self_ref: weak.clone(),
        });
        lock(&self.overlays).push(view.clone());
        Ok(view)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Web Mercator projection of a headless map's current view
#[derive(Debug, Clone, Copy)]
pub struct HeadlessProjection {
    pub center: LatLng,
    pub zoom: f64,
    pub size: Point,
}

impl Projection for HeadlessProjection {
    fn from_lat_lng_to_div_pixel(&self, position: LatLng) -> Point {
        let scale = 2f64.powf(self.zoom);
        let offset = position
            .to_world_point()
            .subtract(&self.center.to_world_point())
            .multiply(scale);
        offset.add(&self.size.multiply(0.5))
    }
}

struct MapView {
    center: LatLng,
    zoom: f64,
    options: serde_json::Value,
}

pub struct HeadlessMap {
    container: String,
    view: Mutex<MapView>,
    size: Point,
    overlays: Mutex<Vec<Weak<HeadlessOverlayView>>>,
    listeners: ListenerTable,
    self_ref: Weak<HeadlessMap>,
}

impl HeadlessMap {
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn options(&self) -> serde_json::Value {
        lock(&self.view).options.clone()
    }

    /// Pixel length of one world tile side at the current zoom
    pub fn world_size(&self) -> f64 {
        TILE_SIZE * 2f64.powf(lock(&self.view).zoom)
    }

    fn attach_overlay(&self, overlay: Weak<HeadlessOverlayView>) {
        let mut overlays = lock(&self.overlays);
        overlays.retain(|existing| existing.strong_count() > 0 && !existing.ptr_eq(&overlay));
        overlays.push(overlay);
    }

    fn detach_overlay(&self, overlay: &Weak<HeadlessOverlayView>) {
        lock(&self.overlays).retain(|existing| !existing.ptr_eq(overlay));
    }

    /// Run the render loop once: every attached overlay is redrawn.
    pub fn redraw(&self) {
        let overlays: Vec<Arc<HeadlessOverlayView>> =
            lock(&self.overlays).iter().filter_map(Weak::upgrade).collect();
        if let Some(projection) = self.projection() {
            for overlay in overlays {
                overlay.hooks.draw(projection.as_ref());
            }
        }
    }
}

impl_native_events!(HeadlessMap);

impl NativeMap for HeadlessMap {
    fn set_center(&self, center: LatLng) {
        lock(&self.view).center = center;
        self.listeners.trigger("center_changed", None);
        self.redraw();
    }

    fn center(&self) -> LatLng {
        lock(&self.view).center
    }

    fn set_zoom(&self, zoom: f64) {
        lock(&self.view).zoom = zoom;
        self.listeners.trigger("zoom_changed", None);
        self.redraw();
    }

    fn zoom(&self) -> f64 {
        lock(&self.view).zoom
    }

    fn set_options(&self, options: &serde_json::Value) {
        let mut view = lock(&self.view);
        if let (Some(current), Some(update)) = (view.options.as_object_mut(), options.as_object())
        {
            for (key, value) in update {
                current.insert(key.clone(), value.clone());
            }
        }
    }

    fn projection(&self) -> Option<Arc<dyn Projection>> {
        let view = lock(&self.view);
        Some(Arc::new(HeadlessProjection {
            center: view.center,
            zoom: view.zoom,
            size: self.size,
        }))
    }

    fn into_events(self: Arc<Self>) -> Arc<dyn NativeEvents> {
        self
    }
}

fn same_map(a: &Option<Arc<dyn NativeMap>>, b: &Arc<HeadlessMap>) -> bool {
    a.as_ref()
        .and_then(|map| map.as_any().downcast_ref::<HeadlessMap>())
        .is_some_and(|map| std::ptr::eq(map, b.as_ref()))
}

fn as_headless(map: &Arc<dyn NativeMap>) -> Option<Arc<HeadlessMap>> {
    map.as_any()
        .downcast_ref::<HeadlessMap>()
        .and_then(|map| map.self_ref.upgrade())
}

struct MarkerState {
    position: LatLng,
    title: Option<String>,
    draggable: bool,
    z_index: Option<i32>,
    map: Option<Arc<dyn NativeMap>>,
}

pub struct HeadlessMarker {
    state: Mutex<MarkerState>,
    listeners: ListenerTable,
}

impl HeadlessMarker {
    pub fn title(&self) -> Option<String> {
        lock(&self.state).title.clone()
    }

    pub fn is_draggable(&self) -> bool {
        lock(&self.state).draggable
    }

    pub fn z_index(&self) -> Option<i32> {
        lock(&self.state).z_index
    }

    pub fn is_on_map(&self) -> bool {
        lock(&self.state).map.is_some()
    }

    pub fn is_on(&self, map: &Arc<HeadlessMap>) -> bool {
        same_map(&lock(&self.state).map, map)
    }
}

impl_native_events!(HeadlessMarker);

impl NativeMarker for HeadlessMarker {
    fn set_position(&self, position: LatLng) {
        lock(&self.state).position = position;
    }

    fn position(&self) -> LatLng {
        lock(&self.state).position
    }

    fn set_title(&self, title: Option<&str>) {
        lock(&self.state).title = title.map(str::to_string);
    }

    fn set_draggable(&self, draggable: bool) {
        lock(&self.state).draggable = draggable;
    }

    fn set_z_index(&self, z_index: Option<i32>) {
        lock(&self.state).z_index = z_index;
    }

    fn set_map(&self, map: Option<Arc<dyn NativeMap>>) {
        lock(&self.state).map = map;
    }

    fn into_events(self: Arc<Self>) -> Arc<dyn NativeEvents> {
        self
    }
}

struct PolylineState {
    path: Vec<LatLng>,
    options: serde_json::Value,
    map: Option<Arc<dyn NativeMap>>,
}

pub struct HeadlessPolyline {
    state: Mutex<PolylineState>,
    listeners: ListenerTable,
}

impl HeadlessPolyline {
    pub fn options(&self) -> serde_json::Value {
        lock(&self.state).options.clone()
    }

    pub fn is_on_map(&self) -> bool {
        lock(&self.state).map.is_some()
    }

    pub fn is_on(&self, map: &Arc<HeadlessMap>) -> bool {
        same_map(&lock(&self.state).map, map)
    }
}

impl_native_events!(HeadlessPolyline);

impl NativePolyline for HeadlessPolyline {
    fn set_path(&self, path: &[LatLng]) {
        lock(&self.state).path = path.to_vec();
    }

    fn path(&self) -> Vec<LatLng> {
        lock(&self.state).path.clone()
    }

    fn set_options(&self, options: &serde_json::Value) {
        let mut state = lock(&self.state);
        if let (Some(current), Some(update)) =
            (state.options.as_object_mut(), options.as_object())
        {
            for (key, value) in update {
                current.insert(key.clone(), value.clone());
            }
        }
    }

    fn set_map(&self, map: Option<Arc<dyn NativeMap>>) {
        lock(&self.state).map = map;
    }

    fn into_events(self: Arc<Self>) -> Arc<dyn NativeEvents> {
        self
    }
}

pub struct HeadlessOverlayView {
    hooks: Arc<dyn OverlayHooks>,
    map: Mutex<Option<Arc<dyn NativeMap>>>,
    listeners: ListenerTable,
    self_ref: Weak<HeadlessOverlayView>,
}

impl HeadlessOverlayView {
    pub fn is_on(&self, map: &Arc<HeadlessMap>) -> bool {
        same_map(&lock(&self.map), map)
    }
}

impl_native_events!(HeadlessOverlayView);

impl NativeOverlayView for HeadlessOverlayView {
    fn set_map(&self, map: Option<Arc<dyn NativeMap>>) {
        let previous = std::mem::replace(&mut *lock(&self.map), map.clone());

        if let Some(previous) = previous {
            if let Some(headless) = as_headless(&previous) {
                headless.detach_overlay(&self.self_ref);
            }
            self.hooks.on_remove();
        }

        if let Some(map) = map {
            if let Some(headless) = as_headless(&map) {
                headless.attach_overlay(self.self_ref.clone());
            }
            self.hooks.on_add();
            if let Some(projection) = map.projection() {
                self.hooks.draw(projection.as_ref());
            }
        }
    }

    fn has_map(&self) -> bool {
        lock(&self.map).is_some()
    }

    fn into_events(self: Arc<Self>) -> Arc<dyn NativeEvents> {
        self
    }
}
