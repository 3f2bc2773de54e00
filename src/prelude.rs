//! Prelude module for common lazymap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use lazymap::prelude::*;`

pub use crate::core::{
    constants,
    geo::{LatLng, LatLngBounds, Point},
};

pub use crate::events::{Callback, Event, Evented, ListenerOptions};

pub use crate::loader::{LoadConfig, LoadPhase, Loader, LoaderState};

pub use crate::backend::{
    headless::{HeadlessBackend, LoadGate},
    MapsBackend, MapsLibrary, NativeEvents, NativeMap, NativeMarker, NativeOverlayView,
    NativePolyline, OverlayHooks, Projection,
};

pub use crate::materialize::{
    ensure_materialized, ensure_materialized_sync, MaterializationState, Materialize,
};

pub use crate::layers::{
    base::{Layer, LayerType},
    map::{Map, MapOptions},
    marker::{Marker, MarkerOptions},
    polyline::{Polyline, PolylineOptions},
};

pub use crate::overlay::{
    anchor::{AnchorBinding, PopupAnchor},
    base::Overlay,
    popup::{Popup, PopupOptions},
    tooltip::{Tooltip, TooltipOptions},
};

pub use crate::runtime::{spawn, AsyncHandle, AsyncSpawner};

pub use crate::{Error as MapError, Result};

pub use std::sync::Arc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::future::BoxFuture;

/// Lock a mutex, recovering the data if a panicking listener poisoned it.
pub(crate) fn lock<T: ?Sized>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
