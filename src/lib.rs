//! # lazymap
//!
//! Deferred-initialization wrapper around an asynchronously loaded mapping
//! runtime.
//!
//! Maps, markers, polylines and custom overlays can be configured before the
//! runtime behind them has finished loading. A shared [`Loader`] performs the
//! load exactly once and broadcasts readiness; every drawable then creates its
//! native counterpart exactly once and replays the configuration and event
//! listeners it buffered in the meantime.
//!
//! The runtime itself is abstracted behind [`backend::MapsBackend`]. The
//! in-process [`backend::headless::HeadlessBackend`] implements it without a
//! browser, which is what the tests and demos use.

pub mod backend;
pub mod core;
pub mod events;
pub mod layers;
pub mod loader;
pub mod materialize;
pub mod overlay;
pub mod prelude;
pub mod runtime;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::geo::{LatLng, Point};

pub use events::{Callback, Event, Evented, ListenerOptions};

pub use loader::{LoadConfig, LoadPhase, Loader, LoaderState};

pub use materialize::{MaterializationState, Materialize, NativeCell};

pub use layers::{
    base::{Layer, LayerType},
    map::{Map, MapOptions},
    marker::{Marker, MarkerOptions},
    polyline::{Polyline, PolylineOptions},
};

pub use overlay::{
    anchor::PopupAnchor, base::Overlay, popup::Popup, tooltip::Tooltip,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
///
/// Errors are `Clone` because a single load or materialization outcome is
/// shared by every caller awaiting it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    /// Invalid or missing required configuration (empty api key, empty
    /// container selector, no backend selected).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A synchronous "assume ready" path was used before the mapping
    /// runtime finished loading.
    #[error("Mapping library not loaded: {0}")]
    NotReady(String),

    /// The mapping runtime itself failed to load.
    #[error("External load error: {0}")]
    ExternalLoad(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        MapError::Serialization(err.to_string())
    }
}

/// Error type alias for convenience
pub type Error = MapError;

/// Initialise `env_logger` once; later calls are ignored.
#[cfg(feature = "debug")]
pub fn init_debug_logging() {
    let _ = env_logger::builder().is_test(cfg!(test)).try_init();
}
