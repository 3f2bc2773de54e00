//! Core constants shared by the loader, the drawables and the headless backend.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Version channel requested from the mapping runtime when none is configured.
pub const DEFAULT_VERSION: &str = "weekly";

/// Readiness event dispatched once the mapping runtime has loaded.
pub const LOAD_EVENT: &str = "load";

/// Readiness event dispatched once the first map has a native handle.
pub const MAP_LOADED_EVENT: &str = "map_loaded";

/// Overlays whose projected pixel position lies further than this from the
/// map pane origin are hidden instead of drawn (extreme zoom/pan jitter).
pub const MAX_OVERLAY_PIXEL_OFFSET: f64 = 4000.0;

/// Square tile size used by the Web Mercator projection in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Default map viewport used by the headless backend, in pixels.
pub const DEFAULT_VIEWPORT_SIZE: (f64, f64) = (800.0, 600.0);

/// Default map zoom when none is configured.
pub const DEFAULT_ZOOM: f64 = 1.0;

/// Pixel offset applied to tooltips so they sit above their anchor.
pub const TOOLTIP_OFFSET: (f64, f64) = (0.0, -20.0);

/// Pixel offset applied to popups so they clear a default marker icon.
pub const POPUP_OFFSET: (f64, f64) = (0.0, -41.0);

/// Native pointer events the popup and tooltip bindings listen for.
pub const CLICK_EVENT: &str = "click";
pub const MOUSEOVER_EVENT: &str = "mouseover";
pub const MOUSEOUT_EVENT: &str = "mouseout";

/// Dispatched by popups and tooltips when their content is replaced.
pub const CONTENT_CHANGED_EVENT: &str = "content_changed";

/// Events an overlay dispatches from its render-loop hooks.
pub const OVERLAY_ADD_EVENT: &str = "add";
pub const OVERLAY_DRAW_EVENT: &str = "draw";
pub const OVERLAY_REMOVE_EVENT: &str = "remove";
