use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::{
    backend::NativeMap, events::Evented, layers::map::Map, loader::Loader,
    materialize::NativeCell, prelude::lock, Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Map,
    Marker,
    Polyline,
    Overlay,
    Popup,
    Tooltip,
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerType::Map => write!(f, "map"),
            LayerType::Marker => write!(f, "marker"),
            LayerType::Polyline => write!(f, "polyline"),
            LayerType::Overlay => write!(f, "overlay"),
            LayerType::Popup => write!(f, "popup"),
            LayerType::Tooltip => write!(f, "tooltip"),
        }
    }
}

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id such as `"marker-3"`
pub fn next_layer_id(layer_type: LayerType) -> String {
    format!("{}-{}", layer_type, NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
}

/// A drawable that is shown on a [`Map`].
#[async_trait]
pub trait Layer: Send + Sync {
    fn id(&self) -> &str;

    fn layer_type(&self) -> LayerType;

    fn events(&self) -> &Evented;

    /// Attach to `map`, loading the mapping library and materializing both
    /// sides as needed
    async fn add_to(&self, map: &Map) -> Result<()>;

    /// Detach from the current map. A no-op when not attached.
    fn remove(&self);

    /// The map this layer was last added to and not removed from
    fn parent(&self) -> Option<Map>;
}

/// The map a child drawable currently belongs to.
///
/// Materialization can complete long after the caller asked for it, so the
/// child reads the slot again when its native handle appears instead of
/// trusting the map it was shown on at the time.
#[derive(Debug, Default)]
pub struct ParentSlot {
    current: Mutex<Option<Map>>,
}

impl ParentSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, map: &Map) {
        *lock(&self.current) = Some(map.clone());
    }

    pub fn clear(&self) -> Option<Map> {
        lock(&self.current).take()
    }

    pub fn get(&self) -> Option<Map> {
        lock(&self.current).clone()
    }

    pub fn is(&self, map: &Map) -> bool {
        lock(&self.current)
            .as_ref()
            .is_some_and(|current| current.ptr_eq(map))
    }

    /// Native handle of the current parent, when both exist
    pub fn native_target(&self) -> Option<Arc<dyn NativeMap>> {
        self.get().and_then(|map| map.to_native())
    }

    /// The current parent's loader, or `fallback` while detached
    pub fn loader_or(&self, fallback: &Loader) -> Loader {
        match lock(&self.current).as_ref() {
            Some(map) => map.loader().clone(),
            None => fallback.clone(),
        }
    }
}

/// A child's native handle lives in one library; refuse to move it onto a
/// map served by a different loader.
pub(crate) fn check_same_loader<H: ?Sized>(
    id: &str,
    cell: &NativeCell<H>,
    map: &Map,
) -> Result<()> {
    match cell.built_by(map.loader()) {
        Some(false) => Err(Error::Configuration(format!(
            "{id} was materialized by a different loader than {}",
            map.id()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_ids_are_unique() {
        let a = next_layer_id(LayerType::Marker);
        let b = next_layer_id(LayerType::Marker);
        assert!(a.starts_with("marker-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_layer_type_display() {
        assert_eq!(LayerType::Polyline.to_string(), "polyline");
        assert_eq!(LayerType::Tooltip.to_string(), "tooltip");
    }

    #[test]
    fn test_parent_slot() {
        let slot = ParentSlot::new();
        let map = Map::new("map", Default::default());
        let other = Map::new("other", Default::default());

        assert!(slot.get().is_none());
        slot.set(&map);
        assert!(slot.is(&map));
        assert!(!slot.is(&other));
        assert!(slot.native_target().is_none());

        assert!(slot.clear().is_some());
        assert!(!slot.is(&map));
    }

    #[test]
    fn test_parent_slot_lends_the_maps_loader() {
        let own = Loader::with_state(crate::loader::LoaderState::new());
        let map_loader = Loader::with_state(crate::loader::LoaderState::new());
        let map = Map::with_loader("map", Default::default(), map_loader.clone());
        let slot = ParentSlot::new();

        assert!(Arc::ptr_eq(slot.loader_or(&own).state(), own.state()));
        slot.set(&map);
        assert!(Arc::ptr_eq(slot.loader_or(&own).state(), map_loader.state()));
    }
}
