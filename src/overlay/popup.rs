use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::{
    core::{
        constants::{CONTENT_CHANGED_EVENT, POPUP_OFFSET},
        geo::{LatLng, Point},
    },
    layers::{base::LayerType, map::Map},
    loader::Loader,
    overlay::base::Overlay,
    prelude::lock,
    Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PopupOptions {
    pub content: String,
    pub offset: Point,
}

impl Default for PopupOptions {
    fn default() -> Self {
        Self {
            content: String::new(),
            offset: Point::from(POPUP_OFFSET),
        }
    }
}

/// An info window opened at a position on a map.
#[derive(Clone)]
pub struct Popup {
    overlay: Overlay,
    content: Arc<Mutex<String>>,
}

impl Popup {
    pub fn new(content: &str) -> Self {
        Self::with_options(PopupOptions {
            content: content.to_string(),
            ..PopupOptions::default()
        })
    }

    pub fn with_options(options: PopupOptions) -> Self {
        Self::with_loader(options, Loader::new())
    }

    pub fn with_loader(options: PopupOptions, loader: Loader) -> Self {
        Self {
            overlay: Overlay::with_kind(LayerType::Popup, LatLng::default(), options.offset, loader),
            content: Arc::new(Mutex::new(options.content)),
        }
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn id(&self) -> &str {
        self.overlay.id()
    }

    pub fn content(&self) -> String {
        lock(&self.content).clone()
    }

    /// Replace the content and dispatch `content_changed`
    pub fn set_content(&self, content: &str) -> &Self {
        *lock(&self.content) = content.to_string();
        self.overlay
            .dispatch(CONTENT_CHANGED_EVENT, Some(json!({ "content": content })));
        self
    }

    /// Open at `position` on `map`, loading as needed
    pub fn open(&self, map: &Map, position: impl Into<LatLng>) -> BoxFuture<'static, Result<Popup>> {
        self.overlay.set_position(position);
        let shown = self.overlay.show(map);
        let popup = self.clone();
        async move {
            shown.await?;
            Ok(popup)
        }
        .boxed()
    }

    /// Open on a map whose library is already loaded
    pub fn open_sync(&self, map: &Map, position: impl Into<LatLng>) -> Result<Popup> {
        self.overlay.set_position(position);
        self.overlay.show_sync(map)?;
        Ok(self.clone())
    }

    pub fn close(&self) {
        self.overlay.hide();
    }

    pub fn is_open(&self) -> bool {
        self.overlay.is_shown()
    }
}

impl std::fmt::Debug for Popup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Popup")
            .field("overlay", &self.overlay)
            .field("content", &self.content())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Callback;
    use crate::loader::LoaderState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_defaults() {
        let popup = Popup::with_loader(
            PopupOptions {
                content: "Hello".into(),
                ..PopupOptions::default()
            },
            Loader::with_state(LoaderState::new()),
        );
        assert_eq!(popup.content(), "Hello");
        assert_eq!(popup.overlay().offset(), Point::new(0.0, -41.0));
        assert!(popup.id().starts_with("popup-"));
        assert!(!popup.is_open());
    }

    #[test]
    fn test_set_content_dispatches() {
        let popup = Popup::with_loader(PopupOptions::default(), Loader::with_state(LoaderState::new()));
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        popup.overlay().on(
            CONTENT_CHANGED_EVENT,
            Callback::new(move |event| {
                assert_eq!(event.detail.as_ref().unwrap()["content"], "Updated");
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        popup.set_content("Updated");
        assert_eq!(popup.content(), "Updated");
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }
}
