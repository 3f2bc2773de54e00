use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::{
    core::{
        constants::{CONTENT_CHANGED_EVENT, TOOLTIP_OFFSET},
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
pub struct TooltipOptions {
    pub content: String,
    pub offset: Point,
    /// Stay open instead of following hover
    pub permanent: bool,
}

impl Default for TooltipOptions {
    fn default() -> Self {
        Self {
            content: String::new(),
            offset: Point::from(TOOLTIP_OFFSET),
            permanent: false,
        }
    }
}

/// A short label shown next to an anchor, usually while hovered.
#[derive(Clone)]
pub struct Tooltip {
    overlay: Overlay,
    options: Arc<Mutex<TooltipOptions>>,
}

impl Tooltip {
    pub fn new(content: &str) -> Self {
        Self::with_options(TooltipOptions {
            content: content.to_string(),
            ..TooltipOptions::default()
        })
    }

    pub fn with_options(options: TooltipOptions) -> Self {
        Self::with_loader(options, Loader::new())
    }

    pub fn with_loader(options: TooltipOptions, loader: Loader) -> Self {
        Self {
            overlay: Overlay::with_kind(
                LayerType::Tooltip,
                LatLng::default(),
                options.offset,
                loader,
            ),
            options: Arc::new(Mutex::new(options)),
        }
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn content(&self) -> String {
        lock(&self.options).content.clone()
    }

    /// Replace the content and dispatch `content_changed`
    pub fn set_content(&self, content: &str) -> &Self {
        lock(&self.options).content = content.to_string();
        self.overlay
            .dispatch(CONTENT_CHANGED_EVENT, Some(json!({ "content": content })));
        self
    }

    pub fn is_permanent(&self) -> bool {
        lock(&self.options).permanent
    }

    pub fn set_permanent(&self, permanent: bool) -> &Self {
        lock(&self.options).permanent = permanent;
        self
    }

    pub fn show_at(
        &self,
        map: &Map,
        position: impl Into<LatLng>,
    ) -> BoxFuture<'static, Result<Tooltip>> {
        self.overlay.set_position(position);
        let shown = self.overlay.show(map);
        let tooltip = self.clone();
        async move {
            shown.await?;
            Ok(tooltip)
        }
        .boxed()
    }

    pub fn show_at_sync(&self, map: &Map, position: impl Into<LatLng>) -> Result<Tooltip> {
        self.overlay.set_position(position);
        self.overlay.show_sync(map)?;
        Ok(self.clone())
    }

    pub fn hide(&self) {
        self.overlay.hide();
    }

    pub fn is_open(&self) -> bool {
        self.overlay.is_shown()
    }
}

impl std::fmt::Debug for Tooltip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tooltip")
            .field("overlay", &self.overlay)
            .field("options", &*lock(&self.options))
            .finish()
    }
}
