//! Macros to reduce boilerplate in drawable implementations
//!
//! Every drawable is a cheap handle around an `Arc` of its shared state,
//! which carries an `id`, an `Evented` and a `NativeCell`. These macros
//! generate the delegating parts that are identical across drawables.

/// Implement the [`Materialize`](crate::materialize::Materialize) accessors
/// for an inner state struct with `id`, `cell`, `events` and `loader`
/// fields.
///
/// Child drawables pass `parented`: they also carry a `parent` slot and
/// materialize through the loader of the map they are shown on, falling
/// back to their own while detached.
///
/// Usage:
/// ```ignore
/// impl Materialize for MarkerInner {
///     type Handle = dyn NativeMarker;
///     impl_materialize_accessors!(parented);
///     // construct, native_events, on_materialized
/// }
/// ```
#[macro_export]
macro_rules! impl_materialize_accessors {
    () => {
        $crate::impl_materialize_accessors!(@common);

        fn loader(&self) -> $crate::loader::Loader {
            self.loader.clone()
        }
    };
    (parented) => {
        $crate::impl_materialize_accessors!(@common);

        fn loader(&self) -> $crate::loader::Loader {
            self.parent.loader_or(&self.loader)
        }
    };
    (@common) => {
        fn id(&self) -> &str {
            &self.id
        }

        fn cell(&self) -> &$crate::materialize::NativeCell<Self::Handle> {
            &self.cell
        }

        fn events(&self) -> &$crate::events::Evented {
            &self.events
        }
    };
}

/// Generate the listener surface of a drawable handle whose shared state
/// lives in `self.$inner`.
///
/// This generates:
/// - on(), once(), off(), off_listener(), off_all()
/// - dispatch(), has_listener(), events()
#[macro_export]
macro_rules! impl_evented_delegate {
    ($inner:ident) => {
        pub fn on(&self, event_type: &str, callback: $crate::events::Callback) -> &Self {
            self.$inner.events.on(event_type, callback);
            self
        }

        pub fn once(&self, event_type: &str, callback: $crate::events::Callback) -> &Self {
            self.$inner.events.once(event_type, callback);
            self
        }

        pub fn off(
            &self,
            event_type: Option<&str>,
            callback: Option<&$crate::events::Callback>,
            options: Option<&$crate::events::ListenerOptions>,
        ) -> &Self {
            self.$inner.events.off(event_type, callback, options);
            self
        }

        pub fn off_listener(&self, event_type: &str, callback: &$crate::events::Callback) -> &Self {
            self.$inner.events.off_listener(event_type, callback);
            self
        }

        pub fn off_all(&self) -> &Self {
            self.$inner.events.off_all();
            self
        }

        pub fn dispatch(&self, event_type: &str, detail: Option<serde_json::Value>) {
            self.$inner.events.dispatch(event_type, detail);
        }

        pub fn has_listener(
            &self,
            event_type: &str,
            callback: Option<&$crate::events::Callback>,
        ) -> bool {
            self.$inner.events.has_listener(event_type, callback, None)
        }

        pub fn events(&self) -> &$crate::events::Evented {
            &self.$inner.events
        }
    };
}

/// Implement [`Layer`](crate::layers::base::Layer) for a child drawable
/// whose inherent `show`, `hide` and `parent` already exist.
#[macro_export]
macro_rules! impl_layer_trait {
    ($layer:ty, $layer_type:expr) => {
        #[async_trait::async_trait]
        impl $crate::layers::base::Layer for $layer {
            fn id(&self) -> &str {
                &self.inner.id
            }

            fn layer_type(&self) -> $crate::layers::base::LayerType {
                $layer_type
            }

            fn events(&self) -> &$crate::events::Evented {
                &self.inner.events
            }

            async fn add_to(&self, map: &$crate::layers::map::Map) -> $crate::Result<()> {
                self.show(map).await.map(|_| ())
            }

            fn remove(&self) {
                self.hide();
            }

            fn parent(&self) -> Option<$crate::layers::map::Map> {
                self.inner.parent.get()
            }
        }
    };
}
