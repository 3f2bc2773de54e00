use futures::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;

use crate::{
    backend::{MapsBackend, MapsLibrary},
    core::constants::{LOAD_EVENT, MAP_LOADED_EVENT},
    events::{Callback, Event, ListenerOptions},
    loader::{LoadPhase, LoaderState},
    prelude::lock,
    runtime, Error, Result,
};

/// Drives the one-time load of the mapping runtime and broadcasts
/// readiness.
///
/// Loaders are cheap handles onto a [`LoaderState`]; all loaders on the same
/// state share its phase and its listeners, so a `load` dispatch reaches
/// listeners registered through any of them.
#[derive(Clone, Debug)]
pub struct Loader {
    state: Arc<LoaderState>,
}

impl Loader {
    /// Loader on the process-wide state
    pub fn new() -> Self {
        Self::with_state(LoaderState::get_instance())
    }

    pub fn with_state(state: Arc<LoaderState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<LoaderState> {
        &self.state
    }

    pub fn set_api_key(&self, api_key: &str) -> &Self {
        self.state.set_api_key(api_key);
        self
    }

    pub fn set_libraries<I, S>(&self, libraries: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.set_libraries(libraries);
        self
    }

    pub fn add_library(&self, library: &str) -> &Self {
        self.state.add_library(library);
        self
    }

    pub fn set_version(&self, version: &str) -> &Self {
        self.state.set_version(version);
        self
    }

    pub fn set_backend(&self, backend: Arc<dyn MapsBackend>) -> &Self {
        self.state.set_backend(backend);
        self
    }

    pub fn phase(&self) -> LoadPhase {
        self.state.phase()
    }

    pub fn is_loaded(&self) -> bool {
        self.phase().is_loaded()
    }

    pub fn library(&self) -> Option<Arc<dyn MapsLibrary>> {
        self.state.library()
    }

    /// Load the mapping runtime.
    ///
    /// The phase is inspected and advanced when this is called, not when
    /// the returned future is first polled:
    ///
    /// - not started: fails with [`Error::Configuration`] when the api key
    ///   is empty or no backend is set (the phase stays `NotStarted`);
    ///   otherwise starts the single import, which keeps running even if
    ///   the returned future is dropped
    /// - loading: joins the import already in flight
    /// - loaded: resolves immediately and dispatches `load` again so late
    ///   `once("load")` subscribers are served
    /// - failed: resolves immediately with the recorded error
    pub fn load(&self) -> BoxFuture<'static, Result<()>> {
        self.start_load(None)
    }

    /// [`Loader::load`], invoking `callback` once the runtime is available
    pub fn load_with<F>(&self, callback: F) -> BoxFuture<'static, Result<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        self.start_load(Some(Box::new(callback)))
    }

    fn start_load(
        &self,
        callback: Option<Box<dyn FnOnce() + Send>>,
    ) -> BoxFuture<'static, Result<()>> {
        let mut phase = lock(&self.state.phase);
        match phase.clone() {
            LoadPhase::Loaded => {
                drop(phase);
                if let Some(callback) = callback {
                    callback();
                }
                self.state.dispatch_load();
                future::ready(Ok(())).boxed()
            }
            LoadPhase::Failed(err) => future::ready(Err(err)).boxed(),
            LoadPhase::Loading => {
                let pending = lock(&self.state.in_flight).clone();
                drop(phase);
                async move {
                    match pending {
                        Some(pending) => pending.await?,
                        None => {
                            return Err(Error::Runtime(
                                "load in progress without a pending import".to_string(),
                            ))
                        }
                    }
                    if let Some(callback) = callback {
                        callback();
                    }
                    Ok(())
                }
                .boxed()
            }
            LoadPhase::NotStarted => {
                let config = self.state.config().normalized();
                if !config.has_credentials() {
                    log::warn!("load() called without an api key");
                    return future::ready(Err(Error::Configuration(
                        "an api key is required to load the mapping library".to_string(),
                    )))
                    .boxed();
                }
                let Some(backend) = lock(&self.state.backend).clone() else {
                    return future::ready(Err(Error::Configuration(
                        "no maps backend selected".to_string(),
                    )))
                    .boxed();
                };

                log::info!(
                    "loading mapping library (version {}, libraries {:?})",
                    config.version,
                    config.libraries
                );

                let state = self.state.clone();
                let import = async move {
                    let outcome = backend.import_library(&config).await;
                    state.finish_load(outcome, callback)
                }
                .boxed()
                .shared();
                // Published together with the phase so joiners always find it
                *lock(&self.state.in_flight) = Some(import.clone());
                *phase = LoadPhase::Loading;
                drop(phase);
                runtime::drive("mapping library import", import.clone().map(|_| ()));
                import.boxed()
            }
        }
    }

    pub fn on(&self, event_type: &str, callback: Callback) {
        self.state.events().on(event_type, callback);
    }

    pub fn once(&self, event_type: &str, callback: Callback) {
        self.state.events().once(event_type, callback);
    }

    pub fn off(
        &self,
        event_type: Option<&str>,
        callback: Option<&Callback>,
        options: Option<&ListenerOptions>,
    ) {
        self.state.events().off(event_type, callback, options);
    }

    pub fn off_listener(&self, event_type: &str, callback: &Callback) {
        self.state.events().off_listener(event_type, callback);
    }

    pub fn off_all(&self) {
        self.state.events().off_all();
    }

    pub fn has_listener(&self, event_type: &str, callback: Option<&Callback>) -> bool {
        self.state.events().has_listener(event_type, callback, None)
    }

    /// Run `callback` once the runtime is loaded: immediately if it already
    /// is, otherwise on the next `load` dispatch.
    pub fn on_load(&self, callback: Callback) {
        if self.is_loaded() {
            callback.call(&Event::bare(LOAD_EVENT));
        } else {
            self.once(LOAD_EVENT, callback);
        }
    }

    /// Run `callback` once the first map has its native handle: immediately
    /// if that already happened, otherwise on `map_loaded`.
    pub fn on_map_load(&self, callback: Callback) {
        if self.state.is_map_loaded() {
            callback.call(&Event::bare(MAP_LOADED_EVENT));
        } else {
            self.once(MAP_LOADED_EVENT, callback);
        }
    }

    pub(crate) fn notify_map_loaded(&self) {
        self.state.notify_map_loaded();
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
