use futures::future::{BoxFuture, Shared};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::{
    backend::{MapsBackend, MapsLibrary},
    core::constants::{LOAD_EVENT, MAP_LOADED_EVENT},
    events::Evented,
    loader::LoadConfig,
    prelude::lock,
    Error, Result,
};

/// Where the one-time load of the mapping runtime stands.
///
/// `NotStarted → Loading → Loaded | Failed`. `Loaded` and `Failed` are
/// terminal for the lifetime of the state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadPhase {
    #[default]
    NotStarted,
    Loading,
    Loaded,
    Failed(Error),
}

impl LoadPhase {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadPhase::Loaded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadPhase::Failed(_))
    }
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPhase::NotStarted => write!(f, "not started"),
            LoadPhase::Loading => write!(f, "loading"),
            LoadPhase::Loaded => write!(f, "loaded"),
            LoadPhase::Failed(err) => write!(f, "failed ({err})"),
        }
    }
}

pub(crate) type SharedLoad = Shared<BoxFuture<'static, Result<()>>>;

/// Bookkeeping that keeps `map_loaded` behind `load`.
#[derive(Debug, Default)]
struct Readiness {
    /// Nesting depth of `load` dispatches in progress
    dispatching_load: usize,
    map_loaded: bool,
    map_loaded_pending: bool,
}

/// The single authoritative load configuration and phase.
///
/// Every [`crate::Loader`] built on the same state shares its config, its
/// phase and its event bus. [`LoaderState::get_instance`] is the
/// process-wide one; [`LoaderState::new`] builds an isolated one to inject.
pub struct LoaderState {
    config: Mutex<LoadConfig>,
    pub(crate) phase: Mutex<LoadPhase>,
    pub(crate) in_flight: Mutex<Option<SharedLoad>>,
    library: Mutex<Option<Arc<dyn MapsLibrary>>>,
    pub(crate) backend: Mutex<Option<Arc<dyn MapsBackend>>>,
    events: Evented,
    readiness: Mutex<Readiness>,
}

static INSTANCE: Lazy<Arc<LoaderState>> = Lazy::new(LoaderState::new);

impl LoaderState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(LoadConfig::default()),
            phase: Mutex::new(LoadPhase::NotStarted),
            in_flight: Mutex::new(None),
            library: Mutex::new(None),
            backend: Mutex::new(None),
            events: Evented::new(),
            readiness: Mutex::new(Readiness::default()),
        })
    }

    /// The process-wide state, created with defaults on first access
    pub fn get_instance() -> Arc<Self> {
        INSTANCE.clone()
    }

    pub fn config(&self) -> LoadConfig {
        lock(&self.config).clone()
    }

    /// Mutate the configuration. Changes made after the runtime loaded are
    /// kept but do not affect the loaded runtime.
    pub fn update_config<F>(&self, update: F)
    where
        F: FnOnce(&mut LoadConfig),
    {
        update(&mut lock(&self.config));
    }

    pub fn set_api_key(&self, api_key: &str) {
        self.update_config(|config| config.set_api_key(api_key));
    }

    pub fn set_libraries<I, S>(&self, libraries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_config(|config| config.set_libraries(libraries));
    }

    pub fn add_library(&self, library: &str) {
        self.update_config(|config| config.add_library(library));
    }

    pub fn set_version(&self, version: &str) {
        self.update_config(|config| config.set_version(version));
    }

    pub fn set_language(&self, language: &str) {
        self.update_config(|config| config.set_language(language));
    }

    pub fn set_region(&self, region: &str) {
        self.update_config(|config| config.set_region(region));
    }

    pub fn apply_options(&self, options: &serde_json::Value) {
        self.update_config(|config| config.apply_options(options));
    }

    /// Select the runtime that `load()` imports
    pub fn set_backend(&self, backend: Arc<dyn MapsBackend>) {
        *lock(&self.backend) = Some(backend);
    }

    pub fn phase(&self) -> LoadPhase {
        lock(&self.phase).clone()
    }

    /// The loaded runtime, once the phase is `Loaded`
    pub fn library(&self) -> Option<Arc<dyn MapsLibrary>> {
        lock(&self.library).clone()
    }

    /// Event bus shared by every loader bound to this state
    pub fn events(&self) -> &Evented {
        &self.events
    }

    pub fn is_map_loaded(&self) -> bool {
        let readiness = lock(&self.readiness);
        readiness.map_loaded && !readiness.map_loaded_pending
    }

    /// Record the outcome of the import. The phase changes before `load`
    /// is dispatched, never during.
    pub(crate) fn finish_load(
        &self,
        outcome: Result<Arc<dyn MapsLibrary>>,
        callback: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<()> {
        match outcome {
            Ok(library) => {
                *lock(&self.library) = Some(library);
                *lock(&self.phase) = LoadPhase::Loaded;
                *lock(&self.in_flight) = None;
                log::info!("mapping library loaded");
                if let Some(callback) = callback {
                    callback();
                }
                self.dispatch_load();
                Ok(())
            }
            Err(err) => {
                let err = match err {
                    Error::ExternalLoad(_) => err,
                    other => Error::ExternalLoad(other.to_string()),
                };
                log::warn!("mapping library failed to load: {err}");
                *lock(&self.phase) = LoadPhase::Failed(err.clone());
                *lock(&self.in_flight) = None;
                Err(err)
            }
        }
    }

    /// Dispatch `load`, then a `map_loaded` that was deferred behind it
    pub(crate) fn dispatch_load(&self) {
        lock(&self.readiness).dispatching_load += 1;
        self.events.dispatch(LOAD_EVENT, None);

        let flush_map_loaded = {
            let mut readiness = lock(&self.readiness);
            readiness.dispatching_load -= 1;
            readiness.dispatching_load == 0 && std::mem::take(&mut readiness.map_loaded_pending)
        };
        if flush_map_loaded {
            log::debug!("dispatching deferred {MAP_LOADED_EVENT}");
            self.events.dispatch(MAP_LOADED_EVENT, None);
        }
    }

    /// Called when a map finishes materializing. Only the first call
    /// dispatches, and never ahead of `load`.
    pub(crate) fn notify_map_loaded(&self) {
        let loaded = self.phase().is_loaded();
        let dispatch_now = {
            let mut readiness = lock(&self.readiness);
            if readiness.map_loaded {
                return;
            }
            readiness.map_loaded = true;
            if readiness.dispatching_load > 0 || !loaded {
                readiness.map_loaded_pending = true;
                false
            } else {
                true
            }
        };
        if dispatch_now {
            self.events.dispatch(MAP_LOADED_EVENT, None);
        }
    }
}

impl fmt::Debug for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderState")
            .field("config", &self.config())
            .field("phase", &self.phase())
            .field("events", &self.events)
            .finish()
    }
}
