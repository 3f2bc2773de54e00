//! Lazy materialization of native handles.
//!
//! Every drawable keeps its configuration locally and owns a [`NativeCell`].
//! The native counterpart is built from that configuration exactly once:
//! right away when the mapping library is already loaded, otherwise when the
//! loader dispatches `load`. Listeners registered in the meantime are
//! replayed in registration order through [`Evented::bind_native`].

use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::{
    backend::{MapsLibrary, NativeEvents},
    core::constants::LOAD_EVENT,
    events::{Callback, Evented},
    loader::{Loader, LoaderState},
    prelude::lock,
    runtime, Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaterializationState {
    #[default]
    Unmaterialized,
    Materializing,
    Materialized,
}

type SharedHandle<H> = Shared<BoxFuture<'static, Result<Arc<H>>>>;

struct Slot<H: ?Sized> {
    state: MaterializationState,
    handle: Option<Arc<H>>,
    in_flight: Option<SharedHandle<H>>,
    /// Loader whose library built `handle`
    origin: Option<Arc<LoaderState>>,
}

/// Holder of a drawable's optional native handle.
pub struct NativeCell<H: ?Sized> {
    slot: Mutex<Slot<H>>,
}

impl<H: ?Sized> NativeCell<H> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: MaterializationState::Unmaterialized,
                handle: None,
                in_flight: None,
                origin: None,
            }),
        }
    }

    pub fn state(&self) -> MaterializationState {
        lock(&self.slot).state
    }

    /// The native handle, if materialized
    pub fn handle(&self) -> Option<Arc<H>> {
        lock(&self.slot).handle.clone()
    }

    pub fn is_materialized(&self) -> bool {
        self.state() == MaterializationState::Materialized
    }

    /// Whether the handle was built from `loader`'s library. `None` while
    /// unmaterialized.
    pub fn built_by(&self, loader: &Loader) -> Option<bool> {
        let slot = lock(&self.slot);
        slot.handle.as_ref()?;
        Some(
            slot.origin
                .as_ref()
                .is_some_and(|origin| Arc::ptr_eq(origin, loader.state())),
        )
    }

    /// Back to `Unmaterialized` after a pending materialization failed
    fn reset(&self) {
        let mut slot = lock(&self.slot);
        if slot.handle.is_none() {
            slot.state = MaterializationState::Unmaterialized;
            slot.in_flight = None;
        }
    }
}

impl<H: ?Sized> Default for NativeCell<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> fmt::Debug for NativeCell<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCell")
            .field("state", &self.state())
            .finish()
    }
}

/// Shared inner state of a drawable whose native counterpart is created on
/// demand.
pub trait Materialize: Send + Sync + Sized + 'static {
    type Handle: ?Sized + Send + Sync + 'static;

    fn id(&self) -> &str;
    fn cell(&self) -> &NativeCell<Self::Handle>;
    fn events(&self) -> &Evented;
    /// Loader that provides the library. Children report their parent
    /// map's loader while shown.
    fn loader(&self) -> Loader;

    /// Build the native handle from the local configuration. Called with
    /// the cell locked, at most once per successful materialization.
    fn construct(this: &Arc<Self>, library: &dyn MapsLibrary) -> Result<Arc<Self::Handle>>;

    fn native_events(handle: Arc<Self::Handle>) -> Arc<dyn NativeEvents>;

    /// Runs after the handle is stored and pending listeners are replayed
    fn on_materialized(_this: &Arc<Self>, _handle: &Arc<Self::Handle>) -> Result<()> {
        Ok(())
    }
}

/// Resolve once the native handle exists, loading the library if needed.
///
/// The work starts when this is called: the load is kicked off, a `load`
/// subscription is registered and the pending materialization is driven on
/// the runtime, so dropping the returned future does not cancel it.
/// Concurrent callers share one in-flight materialization and all receive
/// the same handle. If the load or the construction fails the cell returns
/// to `Unmaterialized` and the error is handed to every waiter.
pub fn ensure_materialized<T: Materialize>(
    this: &Arc<T>,
) -> BoxFuture<'static, Result<Arc<T::Handle>>> {
    {
        let slot = lock(&this.cell().slot);
        if let Some(handle) = &slot.handle {
            return future::ready(Ok(handle.clone())).boxed();
        }
        if let Some(in_flight) = &slot.in_flight {
            return in_flight.clone().boxed();
        }
    }

    let loader = this.loader();
    if let Some(library) = loader.library() {
        return future::ready(materialize_now(this, &loader, library.as_ref())).boxed();
    }

    // Neither call may run with the cell locked: a loaded library dispatches
    // `load` synchronously and `on_ready` takes the lock.
    let on_ready = ready_listener(Arc::downgrade(this), loader.clone());
    loader.once(LOAD_EVENT, on_ready.clone());
    let load = loader.load();

    let mut slot = lock(&this.cell().slot);
    if let Some(handle) = &slot.handle {
        let handle = handle.clone();
        drop(slot);
        loader.off_listener(LOAD_EVENT, &on_ready);
        return future::ready(Ok(handle)).boxed();
    }
    if let Some(in_flight) = &slot.in_flight {
        let in_flight = in_flight.clone();
        drop(slot);
        loader.off_listener(LOAD_EVENT, &on_ready);
        return in_flight.boxed();
    }

    slot.state = MaterializationState::Materializing;
    let pending = materialize_after_load(Arc::downgrade(this), loader, load, on_ready)
        .boxed()
        .shared();
    slot.in_flight = Some(pending.clone());
    drop(slot);

    log::debug!("{} waiting for the mapping library", this.id());
    runtime::drive("pending materialization", pending.clone().map(|_| ()));
    pending.boxed()
}

/// Materializes as soon as `load` is dispatched, before `load` listeners
/// registered later run.
fn ready_listener<T: Materialize>(target: Weak<T>, loader: Loader) -> Callback {
    Callback::new(move |_| {
        let Some(this) = target.upgrade() else {
            return;
        };
        if let Some(library) = loader.library() {
            // Failures are logged and retried by the pending future
            let _ = materialize_now(&this, &loader, library.as_ref());
        }
    })
}

/// Wait for the load started by [`ensure_materialized`], then build the
/// handle straight from the loaded library. Does not depend on the `load`
/// subscription surviving, which callers can remove with `off_all`.
async fn materialize_after_load<T: Materialize>(
    target: Weak<T>,
    loader: Loader,
    load: BoxFuture<'static, Result<()>>,
    on_ready: Callback,
) -> Result<Arc<T::Handle>> {
    let outcome = match load.await {
        Ok(()) => upgrade(&target).and_then(|this| match loader.library() {
            Some(library) => materialize_now(&this, &loader, library.as_ref()),
            None => Err(Error::NotReady(
                "load finished without a library".to_string(),
            )),
        }),
        Err(err) => Err(err),
    };

    loader.off_listener(LOAD_EVENT, &on_ready);
    if outcome.is_err() {
        if let Some(this) = target.upgrade() {
            this.cell().reset();
        }
    }
    outcome
}

fn upgrade<T>(target: &Weak<T>) -> Result<Arc<T>> {
    target
        .upgrade()
        .ok_or_else(|| Error::Runtime("drawable dropped before materializing".to_string()))
}

/// Materialize without waiting.
///
/// Fails with [`Error::NotReady`] when the library has not loaded yet; that
/// signals a sequencing bug at the call site.
pub fn ensure_materialized_sync<T: Materialize>(this: &Arc<T>) -> Result<Arc<T::Handle>> {
    if let Some(handle) = this.cell().handle() {
        return Ok(handle);
    }
    let loader = this.loader();
    let library = loader.library().ok_or_else(|| {
        Error::NotReady(format!(
            "{} used before the mapping library finished loading",
            this.id()
        ))
    })?;
    materialize_now(this, &loader, library.as_ref())
}

fn materialize_now<T: Materialize>(
    this: &Arc<T>,
    loader: &Loader,
    library: &dyn MapsLibrary,
) -> Result<Arc<T::Handle>> {
    let handle = {
        let mut slot = lock(&this.cell().slot);
        if let Some(handle) = &slot.handle {
            return Ok(handle.clone());
        }
        match T::construct(this, library) {
            Ok(handle) => {
                slot.handle = Some(handle.clone());
                slot.state = MaterializationState::Materialized;
                slot.in_flight = None;
                slot.origin = Some(loader.state().clone());
                handle
            }
            Err(err) => {
                slot.state = MaterializationState::Unmaterialized;
                slot.in_flight = None;
                log::warn!("{} failed to materialize: {err}", this.id());
                return Err(err);
            }
        }
    };

    log::debug!("{} materialized", this.id());
    this.events().bind_native(T::native_events(handle.clone()));
    T::on_materialized(this, &handle)?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;
    use crate::backend::NativeMarker;
    use crate::layers::marker::MarkerOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Pin {
        cell: NativeCell<dyn NativeMarker>,
        events: Evented,
        loader: Loader,
        constructed: AtomicUsize,
    }

    impl Materialize for Pin {
        type Handle = dyn NativeMarker;

        fn id(&self) -> &str {
            "pin"
        }

        fn cell(&self) -> &NativeCell<dyn NativeMarker> {
            &self.cell
        }

        fn events(&self) -> &Evented {
            &self.events
        }

        fn loader(&self) -> Loader {
            self.loader.clone()
        }

        fn construct(this: &Arc<Self>, library: &dyn MapsLibrary) -> Result<Arc<dyn NativeMarker>> {
            this.constructed.fetch_add(1, Ordering::SeqCst);
            library.create_marker(&MarkerOptions::default())
        }

        fn native_events(handle: Arc<dyn NativeMarker>) -> Arc<dyn NativeEvents> {
            handle.into_events()
        }
    }

    fn pin(backend: HeadlessBackend, api_key: &str) -> Arc<Pin> {
        let loader = Loader::with_state(LoaderState::new());
        loader.set_api_key(api_key).set_backend(Arc::new(backend));
        Arc::new(Pin {
            cell: NativeCell::new(),
            events: Evented::new(),
            loader,
            constructed: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_handle() {
        let (backend, gate) = HeadlessBackend::gated();
        let pin = pin(backend, "key");

        let first = ensure_materialized(&pin);
        let second = ensure_materialized(&pin);
        assert_eq!(pin.cell.state(), MaterializationState::Materializing);

        gate.open();
        let (a, b) = futures::join!(first, second);
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pin.constructed.load(Ordering::SeqCst), 1);
        assert!(pin.cell.is_materialized());
        assert_eq!(pin.cell.built_by(&pin.loader), Some(true));
    }

    #[tokio::test]
    async fn test_sync_path_requires_loaded_library() {
        let pin = pin(HeadlessBackend::new(), "key");

        let err = ensure_materialized_sync(&pin).err().expect("not loaded yet");
        assert!(matches!(err, Error::NotReady(_)));
        assert_eq!(pin.cell.state(), MaterializationState::Unmaterialized);
        assert_eq!(pin.cell.built_by(&pin.loader), None);

        pin.loader.load().await.unwrap();
        let handle = ensure_materialized_sync(&pin).unwrap();
        let again = ensure_materialized(&pin).await.unwrap();
        assert!(Arc::ptr_eq(&handle, &again));
    }

    #[tokio::test]
    async fn test_failed_load_resets_cell() {
        let pin = pin(HeadlessBackend::new(), "");

        let err = ensure_materialized(&pin).await.err().expect("load should fail");
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(pin.cell.state(), MaterializationState::Unmaterialized);
        assert!(!pin.loader.has_listener(LOAD_EVENT, None));
        assert_eq!(pin.constructed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_request_still_materializes() {
        let (backend, gate) = HeadlessBackend::gated();
        let pin = pin(backend, "key");

        drop(ensure_materialized(&pin));
        assert_eq!(pin.loader.phase(), crate::loader::LoadPhase::Loading);

        gate.open();
        pin.loader.load().await.unwrap();

        assert!(pin.cell.is_materialized());
        assert_eq!(pin.constructed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleared_load_listeners_do_not_strand_waiters() {
        let (backend, gate) = HeadlessBackend::gated();
        let pin = pin(backend, "key");

        let pending = ensure_materialized(&pin);
        pin.loader.off_all();
        gate.open();

        let handle = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("resolves without the load listener")
            .unwrap();
        assert!(pin.cell.is_materialized());

        let again = tokio::time::timeout(Duration::from_secs(1), ensure_materialized(&pin))
            .await
            .expect("retry resolves")
            .unwrap();
        assert!(Arc::ptr_eq(&handle, &again));
        assert_eq!(pin.constructed.load(Ordering::SeqCst), 1);
    }
}
