//! Runtime abstraction layer for fire-and-forget async work
//!
//! `Map::init`, the loader and pending materializations drive work without
//! anyone awaiting it. The spawner is chosen by feature: tokio
//! (`tokio-runtime`, default) or the browser event loop (`wasm`). A custom spawner can be installed with [`init_runtime`].

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;

use crate::{Error, Result};

pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(&self, future: BoxedTask) -> Result<Box<dyn AsyncHandle>>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Spawn `future` on the installed runtime
pub fn spawn<F>(future: F) -> Result<Box<dyn AsyncHandle>>
where
    F: Future<Output = ()> + Send + 'static,
{
    log::trace!("runtime::spawn");
    runtime()
        .ok_or_else(|| {
            Error::Runtime(
                "no async runtime available; enable 'tokio-runtime' or 'wasm'".to_string(),
            )
        })?
        .spawn_boxed(Box::pin(future))
}

/// Keep `future` progressing when its caller drops the handle. Without a
/// runtime it only progresses while awaited.
pub(crate) fn drive<F>(what: &str, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(err) = spawn(future) {
        log::debug!("{what} progresses only while awaited: {err}");
    }
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::runtime::Handle;
        use ::tokio::task::JoinHandle;

        /// Spawns onto the tokio runtime of the calling context
        pub struct TokioSpawner;

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(&self, future: BoxedTask) -> Result<Box<dyn AsyncHandle>> {
                let handle = Handle::try_current()
                    .map_err(|err| Error::Runtime(format!("not inside a tokio runtime: {err}")))?;
                Ok(Box::new(TokioHandle(handle.spawn(future))))
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }

            fn cancel(&self) {
                self.0.abort();
            }
        }
    }

    #[cfg(feature = "wasm")]
    pub mod wasm {
        use super::*;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        /// Spawns onto the browser's microtask queue
        pub struct WasmSpawner;

        impl AsyncSpawner for WasmSpawner {
            fn spawn_boxed(&self, future: BoxedTask) -> Result<Box<dyn AsyncHandle>> {
                let finished = Arc::new(AtomicBool::new(false));
                let flag = finished.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    future.await;
                    flag.store(true, Ordering::SeqCst);
                });
                Ok(Box::new(WasmHandle { finished }))
            }
        }

        struct WasmHandle {
            finished: Arc<AtomicBool>,
        }

        impl AsyncHandle for WasmHandle {
            fn is_finished(&self) -> bool {
                self.finished.load(Ordering::SeqCst)
            }

            fn cancel(&self) {
                // Local tasks can't be aborted; only stop reporting them
                self.finished.store(true, Ordering::SeqCst);
            }
        }
    }
}

static RUNTIME: OnceLock<Box<dyn AsyncSpawner>> = OnceLock::new();

/// Install a spawner. Has no effect once a spawner is in use.
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) {
    if RUNTIME.set(spawner).is_err() {
        log::debug!("runtime already initialised; keeping the existing spawner");
    }
}

/// The installed spawner, falling back to the feature default
pub fn runtime() -> Option<&'static dyn AsyncSpawner> {
    if let Some(spawner) = RUNTIME.get() {
        return Some(spawner.as_ref());
    }
    default_spawner().map(|spawner| RUNTIME.get_or_init(|| spawner).as_ref())
}

fn default_spawner() -> Option<Box<dyn AsyncSpawner>> {
    #[cfg(feature = "tokio-runtime")]
    {
        Some(Box::new(spawners::tokio_impl::TokioSpawner))
    }

    #[cfg(all(feature = "wasm", not(feature = "tokio-runtime")))]
    {
        Some(Box::new(spawners::wasm::WasmSpawner))
    }

    #[cfg(not(any(feature = "tokio-runtime", feature = "wasm")))]
    {
        None
    }
}
