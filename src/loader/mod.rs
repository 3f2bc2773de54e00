//! One-time loading of the mapping runtime.

pub mod config;
#[allow(clippy::module_inception)]
pub mod loader;
pub mod state;

pub use config::LoadConfig;
pub use loader::Loader;
pub use state::{LoadPhase, LoaderState};
