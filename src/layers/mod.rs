//! Map and the drawables shown on it.

pub mod base;
pub mod macros;
pub mod map;
pub mod marker;
pub mod polyline;
