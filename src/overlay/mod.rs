//! Custom-drawn overlays: the shared base plus popups and tooltips.

pub mod anchor;
pub mod base;
pub mod popup;
pub mod tooltip;
