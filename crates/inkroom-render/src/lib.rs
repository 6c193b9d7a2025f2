//! InkRoom Render Library
//!
//! Stroke surfaces for InkRoom boards. The default implementation appends
//! strokes to a Vello scene that the host platform presents.

mod vello_surface;

pub use vello_surface::VelloSurface;
