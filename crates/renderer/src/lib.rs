//! Image rendering for binned band rasters.
//!
//! - [`scale`]: value scaling and grey/RGB rendering with transparent gaps
//! - [`png`]: indexed and RGBA PNG encoding

pub mod png;
pub mod scale;

pub use png::{create_png, create_png_auto, PngError};
pub use scale::{render_grey, render_rgb, Color, LinearScale};
