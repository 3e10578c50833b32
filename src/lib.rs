//! Live makeup try-on: face landmarks in, composited cosmetics out.
//!
//! The per-frame pipeline is `TrackingResults` -> [`transform::RenderTransform`]
//! -> an [`render::OverlayRenderer`] backend drawing every selected region onto
//! a [`canvas::Canvas`]. [`session::Session`] owns one open mirror.

pub mod camera;
pub mod canvas;
pub mod color;
pub mod config;
pub mod decal;
pub mod draw;
pub mod error;
pub mod geometry;
pub mod landmarks;
pub mod raster;
pub mod region;
pub mod render;
pub mod session;
pub mod skin;
pub mod style;
pub mod synthetic;
pub mod tracker;
pub mod transform;
pub mod types;

pub use color::Rgb;
pub use config::TryOnConfig;
pub use error::{Result, TryOnError};
pub use landmarks::{Landmark, LandmarkFrame, ProjectedFace};
pub use region::{Region, RegionSelection};
pub use session::{Overlay, Session};
pub use style::{BlendMode, RegionStyle, StyleResolver};
pub use transform::RenderTransform;
