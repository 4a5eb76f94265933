//! Vision pipeline for the OpenSight light-gun driver.
//!
//! Camera frames come in as borrowed BGR/BGRA views; the pipeline thresholds
//! a region of interest against the configured border colour, labels
//! connected components, fits a convex quadrilateral to the best blob's edge
//! points, and inverse-maps the aim point to display percentages.
//!
//! The crate owns no I/O: transmitting an accepted aim point goes through the
//! [`AimTransport`] seam, implemented by the session over the serial protocol
//! engine.

#![deny(static_mut_refs)]

pub mod blobs;
pub mod image;
pub mod processor;
pub mod settings;
pub mod shape;

pub use blobs::{Blob, BlobCounter};
pub use image::{FrameView, GrayImage, PixelFormat};
pub use processor::{AimPoint, AimTransport, FrameProcessor};
pub use settings::{Handedness, Rgb, VideoSettings};
pub use shape::is_convex_polygon;

use opensight_geometry::GeometryError;

/// Errors produced by the vision pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    /// The labeling pass needs horizontal neighbours; a 1-pixel-wide image
    /// has none.
    #[error("image must be at least 2 pixels wide, got {0}")]
    ImageTooNarrow(u32),

    /// The pixel buffer does not cover `stride * height` bytes.
    #[error("pixel buffer holds {actual} bytes, expected at least {expected}")]
    BufferTooSmall { expected: usize, actual: usize },

    /// Blob queries before any [`BlobCounter::process`] call.
    #[error("no labeled image; process a frame first")]
    NotProcessed,

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// The aim transport rejected an accepted aim point.
    #[error("aim transport failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}
