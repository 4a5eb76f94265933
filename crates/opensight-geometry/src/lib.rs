//! 2D geometry primitives for the OpenSight vision pipeline.
//!
//! This crate is I/O-free and allocation-light: integer points, bounding
//! rectangles, the point-cloud quadrilateral corner search used to recover
//! the screen border from blob edge points, and the 3x3 projective
//! transforms that map between camera space and display percentages.

#![deny(static_mut_refs)]

pub mod cloud;
pub mod homography;
pub mod point;
pub mod rect;

pub use cloud::{
    bounding_rect, find_quadrilateral_corners, furthest_point, furthest_points_from_line,
};
pub use homography::{adjugate, aim_percentages, camera_point, quad_to_quad, square_to_quad};
pub use point::{Point, PointF};
pub use rect::Rect;

/// Errors produced by the geometry primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// An operation that needs at least one point received none.
    #[error("point cloud is empty")]
    EmptyCloud,
}
