//! Convex-quadrilateral fit testing over blob edge points.

use opensight_geometry::{GeometryError, Point, bounding_rect, find_quadrilateral_corners};

/// Interior angles above this are considered flat and their vertex dropped
/// during simplification.
const MAX_ANGLE_TO_KEEP: f64 = 160.0;

/// Floor for the acceptable mean distortion, in pixels.
const MIN_ACCEPTABLE_DISTORTION: f64 = 0.5;

/// Acceptable mean distortion as a fraction of the mean cloud dimension.
const RELATIVE_DISTORTION_LIMIT: f64 = 0.03;

/// Check whether a set of edge points outlines a convex polygon.
///
/// Returns the fit verdict together with the simplified corner list
/// (typically 4 points; 3 for degenerate clouds).
pub fn is_convex_polygon(edge_points: &[Point]) -> Result<(bool, Vec<Point>), GeometryError> {
    let mut corners = find_quadrilateral_corners(edge_points)?;
    simplify_flat_angles(&mut corners);
    let fits = points_fit_polygon(edge_points, &corners)?;
    Ok((fits, corners))
}

/// Interior angle at `vertex` between the edges to `prev` and `next`,
/// in degrees.
fn vertex_angle(prev: Point, vertex: Point, next: Point) -> f64 {
    let ax = (prev.x - vertex.x) as f64;
    let ay = (prev.y - vertex.y) as f64;
    let bx = (next.x - vertex.x) as f64;
    let by = (next.y - vertex.y) as f64;
    let dot = ax * bx + ay * by;
    let norm = (ax * ax + ay * ay).sqrt() * (bx * bx + by * by).sqrt();
    if norm == 0.0 {
        return 0.0;
    }
    (dot / norm).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Drop vertices whose interior angle is close to flat, wrapping across the
/// last and first vertices, without reducing the polygon below 4 points.
fn simplify_flat_angles(corners: &mut Vec<Point>) {
    let mut i = 1;
    while corners.len() > 4 && i + 1 < corners.len() {
        if vertex_angle(corners[i - 1], corners[i], corners[i + 1]) > MAX_ANGLE_TO_KEEP {
            corners.remove(i);
        } else {
            i += 1;
        }
    }
    if corners.len() > 4 {
        let n = corners.len();
        if vertex_angle(corners[n - 2], corners[n - 1], corners[0]) > MAX_ANGLE_TO_KEEP {
            corners.remove(n - 1);
        }
    }
    if corners.len() > 4 {
        let n = corners.len();
        if vertex_angle(corners[n - 1], corners[0], corners[1]) > MAX_ANGLE_TO_KEEP {
            corners.remove(0);
        }
    }
}

/// Mean-distance fit test: every edge point's distance to the nearest
/// polygon side, averaged, must stay within the distortion budget.
fn points_fit_polygon(edge_points: &[Point], corners: &[Point]) -> Result<bool, GeometryError> {
    let rect = bounding_rect(edge_points)?;
    let max_mean_distance = MIN_ACCEPTABLE_DISTORTION
        .max(RELATIVE_DISTORTION_LIMIT * (rect.width + rect.height) as f64 / 2.0);

    // Precompute line equations for each side.
    let n = corners.len();
    let mut sides = Vec::with_capacity(n);
    for i in 0..n {
        let a = corners[i];
        let b = corners[(i + 1) % n];
        if a.x == b.x {
            sides.push(Side::Vertical { x: a.x as f64 });
        } else {
            let k = (b.y - a.y) as f64 / (b.x - a.x) as f64;
            let c = a.y as f64 - k * a.x as f64;
            let div = (k * k + 1.0).sqrt();
            sides.push(Side::Sloped { k, c, div });
        }
    }

    let mut total = 0.0;
    for p in edge_points {
        let mut min_dist = f64::MAX;
        for side in &sides {
            let d = match side {
                Side::Vertical { x } => (p.x as f64 - x).abs(),
                Side::Sloped { k, c, div } => ((k * p.x as f64 + c - p.y as f64) / div).abs(),
            };
            min_dist = min_dist.min(d);
        }
        total += min_dist;
    }

    Ok(total / edge_points.len() as f64 <= max_mean_distance)
}

enum Side {
    Vertical { x: f64 },
    Sloped { k: f64, c: f64, div: f64 },
}
