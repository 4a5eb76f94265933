//! Projective transforms between quadrilaterals.
//!
//! The canonical intermediate is the square `(0,0),(99,0),(99,99),(0,99)`;
//! quad-to-quad maps compose a square-to-quad matrix with the adjugate of
//! another, avoiding an explicit inverse. Callers must pass non-degenerate
//! quads; the perspective division is deliberately unguarded, since the
//! convex-quad check earlier in the pipeline rules out degenerate input.

use nalgebra::{Matrix3, Vector3};

use crate::PointF;

/// Side length of the canonical square.
const SQUARE_SIDE: f64 = 99.0;

/// Below this the cross-sum of quad corners is treated as zero and the
/// transform degrades to the affine closed form.
const AFFINE_EPS: f64 = 1e-13;

/// Percentage-space quadrilateral: the full display as 0..100 on each axis.
const PERCENT_QUAD: [PointF; 4] = [
    PointF::new(0.0, 0.0),
    PointF::new(100.0, 0.0),
    PointF::new(100.0, 100.0),
    PointF::new(0.0, 100.0),
];

/// Homography mapping the canonical square onto quadrilateral `q`.
///
/// Corner order is significant: square corner `i` maps to `q[i]`.
pub fn square_to_quad(q: &[PointF; 4]) -> Matrix3<f64> {
    let sx = q[0].x - q[1].x + q[2].x - q[3].x;
    let sy = q[0].y - q[1].y + q[2].y - q[3].y;

    let mut m = if sx.abs() < AFFINE_EPS && sy.abs() < AFFINE_EPS {
        Matrix3::new(
            q[1].x - q[0].x,
            q[2].x - q[1].x,
            q[0].x,
            q[1].y - q[0].y,
            q[2].y - q[1].y,
            q[0].y,
            0.0,
            0.0,
            1.0,
        )
    } else {
        let dx1 = q[1].x - q[2].x;
        let dx2 = q[3].x - q[2].x;
        let dy1 = q[1].y - q[2].y;
        let dy2 = q[3].y - q[2].y;
        let den = dx1 * dy2 - dx2 * dy1;
        let g = (sx * dy2 - dx2 * sy) / den;
        let h = (dx1 * sy - sx * dy1) / den;
        Matrix3::new(
            q[1].x - q[0].x + g * q[1].x,
            q[3].x - q[0].x + h * q[3].x,
            q[0].x,
            q[1].y - q[0].y + g * q[1].y,
            q[3].y - q[0].y + h * q[3].y,
            q[0].y,
            g,
            h,
            1.0,
        )
    };

    // Rescale from the unit square to the canonical 99-square.
    for r in 0..3 {
        m[(r, 0)] /= SQUARE_SIDE;
        m[(r, 1)] /= SQUARE_SIDE;
    }
    m
}

/// Adjugate (transposed cofactor matrix): a scalar multiple of the inverse
/// that never divides.
pub fn adjugate(m: &Matrix3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)],
        m[(0, 2)] * m[(2, 1)] - m[(0, 1)] * m[(2, 2)],
        m[(0, 1)] * m[(1, 2)] - m[(0, 2)] * m[(1, 1)],
        m[(1, 2)] * m[(2, 0)] - m[(1, 0)] * m[(2, 2)],
        m[(0, 0)] * m[(2, 2)] - m[(0, 2)] * m[(2, 0)],
        m[(0, 2)] * m[(1, 0)] - m[(0, 0)] * m[(1, 2)],
        m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)],
        m[(0, 1)] * m[(2, 0)] - m[(0, 0)] * m[(2, 1)],
        m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
    )
}

/// Homography taking quadrilateral `a` onto quadrilateral `b`.
pub fn quad_to_quad(a: &[PointF; 4], b: &[PointF; 4]) -> Matrix3<f64> {
    square_to_quad(b) * adjugate(&square_to_quad(a))
}

fn apply(m: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let v = m * Vector3::new(x, y, 1.0);
    (v[0] / v[2], v[1] / v[2])
}

/// Display percentage of camera point `(x, y)` inside `quad`.
///
/// The quad centre of a parallelogram maps to exactly `(50, 50)`.
pub fn aim_percentages(quad: &[PointF; 4], x: f64, y: f64) -> (f64, f64) {
    let m = quad_to_quad(quad, &PERCENT_QUAD);
    apply(&m, x, y)
}

/// Sub-pixel camera point of the centred display percentage
/// `(x_offset + 50, y_offset + 50)` inside `quad`.
pub fn camera_point(quad: &[PointF; 4], x_offset: f64, y_offset: f64) -> (f64, f64) {
    let m = quad_to_quad(&PERCENT_QUAD, quad);
    apply(&m, x_offset + 50.0, y_offset + 50.0)
}
