//! Point-cloud searches used to recover quadrilateral corners from blob
//! edge points.

use crate::{GeometryError, Point, Rect};

/// Relative distortion limit for the corner search: a candidate corner must
/// sit at least this fraction of the mean cloud dimension away from the
/// diagonal it is tested against.
const RELATIVE_DISTORTION_LIMIT: f64 = 0.1;

/// Bounding rectangle of a point cloud.
pub fn bounding_rect(points: &[Point]) -> Result<Rect, GeometryError> {
    let first = points.first().ok_or(GeometryError::EmptyCloud)?;
    let mut min = *first;
    let mut max = *first;
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Ok(Rect::from_corners(min, max))
}

/// The cloud point furthest from `reference`.
///
/// Returns the first point for an empty slice comparison to stay total;
/// callers guard with [`bounding_rect`] which rejects empty clouds.
pub fn furthest_point(points: &[Point], reference: Point) -> Point {
    let mut best = reference;
    let mut best_dist = -1i64;
    for p in points {
        let d = p.squared_distance_to(reference);
        if d > best_dist {
            best_dist = d;
            best = *p;
        }
    }
    best
}

/// The furthest cloud point on each side of the line through `a` and `b`.
///
/// Each result is a point and its (non-negative) perpendicular distance.
/// When no cloud point lies strictly on a side, that side's result is the
/// corresponding line endpoint at distance zero.
pub fn furthest_points_from_line(
    points: &[Point],
    a: Point,
    b: Point,
) -> ((Point, f64), (Point, f64)) {
    let mut pos = (a, 0.0f64);
    let mut neg = (b, 0.0f64);

    if a.x != b.x {
        let k = (b.y - a.y) as f64 / (b.x - a.x) as f64;
        let c = a.y as f64 - k * a.x as f64;
        let div = (k * k + 1.0).sqrt();
        for p in points {
            let d = (k * p.x as f64 + c - p.y as f64) / div;
            if d > pos.1 {
                pos = (*p, d);
            }
            if d < -neg.1 {
                neg = (*p, -d);
            }
        }
    } else {
        for p in points {
            let d = (a.x - p.x) as f64;
            if d > pos.1 {
                pos = (*p, d);
            }
            if d < -neg.1 {
                neg = (*p, -d);
            }
        }
    }

    (pos, neg)
}

/// Find the corners of the quadrilateral (or triangle) a point cloud was
/// sampled from.
///
/// Returns 3 or 4 corners. The point with the lowest X (ties broken by
/// lowest Y) comes first; the remaining corners follow in counter-clockwise
/// screen order.
pub fn find_quadrilateral_corners(points: &[Point]) -> Result<Vec<Point>, GeometryError> {
    let rect = bounding_rect(points)?;
    let center = rect.center();
    let distortion_limit = RELATIVE_DISTORTION_LIMIT * (rect.width + rect.height) as f64 / 2.0;

    // The two points furthest from the centre and then from each other form
    // a diagonal of the shape.
    let p1 = furthest_point(points, center);
    let p2 = furthest_point(points, p1);

    let mut corners = vec![p1, p2];

    let ((p3, d3), (p4, d4)) = furthest_points_from_line(points, p1, p2);

    if d3 >= distortion_limit && d4 >= distortion_limit {
        // A point far from the diagonal on each side: a proper quadrilateral.
        corners.push(p3);
        corners.push(p4);
    } else {
        // Trapezoid or triangle: p1 and p2 ended up on the same edge. Pivot
        // on the better of the two off-line candidates and search again.
        let pivot = if d3 > d4 { p3 } else { p4 };

        let mut third = None;
        let ((c3, e3), (c4, e4)) = furthest_points_from_line(points, p1, pivot);
        if e3 >= distortion_limit && e4 >= distortion_limit {
            third = Some(if c4.distance_to(p2) > c3.distance_to(p2) {
                c4
            } else {
                c3
            });
        } else {
            let ((c3, e3), (c4, e4)) = furthest_points_from_line(points, p2, pivot);
            if e3 >= distortion_limit && e4 >= distortion_limit {
                third = Some(if c4.distance_to(p1) > c3.distance_to(p1) {
                    c4
                } else {
                    c3
                });
            }
        }

        match third {
            None => {
                // No third corner far enough from either diagonal: the cloud
                // is effectively a triangle.
                corners.push(pivot);
            }
            Some(p3) => {
                corners.push(p3);

                // One more search for the fourth corner, preferring the
                // candidate further from the unused diagonal endpoint.
                let ((t, td), (mut p4, fd)) = furthest_points_from_line(points, p1, p3);
                if td >= distortion_limit && fd >= distortion_limit {
                    if t.distance_to(p2) > p4.distance_to(p2) {
                        p4 = t;
                    }
                } else {
                    let ((t, _), (q, _)) = furthest_points_from_line(points, p2, p3);
                    p4 = q;
                    if t.distance_to(p1) > p4.distance_to(p1) && t != p2 && t != p3 {
                        p4 = t;
                    }
                }

                if p4 != p1 && p4 != p2 && p4 != p3 {
                    corners.push(p4);
                }
            }
        }
    }

    sort_counter_clockwise(&mut corners);
    Ok(corners)
}

/// Order corners with the lowest-X (then lowest-Y) point first and the rest
/// counter-clockwise by slope from it.
fn sort_counter_clockwise(corners: &mut [Point]) {
    let mut lowest = 0;
    for (i, c) in corners.iter().enumerate().skip(1) {
        if (c.x, c.y) < (corners[lowest].x, corners[lowest].y) {
            lowest = i;
        }
    }
    corners.swap(0, lowest);

    let origin = corners[0];
    let slope = |p: Point| -> f64 {
        if p.x != origin.x {
            (p.y - origin.y) as f64 / (p.x - origin.x) as f64
        } else if p.y > origin.y {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        }
    };
    corners[1..].sort_by(|a, b| slope(*a).total_cmp(&slope(*b)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perimeter_samples(corners: [(i32, i32); 4], per_edge: i32) -> Vec<Point> {
        let mut cloud = Vec::new();
        for i in 0..4 {
            let (ax, ay) = corners[i];
            let (bx, by) = corners[(i + 1) % 4];
            for s in 0..per_edge {
                let t = s as f64 / per_edge as f64;
                cloud.push(Point::new(
                    (ax as f64 + (bx - ax) as f64 * t).round() as i32,
                    (ay as f64 + (by - ay) as f64 * t).round() as i32,
                ));
            }
        }
        cloud
    }

    #[test]
    fn test_bounding_rect_rejects_empty_cloud() {
        assert_eq!(bounding_rect(&[]), Err(GeometryError::EmptyCloud));
    }

    #[test]
    fn test_furthest_point() {
        let cloud = [Point::new(0, 0), Point::new(10, 0), Point::new(3, 3)];
        assert_eq!(furthest_point(&cloud, Point::new(0, 0)), Point::new(10, 0));
    }

    #[test]
    fn test_furthest_points_from_line_sides() {
        let cloud = [
            Point::new(5, 10),
            Point::new(5, -4),
            Point::new(2, 1),
            Point::new(8, -1),
        ];
        let ((above, da), (below, db)) =
            furthest_points_from_line(&cloud, Point::new(0, 0), Point::new(10, 0));
        // For a horizontal line the "positive" side is below in screen
        // coordinates (y grows downward in the line equation used).
        assert_eq!(below, Point::new(5, 10));
        assert!((db - 10.0).abs() < 1e-9);
        assert_eq!(above, Point::new(5, -4));
        assert!((da - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_rectangle_corners_recovered_in_ccw_order() {
        let cloud = perimeter_samples([(100, 100), (500, 100), (500, 400), (100, 400)], 40);
        let corners = find_quadrilateral_corners(&cloud).unwrap();
        assert_eq!(
            corners,
            vec![
                Point::new(100, 100),
                Point::new(500, 100),
                Point::new(500, 400),
                Point::new(100, 400),
            ]
        );
    }

    #[test]
    fn test_skewed_quad_corners_recovered() {
        let expected = [(120, 80), (520, 140), (480, 420), (60, 380)];
        let cloud = perimeter_samples(expected, 60);
        let corners = find_quadrilateral_corners(&cloud).unwrap();
        assert_eq!(corners.len(), 4);
        for (x, y) in expected {
            assert!(
                corners
                    .iter()
                    .any(|c| c.distance_to(Point::new(x, y)) <= 2.0),
                "corner ({x},{y}) not recovered from {corners:?}"
            );
        }
    }

    #[test]
    fn test_lowest_x_corner_first() {
        let cloud = perimeter_samples([(60, 380), (120, 80), (520, 140), (480, 420)], 60);
        let corners = find_quadrilateral_corners(&cloud).unwrap();
        for c in &corners[1..] {
            assert!((corners[0].x, corners[0].y) <= (c.x, c.y));
        }
    }

    #[test]
    fn test_collinear_cloud_degrades_to_three_points() {
        let cloud: Vec<Point> = (0..50).map(|i| Point::new(i * 10, 7)).collect();
        let corners = find_quadrilateral_corners(&cloud).unwrap();
        assert_eq!(corners.len(), 3);
    }

    #[test]
    fn test_triangle_cloud_returns_three_corners() {
        let mut cloud = Vec::new();
        let tri = [(0, 0), (400, 0), (200, 300)];
        for i in 0..3 {
            let (ax, ay) = tri[i];
            let (bx, by) = tri[(i + 1) % 3];
            for s in 0..50 {
                let t = s as f64 / 50.0;
                cloud.push(Point::new(
                    (ax as f64 + (bx - ax) as f64 * t).round() as i32,
                    (ay as f64 + (by - ay) as f64 * t).round() as i32,
                ));
            }
        }
        let corners = find_quadrilateral_corners(&cloud).unwrap();
        assert_eq!(corners.len(), 3);
    }
}
