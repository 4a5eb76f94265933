//! Per-frame aim-point pipeline.
//!
//! Each camera frame is thresholded against the border colour inside the
//! current region of interest at half resolution, the best border blob is
//! fitted with a convex quadrilateral, and the aim point is the inverse
//! projective map of the (calibration-shifted) camera centre into that quad.
//! Accepted points go out through [`AimTransport`] and feed the adaptive ROI
//! for the next frame.

use opensight_geometry::{Point, Rect, aim_percentages, camera_point};
use tracing::{debug, trace};

use crate::VisionError;
use crate::blobs::BlobCounter;
use crate::image::{FrameView, GrayImage};
use crate::settings::{Handedness, VideoSettings};
use crate::shape::is_convex_polygon;

/// Any channel must exceed this for a pixel to count as border at all.
const MIN_BRIGHTNESS: u8 = 64;

/// Accepted aim points kept for the anti-jitter check.
const HISTORY_LEN: usize = 5;

/// ROI bounding-box expansion per side, as a fraction of the quad size.
const ROI_EXPANSION: f64 = 0.15;

/// Minimum blob dimension at half resolution, by ROI width.
const WIDE_ROI_MIN_BLOB: u32 = 30;
const NARROW_ROI_MIN_BLOB: u32 = 15;
const WIDE_ROI_WIDTH: i32 = 600;

/// Band around the screen centre where an axis cannot disambiguate the
/// handedness decision.
const HANDEDNESS_AMBIGUITY_BAND: f64 = 2.0;

/// An aim point in display percent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AimPoint {
    pub x: f64,
    pub y: f64,
}

impl AimPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Outbound seam for accepted aim points.
///
/// Implementations are expected to frame the offsets and ship them to the
/// device; the processor never touches the serial link directly.
pub trait AimTransport {
    fn send_aim(&mut self, x: i16, y: i16)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Corner permutation applied after the handedness decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CornerOrder {
    /// The quad reads landscape in camera space; grip does not matter.
    Upright,
    LeftHand,
    RightHand,
}

impl CornerOrder {
    fn permutation(self) -> [usize; 4] {
        match self {
            CornerOrder::Upright => [0, 1, 3, 2],
            CornerOrder::LeftHand => [2, 0, 3, 1],
            CornerOrder::RightHand => [1, 3, 2, 0],
        }
    }
}

/// Stateful per-frame processor. One instance per device session.
pub struct FrameProcessor {
    counter: BlobCounter,
    roi: Option<Rect>,
    history: [AimPoint; HISTORY_LEN],
    head: usize,
    last_point: AimPoint,
    remembered_hand: Handedness,
    inferred_calibration: (f64, f64),
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProcessor {
    pub fn new() -> Self {
        let mut counter = BlobCounter::new();
        counter.filter_blobs = true;
        counter.coupled_size_filtering = true;
        Self {
            counter,
            roi: None,
            history: [AimPoint::default(); HISTORY_LEN],
            head: 0,
            last_point: AimPoint::default(),
            remembered_hand: Handedness::Right,
            inferred_calibration: (0.0, 0.0),
        }
    }

    /// Calibration offsets inferred from the last detected quad centre, in
    /// percent of the frame dimensions.
    pub fn inferred_calibration(&self) -> (f64, f64) {
        self.inferred_calibration
    }

    /// Current region of interest, when one is active.
    pub fn roi(&self) -> Option<Rect> {
        self.roi
    }

    /// Process one camera frame.
    ///
    /// `calibration` is the device's stored calibration pair in percent.
    /// Returns the accepted aim point, or `None` when no border quad was
    /// found or the point was suppressed.
    pub fn process(
        &mut self,
        frame: &FrameView<'_>,
        settings: &VideoSettings,
        calibration: (f64, f64),
        transport: &mut dyn AimTransport,
    ) -> Result<Option<AimPoint>, VisionError> {
        let frame_w = frame.width() as i32;
        let frame_h = frame.height() as i32;
        let full = Rect::new(0, 0, frame_w, frame_h);
        let roi = match self.roi {
            Some(r) if roi_is_usable(r, frame_w, frame_h) => r,
            _ => full,
        };

        let working = self.threshold_downsample(frame, roi, settings);

        self.counter.min_width = if roi.width > WIDE_ROI_WIDTH {
            WIDE_ROI_MIN_BLOB
        } else {
            NARROW_ROI_MIN_BLOB
        };
        self.counter.min_height = self.counter.min_width;
        if let Err(e) = self.counter.process(&working.as_view()) {
            self.roi = None;
            return Err(e);
        }

        let Some(corners) = self.pick_border_quad(frame, roi, settings, calibration)? else {
            trace!("no border quadrilateral in frame");
            self.roi = None;
            return Ok(None);
        };

        // Resolve handedness on the full-resolution corners, remember the
        // decision, and refine each corner outward onto the true border.
        let sorted = sort_for_handedness(&corners);
        let order = self.resolve_handedness(&sorted, frame, settings, calibration);
        if order != CornerOrder::Upright && settings.handedness == Handedness::Auto {
            self.remembered_hand = match order {
                CornerOrder::LeftHand => Handedness::Left,
                _ => Handedness::Right,
            };
        }
        let mut quad = permute(&sorted, order);
        for (index, corner) in quad.iter_mut().enumerate() {
            let shift = corner_shift(index, self.corner_probe(frame, *corner, settings));
            corner.x += shift.0;
            corner.y += shift.1;
        }
        let quad_f = quad.map(|p| p.to_f());

        // Aim point: inverse map of the calibration-shifted camera centre.
        let target_x = frame_w as f64 / 2.0 + calibration.0 / 100.0 * frame_w as f64;
        let target_y = frame_h as f64 / 2.0 + calibration.1 / 100.0 * frame_h as f64;
        let (x_pct, y_pct) = aim_percentages(&quad_f, target_x, target_y);

        // Quad centre via the forward map feeds the inferred calibration.
        let (centre_x, centre_y) = camera_point(&quad_f, 0.0, settings.y_sight_offset);
        self.inferred_calibration = (
            (centre_x - frame_w as f64 / 2.0) / frame_w as f64 * 100.0,
            (centre_y - frame_h as f64 / 2.0) / frame_h as f64 * 100.0,
        );

        if !(x_pct > -50.0 && x_pct < 150.0 && y_pct > -50.0 && y_pct < 150.0) {
            debug!(x_pct, y_pct, "aim point outside plausible range");
            return Ok(None);
        }

        let candidate = AimPoint::new(x_pct, y_pct);
        if settings.use_anti_jitter
            && !jitter_accepts(&self.history, candidate, settings.jitter_move_threshold)
        {
            trace!(x_pct, y_pct, "aim point suppressed by anti-jitter");
            return Ok(None);
        }

        let tx = (x_pct / 100.0 * i16::MAX as f64) as i16;
        let ty = (y_pct / 100.0 * i16::MAX as f64) as i16;
        transport.send_aim(tx, ty).map_err(VisionError::Transport)?;

        self.history[self.head] = candidate;
        self.head = (self.head + 1) % HISTORY_LEN;
        self.last_point = candidate;
        self.roi = next_roi(&quad, frame_w, frame_h);

        Ok(Some(candidate))
    }

    /// Border test for a single full-resolution pixel: bright enough and
    /// close enough to the configured border colour.
    fn check_pixel(&self, frame: &FrameView<'_>, x: i32, y: i32, settings: &VideoSettings) -> bool {
        if x < 0 || y < 0 || x >= frame.width() as i32 || y >= frame.height() as i32 {
            return false;
        }
        let (r, g, b) = frame.rgb(x as u32, y as u32);
        if r <= MIN_BRIGHTNESS && g <= MIN_BRIGHTNESS && b <= MIN_BRIGHTNESS {
            return false;
        }
        let d2 = settings
            .border_color
            .squared_distance_to(crate::settings::Rgb::new(r, g, b));
        d2 <= settings.filter_radius * settings.filter_radius
    }

    /// 2x2 foreground probe around a corner, as `[p00, p10, p01, p11]`.
    fn corner_probe(
        &self,
        frame: &FrameView<'_>,
        corner: Point,
        settings: &VideoSettings,
    ) -> [bool; 4] {
        [
            self.check_pixel(frame, corner.x, corner.y, settings),
            self.check_pixel(frame, corner.x + 1, corner.y, settings),
            self.check_pixel(frame, corner.x, corner.y + 1, settings),
            self.check_pixel(frame, corner.x + 1, corner.y + 1, settings),
        ]
    }

    /// Threshold the ROI into an 8-bpp image at half resolution: an output
    /// pixel is lit when any pixel of its 2x2 source block passes the
    /// border test.
    fn threshold_downsample(
        &self,
        frame: &FrameView<'_>,
        roi: Rect,
        settings: &VideoSettings,
    ) -> GrayImage {
        let half_w = (roi.width / 2) as u32;
        let half_h = (roi.height / 2) as u32;
        let mut out = GrayImage::new(half_w, half_h);
        for oy in 0..half_h {
            for ox in 0..half_w {
                let sx = roi.x + ox as i32 * 2;
                let sy = roi.y + oy as i32 * 2;
                if self.check_pixel(frame, sx, sy, settings)
                    || self.check_pixel(frame, sx + 1, sy, settings)
                    || self.check_pixel(frame, sx, sy + 1, settings)
                    || self.check_pixel(frame, sx + 1, sy + 1, settings)
                {
                    out.set(ox, oy, 255);
                }
            }
        }
        out
    }

    /// Pick the best border candidate among the labeled blobs: convex quad,
    /// optionally pointing at the display, largest bounding box wins.
    /// Returns full-resolution corners.
    fn pick_border_quad(
        &self,
        frame: &FrameView<'_>,
        roi: Rect,
        settings: &VideoSettings,
        calibration: (f64, f64),
    ) -> Result<Option<[Point; 4]>, VisionError> {
        let frame_w = frame.width() as i32;
        let frame_h = frame.height() as i32;
        let mut best: Option<(i64, [Point; 4])> = None;

        for blob in self.counter.blobs() {
            let edge_points = self.counter.blob_edge_points(blob)?;
            let (fits, corners) = match is_convex_polygon(&edge_points) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if !fits || corners.len() != 4 {
                continue;
            }

            // Back to full resolution: detection ran on the half-res ROI.
            let full_res: [Point; 4] = [0usize, 1, 2, 3]
                .map(|i| Point::new(roi.x + corners[i].x * 2, roi.y + corners[i].y * 2));

            if settings.only_match_where_pointing {
                let sorted = sort_for_handedness(&full_res);
                let order = self.resolve_handedness(&sorted, frame, settings, calibration);
                let quad = permute(&sorted, order).map(|p| p.to_f());
                let tx = frame_w as f64 / 2.0 + calibration.0 / 100.0 * frame_w as f64;
                let ty = frame_h as f64 / 2.0 + calibration.1 / 100.0 * frame_h as f64;
                let (x_pct, y_pct) = aim_percentages(&quad, tx, ty);
                let y_lo = settings.y_sight_offset;
                let y_hi = 100.0 + settings.y_sight_offset;
                if !(0.0..=100.0).contains(&x_pct) || !(y_lo..=y_hi).contains(&y_pct) {
                    continue;
                }
            }

            let area = blob.rect.area();
            if best.as_ref().is_none_or(|(a, _)| area > *a) {
                best = Some((area, full_res));
            }
        }

        Ok(best.map(|(_, corners)| corners))
    }

    /// Decide the corner order for a canonically sorted quad.
    ///
    /// Quads that read landscape in camera space need no handedness. A
    /// forced setting wins; otherwise the previous aim point disambiguates
    /// between the left- and right-hand interpretations when it sat clearly
    /// off-centre, and the last decision carries over when it did not.
    fn resolve_handedness(
        &self,
        sorted: &[Point; 4],
        frame: &FrameView<'_>,
        settings: &VideoSettings,
        calibration: (f64, f64),
    ) -> CornerOrder {
        if sorted[0].distance_to(sorted[1]) > sorted[0].distance_to(sorted[2]) {
            return CornerOrder::Upright;
        }
        let hand = match settings.handedness {
            Handedness::Left => return CornerOrder::LeftHand,
            Handedness::Right => return CornerOrder::RightHand,
            Handedness::Auto => {
                let last = self.last_point;
                let inside =
                    last.x > 0.0 && last.x < 100.0 && last.y > 0.0 && last.y < 100.0;
                if !inside {
                    return hand_to_order(self.remembered_hand);
                }

                let frame_w = frame.width() as f64;
                let frame_h = frame.height() as f64;
                let tx = frame_w / 2.0 + calibration.0 / 100.0 * frame_w;
                let ty = frame_h / 2.0 + calibration.1 / 100.0 * frame_h;

                let right_quad = permute(sorted, CornerOrder::RightHand).map(|p| p.to_f());
                let left_quad = permute(sorted, CornerOrder::LeftHand).map(|p| p.to_f());
                let right = aim_percentages(&right_quad, tx, ty);
                let left = aim_percentages(&left_quad, tx, ty);
                pick_handedness(
                    last,
                    AimPoint::new(right.0, right.1),
                    AimPoint::new(left.0, left.1),
                    self.remembered_hand,
                )
            }
        };
        hand_to_order(hand)
    }
}

fn hand_to_order(hand: Handedness) -> CornerOrder {
    match hand {
        Handedness::Left => CornerOrder::LeftHand,
        _ => CornerOrder::RightHand,
    }
}

/// Sort corners by lowest X, ties broken by lowest Y.
fn sort_for_handedness(corners: &[Point; 4]) -> [Point; 4] {
    let mut sorted = *corners;
    sorted.sort_by_key(|p| (p.x, p.y));
    sorted
}

fn permute(sorted: &[Point; 4], order: CornerOrder) -> [Point; 4] {
    order.permutation().map(|i| sorted[i])
}

/// Choose between the right- and left-hand interpretations given both
/// predicted aim points and the previous accepted point.
///
/// The comparison runs on whichever axis of the previous point sits outside
/// the ambiguity band around the screen centre; when both axes are inside
/// the band, the remembered decision stands.
fn pick_handedness(
    last: AimPoint,
    right_prediction: AimPoint,
    left_prediction: AimPoint,
    remembered: Handedness,
) -> Handedness {
    let pick_on = |r: f64, l: f64, prev: f64| {
        if (r - prev).abs() <= (l - prev).abs() {
            Handedness::Right
        } else {
            Handedness::Left
        }
    };
    if (last.x - 50.0).abs() > HANDEDNESS_AMBIGUITY_BAND {
        pick_on(right_prediction.x, left_prediction.x, last.x)
    } else if (last.y - 50.0).abs() > HANDEDNESS_AMBIGUITY_BAND {
        pick_on(right_prediction.y, left_prediction.y, last.y)
    } else {
        remembered
    }
}

/// Anti-jitter gate: a candidate passes when at least one of the last five
/// accepted points differs from it by more than the threshold on either
/// axis.
fn jitter_accepts(history: &[AimPoint], candidate: AimPoint, threshold: f64) -> bool {
    history
        .iter()
        .any(|p| (p.x - candidate.x).abs() > threshold || (p.y - candidate.y).abs() > threshold)
}

/// Sub-pixel corner refinement shift for corner `index` (top-left,
/// top-right, bottom-right, bottom-left) from the 2x2 foreground probe
/// `[p00, p10, p01, p11]`.
fn corner_shift(index: usize, probe: [bool; 4]) -> (i32, i32) {
    let [p00, p10, p01, p11] = probe;
    match index {
        0 => {
            if p00 || (p10 && p01) {
                (0, 0)
            } else if p10 {
                (1, 0)
            } else if p01 {
                (0, 1)
            } else {
                (1, 1)
            }
        }
        1 => {
            if p10 || (p00 && p11) {
                (1, 0)
            } else if p11 {
                (1, 1)
            } else {
                (0, 1)
            }
        }
        2 => {
            if p11 || (p10 && p01) {
                (1, 1)
            } else if p10 {
                (1, 0)
            } else if p01 {
                (0, 1)
            } else {
                (0, 0)
            }
        }
        _ => {
            if p01 || (p00 && p11) {
                (0, 1)
            } else if p00 {
                (0, 0)
            } else if p11 {
                (1, 1)
            } else {
                (1, 0)
            }
        }
    }
}

/// ROI for the next frame: the quad's bounding box expanded by 15% per
/// side and clamped to the frame. Rejected (full-frame fallback) when the
/// clamp leaves less than an eighth of the frame on either axis.
fn next_roi(quad: &[Point; 4], frame_w: i32, frame_h: i32) -> Option<Rect> {
    let min_x = quad.iter().map(|p| p.x).min().unwrap_or(0);
    let max_x = quad.iter().map(|p| p.x).max().unwrap_or(0);
    let min_y = quad.iter().map(|p| p.y).min().unwrap_or(0);
    let max_y = quad.iter().map(|p| p.y).max().unwrap_or(0);
    let ex = ((max_x - min_x) as f64 * ROI_EXPANSION).round() as i32;
    let ey = ((max_y - min_y) as f64 * ROI_EXPANSION).round() as i32;
    let roi = Rect::new(
        min_x - ex,
        min_y - ey,
        max_x - min_x + 2 * ex,
        max_y - min_y + 2 * ey,
    )
    .clamped_to(frame_w, frame_h);
    roi_is_usable(roi, frame_w, frame_h).then_some(roi)
}

fn roi_is_usable(roi: Rect, frame_w: i32, frame_h: i32) -> bool {
    roi.x >= 0
        && roi.y >= 0
        && roi.right() <= frame_w
        && roi.bottom() <= frame_h
        && roi.width >= frame_w / 8
        && roi.height >= frame_h / 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_rejects_small_moves_with_full_history() {
        let history = [AimPoint::new(50.0, 50.0); HISTORY_LEN];
        assert!(!jitter_accepts(&history, AimPoint::new(50.3, 50.2), 0.5));
        assert!(jitter_accepts(&history, AimPoint::new(50.6, 50.0), 0.5));
    }

    #[test]
    fn test_jitter_accepts_until_history_settles() {
        // Zero-initialised history: any on-screen candidate is far from at
        // least one slot, so nothing is suppressed early in a session.
        let history = [AimPoint::default(); HISTORY_LEN];
        assert!(jitter_accepts(&history, AimPoint::new(50.0, 50.0), 0.5));
    }

    #[test]
    fn test_handedness_picked_on_clear_x_axis() {
        let hand = pick_handedness(
            AimPoint::new(70.0, 30.0),
            AimPoint::new(72.0, 31.0),
            AimPoint::new(28.0, 69.0),
            Handedness::Left,
        );
        assert_eq!(hand, Handedness::Right);
    }

    #[test]
    fn test_handedness_falls_back_to_y_axis() {
        let hand = pick_handedness(
            AimPoint::new(50.5, 20.0),
            AimPoint::new(49.0, 81.0),
            AimPoint::new(51.0, 19.0),
            Handedness::Right,
        );
        assert_eq!(hand, Handedness::Left);
    }

    #[test]
    fn test_handedness_remembers_when_centred() {
        let hand = pick_handedness(
            AimPoint::new(50.0, 50.5),
            AimPoint::new(60.0, 60.0),
            AimPoint::new(40.0, 40.0),
            Handedness::Left,
        );
        assert_eq!(hand, Handedness::Left);
    }

    #[test]
    fn test_corner_shift_policy_table() {
        // Top-left: keep on p00 or the diagonal pair, otherwise move onto
        // whichever neighbour is foreground.
        assert_eq!(corner_shift(0, [true, false, false, false]), (0, 0));
        assert_eq!(corner_shift(0, [false, true, true, false]), (0, 0));
        assert_eq!(corner_shift(0, [false, true, false, false]), (1, 0));
        assert_eq!(corner_shift(0, [false, false, true, false]), (0, 1));
        assert_eq!(corner_shift(0, [false, false, false, true]), (1, 1));

        // Top-right prefers +x, then the diagonal, then down.
        assert_eq!(corner_shift(1, [false, true, false, false]), (1, 0));
        assert_eq!(corner_shift(1, [true, false, false, true]), (1, 0));
        assert_eq!(corner_shift(1, [false, false, false, true]), (1, 1));
        assert_eq!(corner_shift(1, [true, false, true, false]), (0, 1));

        // Bottom-right pushes down-right whenever it can.
        assert_eq!(corner_shift(2, [false, false, false, true]), (1, 1));
        assert_eq!(corner_shift(2, [false, true, true, false]), (1, 1));
        assert_eq!(corner_shift(2, [false, true, false, false]), (1, 0));
        assert_eq!(corner_shift(2, [false, false, true, false]), (0, 1));
        assert_eq!(corner_shift(2, [false, false, false, false]), (0, 0));

        // Bottom-left prefers +y, keeps on p00, and only then drifts right.
        assert_eq!(corner_shift(3, [false, false, true, false]), (0, 1));
        assert_eq!(corner_shift(3, [true, false, false, true]), (0, 1));
        assert_eq!(corner_shift(3, [true, false, false, false]), (0, 0));
        assert_eq!(corner_shift(3, [false, false, false, true]), (1, 1));
        assert_eq!(corner_shift(3, [false, true, false, false]), (1, 0));
    }

    #[test]
    fn test_corner_permutations() {
        let sorted = [
            Point::new(0, 0),
            Point::new(1, 1),
            Point::new(2, 2),
            Point::new(3, 3),
        ];
        assert_eq!(
            permute(&sorted, CornerOrder::Upright),
            [sorted[0], sorted[1], sorted[3], sorted[2]]
        );
        assert_eq!(
            permute(&sorted, CornerOrder::LeftHand),
            [sorted[2], sorted[0], sorted[3], sorted[1]]
        );
        assert_eq!(
            permute(&sorted, CornerOrder::RightHand),
            [sorted[1], sorted[3], sorted[2], sorted[0]]
        );
    }

    #[test]
    fn test_next_roi_expansion_and_validity() {
        let quad = [
            Point::new(120, 120),
            Point::new(520, 120),
            Point::new(520, 360),
            Point::new(120, 360),
        ];
        let roi = next_roi(&quad, 640, 480).unwrap();
        assert_eq!(roi, Rect::new(60, 84, 520, 312));
        assert!(roi_is_usable(roi, 640, 480));
    }

    #[test]
    fn test_next_roi_rejected_when_too_small() {
        let quad = [
            Point::new(10, 10),
            Point::new(40, 10),
            Point::new(40, 30),
            Point::new(10, 30),
        ];
        assert!(next_roi(&quad, 640, 480).is_none());
    }

    #[test]
    fn test_roi_usability_bounds() {
        assert!(roi_is_usable(Rect::new(0, 0, 640, 480), 640, 480));
        assert!(!roi_is_usable(Rect::new(600, 0, 80, 480), 640, 480));
        assert!(!roi_is_usable(Rect::new(0, 0, 79, 480), 640, 480));
    }
}
