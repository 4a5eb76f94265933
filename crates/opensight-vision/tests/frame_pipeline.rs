//! End-to-end frame pipeline tests over synthetic camera frames.

use opensight_vision::{
    AimPoint, AimTransport, FrameProcessor, FrameView, PixelFormat, Rgb, VideoSettings,
};

const W: u32 = 640;
const H: u32 = 480;
const STRIDE: usize = W as usize * 3;

struct RecordingTransport {
    sent: Vec<(i16, i16)>,
}

impl AimTransport for RecordingTransport {
    fn send_aim(
        &mut self,
        x: i16,
        y: i16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sent.push((x, y));
        Ok(())
    }
}

/// Black frame with a white rectangular border outline, like a display
/// border seen head-on by the barrel camera.
fn border_frame(left: u32, top: u32, right: u32, bottom: u32, thickness: u32) -> Vec<u8> {
    let mut data = vec![0u8; STRIDE * H as usize];
    let mut set = |x: u32, y: u32| {
        let off = y as usize * STRIDE + x as usize * 3;
        data[off] = 255;
        data[off + 1] = 255;
        data[off + 2] = 255;
    };
    for y in top..=bottom {
        for x in left..=right {
            let on_band = y < top + thickness
                || y > bottom - thickness
                || x < left + thickness
                || x > right - thickness;
            if on_band {
                set(x, y);
            }
        }
    }
    data
}

fn settings() -> VideoSettings {
    VideoSettings {
        border_color: Rgb::new(255, 255, 255),
        jitter_move_threshold: 1.0,
        ..VideoSettings::default()
    }
}

#[test]
fn centred_border_yields_centre_aim_point() {
    let data = border_frame(120, 120, 519, 359, 8);
    let frame = FrameView::new(W, H, STRIDE, PixelFormat::Bgr24, &data).unwrap();
    let mut processor = FrameProcessor::new();
    let mut transport = RecordingTransport { sent: Vec::new() };

    let aim = processor
        .process(&frame, &settings(), (0.0, 0.0), &mut transport)
        .unwrap()
        .expect("border quad should be found");

    assert!((45.0..55.0).contains(&aim.x), "aim.x = {}", aim.x);
    assert!((45.0..55.0).contains(&aim.y), "aim.y = {}", aim.y);
    assert_eq!(transport.sent.len(), 1);

    // The quad centre almost coincides with the frame centre, so the
    // inferred calibration offsets are near zero.
    let (cx, cy) = processor.inferred_calibration();
    assert!(cx.abs() < 0.5 && cy.abs() < 0.5, "calibration ({cx},{cy})");

    // The next-frame ROI hugs the border with a margin and stays usable.
    let roi = processor.roi().expect("roi should be adopted");
    assert!(roi.x >= 0 && roi.y >= 0);
    assert!(roi.right() <= W as i32 && roi.bottom() <= H as i32);
    assert!(roi.width >= W as i32 / 8 && roi.height >= H as i32 / 8);
    assert!(roi.width < W as i32, "roi should be tighter than the frame");
}

#[test]
fn anti_jitter_suppresses_a_static_aim_after_history_fills() {
    let data = border_frame(120, 120, 519, 359, 8);
    let frame = FrameView::new(W, H, STRIDE, PixelFormat::Bgr24, &data).unwrap();
    let mut processor = FrameProcessor::new();
    let mut transport = RecordingTransport { sent: Vec::new() };
    let settings = settings();

    // The history ring starts zeroed, so the first five frames all pass the
    // anti-jitter gate even though the gun is perfectly still.
    for i in 0..5 {
        let accepted = processor
            .process(&frame, &settings, (0.0, 0.0), &mut transport)
            .unwrap();
        assert!(accepted.is_some(), "frame {i} should be accepted");
    }
    assert_eq!(transport.sent.len(), 5);

    // With five near-identical points on record, the sixth is suppressed.
    let suppressed = processor
        .process(&frame, &settings, (0.0, 0.0), &mut transport)
        .unwrap();
    assert!(suppressed.is_none());
    assert_eq!(transport.sent.len(), 5);
}

#[test]
fn empty_frame_finds_nothing() {
    let data = vec![0u8; STRIDE * H as usize];
    let frame = FrameView::new(W, H, STRIDE, PixelFormat::Bgr24, &data).unwrap();
    let mut processor = FrameProcessor::new();
    let mut transport = RecordingTransport { sent: Vec::new() };

    let aim = processor
        .process(&frame, &settings(), (0.0, 0.0), &mut transport)
        .unwrap();
    assert!(aim.is_none());
    assert!(transport.sent.is_empty());
    assert!(processor.roi().is_none());
}

#[test]
fn calibration_offset_shifts_the_aim_point() {
    let data = border_frame(120, 120, 519, 359, 8);
    let frame = FrameView::new(W, H, STRIDE, PixelFormat::Bgr24, &data).unwrap();
    let mut processor = FrameProcessor::new();
    let mut transport = RecordingTransport { sent: Vec::new() };

    let centred = processor
        .process(&frame, &settings(), (0.0, 0.0), &mut transport)
        .unwrap()
        .unwrap();

    let mut processor = FrameProcessor::new();
    // +10% calibration on X moves the probe point 64 pixels right.
    let shifted = processor
        .process(&frame, &settings(), (10.0, 0.0), &mut transport)
        .unwrap()
        .unwrap();

    assert!(
        shifted.x > centred.x + 10.0,
        "expected a clear rightward shift: {} vs {}",
        shifted.x,
        centred.x
    );
    assert!((shifted.y - centred.y).abs() < 2.0);
}

#[test]
fn transmitted_offsets_scale_to_signed_sixteen_bit() {
    let data = border_frame(120, 120, 519, 359, 8);
    let frame = FrameView::new(W, H, STRIDE, PixelFormat::Bgr24, &data).unwrap();
    let mut processor = FrameProcessor::new();
    let mut transport = RecordingTransport { sent: Vec::new() };

    let aim: AimPoint = processor
        .process(&frame, &settings(), (0.0, 0.0), &mut transport)
        .unwrap()
        .unwrap();

    let (tx, ty) = transport.sent[0];
    assert_eq!(tx, (aim.x / 100.0 * i16::MAX as f64) as i16);
    assert_eq!(ty, (aim.y / 100.0 * i16::MAX as f64) as i16);
}
