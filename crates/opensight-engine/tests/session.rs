//! Session-level tests: camera frame in, cursor frame out, calibration
//! push serviced.

use opensight_engine::Session;
use opensight_test_helpers::{FakeGun, ManualClock};
use opensight_vision::{FrameView, PixelFormat, Rgb, VideoSettings};

const W: u32 = 640;
const H: u32 = 480;
const STRIDE: usize = W as usize * 3;

fn border_frame() -> Vec<u8> {
    let mut data = vec![0u8; STRIDE * H as usize];
    for y in 120..=359u32 {
        for x in 120..=519u32 {
            let on_band = y < 128 || y > 351 || x < 128 || x > 511;
            if on_band {
                let off = y as usize * STRIDE + x as usize * 3;
                data[off] = 255;
                data[off + 1] = 255;
                data[off + 2] = 255;
            }
        }
    }
    data
}

fn settings() -> VideoSettings {
    VideoSettings {
        border_color: Rgb::new(255, 255, 255),
        ..VideoSettings::default()
    }
}

fn started_session(gun: FakeGun) -> Session<FakeGun, ManualClock> {
    let mut session = Session::with_clock(settings(), ManualClock::new());
    session.connect_and_start(move || Ok(gun)).unwrap();
    session
}

#[test]
fn frames_turn_into_cursor_offsets() {
    let mut session = started_session(FakeGun::new());
    let data = border_frame();
    let frame = FrameView::new(W, H, STRIDE, PixelFormat::Bgr24, &data).unwrap();

    let aim = session.handle_frame(&frame).unwrap().expect("border found");
    assert!((40.0..60.0).contains(&aim.x));
    assert!((40.0..60.0).contains(&aim.y));

    let opcodes = session.protocol().link_ref().unwrap().opcodes();
    assert!(opcodes.contains(&40), "a cursor frame must have gone out");
}

#[test]
fn empty_frames_send_nothing() {
    let mut session = started_session(FakeGun::new());
    let data = vec![0u8; STRIDE * H as usize];
    let frame = FrameView::new(W, H, STRIDE, PixelFormat::Bgr24, &data).unwrap();

    let aim = session.handle_frame(&frame).unwrap();
    assert!(aim.is_none());

    let opcodes = session.protocol().link_ref().unwrap().opcodes();
    assert!(!opcodes.contains(&40));
}

#[test]
fn status_201_triggers_a_calibration_push_on_the_same_frame() {
    let mut gun = FakeGun::new();
    gun.cursor_status.push_back(vec![201]);
    let mut session = started_session(gun);

    let data = border_frame();
    let frame = FrameView::new(W, H, STRIDE, PixelFormat::Bgr24, &data).unwrap();
    session.handle_frame(&frame).unwrap().expect("border found");

    let info = session.protocol().device_info();
    assert!(
        !info.requires_calibration_push,
        "the push must be serviced immediately"
    );

    let opcodes = session.protocol().link_ref().unwrap().opcodes();
    assert!(opcodes.contains(&106), "calibration X update expected");
    assert!(opcodes.contains(&107), "calibration Y update expected");

    // The pushed values came from the detected quad centre, which is close
    // to the frame centre here.
    assert!(info.calibration_x.abs() < 1.0);
    assert!(info.calibration_y.abs() < 1.0);
}

#[test]
fn connect_and_start_learns_device_state() {
    let mut gun = FakeGun::new();
    gun.calibration_x = 10_150; // +1.50
    let session = started_session(gun);

    let info = session.protocol().device_info();
    assert!(info.firmware.is_some());
    assert!((info.calibration_x - 1.5).abs() < 0.005);
    assert!(session.protocol().is_connected());
}
