//! Golden-trace tests for the connect sequence, run against the scripted
//! device simulator with virtual time.

use std::time::Duration;

use opensight_test_helpers::{FakeGun, ManualClock, ScriptedLink};
use serial_lightgun_protocol::{ConnectionState, ProtocolEngine, ProtocolError};

#[test]
fn connect_transmits_the_exact_golden_trace() {
    let mut engine: ProtocolEngine<FakeGun, ManualClock> =
        ProtocolEngine::with_clock(ManualClock::new());
    engine.connect_with(|| Ok(FakeGun::new())).unwrap();

    assert!(engine.is_connected());
    assert_eq!(engine.state(), ConnectionState::Authenticated);

    let gun = engine.link_ref().unwrap();
    // Connect frame, 32 key bytes, Handshake frame, 32 digest bytes, then
    // the Authenticated frame twice: 7 + 32 + 7 + 32 + 7 + 7 bytes.
    assert_eq!(gun.written().len(), 92);
    assert_eq!(gun.opcodes(), vec![110, 109, 121, 121]);
    assert_eq!(gun.frames()[0], [0xAA, 110, 0, 0, 0, 0, 0xBB]);
    assert!(gun.digest_verified(), "host digest must verify on-device");
}

#[test]
fn connect_completes_within_the_timing_budget() {
    let clock = ManualClock::new();
    let mut engine: ProtocolEngine<FakeGun, &ManualClock> = ProtocolEngine::with_clock(&clock);
    engine.connect_with(|| Ok(FakeGun::new())).unwrap();

    // 100 ms connect flush + 5 ms handshake settle + 100 ms between the two
    // Authenticated frames; an attentive device adds no poll time.
    assert!(clock.total_slept() < Duration::from_millis(300));
}

#[test]
fn double_connect_is_rejected() {
    let mut engine: ProtocolEngine<FakeGun, ManualClock> =
        ProtocolEngine::with_clock(ManualClock::new());
    engine.connect_with(|| Ok(FakeGun::new())).unwrap();

    let err = engine.connect_with(|| Ok(FakeGun::new())).unwrap_err();
    assert!(matches!(err, ProtocolError::AlreadyConnected));
    assert!(engine.is_connected());
}

#[test]
fn session_key_mismatch_fails_authentication() {
    let mut gun = FakeGun::new();
    gun.corrupt_session_key = true;

    let mut engine: ProtocolEngine<FakeGun, ManualClock> =
        ProtocolEngine::with_clock(ManualClock::new());
    let err = engine.connect_with(move || Ok(gun)).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidAuthentication));
    assert!(!engine.is_connected());
    assert_eq!(engine.state(), ConnectionState::Disconnected);
    assert!(engine.link_ref().is_none(), "failed connect closes the port");
}

#[test]
fn handshake_refusal_fails_authentication() {
    let mut gun = FakeGun::new();
    gun.refuse_handshake = true;

    let mut engine: ProtocolEngine<FakeGun, ManualClock> =
        ProtocolEngine::with_clock(ManualClock::new());
    let err = engine.connect_with(move || Ok(gun)).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidAuthentication));
}

#[test]
fn port_open_failure_reports_device_not_responding() {
    let mut engine: ProtocolEngine<FakeGun, ManualClock> =
        ProtocolEngine::with_clock(ManualClock::new());
    let err = engine
        .connect_with(|| Err(std::io::Error::other("no such port")))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::DeviceNotResponding));
    assert_eq!(engine.state(), ConnectionState::Disconnected);
}

#[test]
fn silent_device_hits_the_connect_deadline() {
    // A link that never produces bytes: the 2 s connect deadline fires in
    // virtual time instead of hanging the polled read forever.
    let mut engine: ProtocolEngine<ScriptedLink, ManualClock> =
        ProtocolEngine::with_clock(ManualClock::new());
    let err = engine.connect_with(|| Ok(ScriptedLink::new())).unwrap_err();
    assert!(matches!(err, ProtocolError::DeviceNotResponding));
}

#[test]
fn disconnect_then_reconnect_works() {
    let mut engine: ProtocolEngine<FakeGun, ManualClock> =
        ProtocolEngine::with_clock(ManualClock::new());
    engine.connect_with(|| Ok(FakeGun::new())).unwrap();
    engine.disconnect();
    assert!(!engine.is_connected());

    engine.connect_with(|| Ok(FakeGun::new())).unwrap();
    assert!(engine.is_connected());
}
