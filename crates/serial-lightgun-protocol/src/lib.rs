//! Serial light-gun protocol: framed request codec, authenticated connect
//! handshake, and the blocking half-duplex protocol engine.
//!
//! The device speaks a 7-byte framed request protocol at 115200 baud with
//! loose timing; every operation writes, sleeps a prescribed interval, polls
//! and reads. All I/O goes through the [`SerialLink`] trait so the engine can
//! be exercised against a scripted device, and all sleeping goes through
//! [`Clock`] so tests run without wall-clock delays.

#![deny(static_mut_refs)]

pub mod auth;
pub mod buttons;
pub mod device;
pub mod engine;
pub mod frame;
pub mod link;
pub mod timing;

pub use auth::{HANDSHAKE_KEY, PRIVATE_KEY, SessionKeys, handshake_digest, session_key_for};
pub use buttons::{Button, ButtonMap, KeyCode};
pub use device::{
    CAMERA_NAME_LEN, DeviceInfo, FirmwareVersion, decode_calibration, encode_calibration,
};
pub use engine::{ConnectionState, ProtocolEngine, RecoilEventFlags, RecoilStyle};
pub use frame::{FRAME_HEAD, FRAME_TAIL, Opcode, REQUEST_LEN, Request};
pub use link::{SerialLink, SerialPortLink};
pub use timing::{Clock, SystemClock};

/// Protocol-level errors.
///
/// A successful connect is simply `Ok(())`; the variants cover the failure
/// modes the device contract distinguishes plus local misuse.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Connect was called on an already-authenticated session.
    #[error("already connected")]
    AlreadyConnected,

    /// The serial port could not be opened, or the device missed the
    /// connect deadline.
    #[error("device is not responding")]
    DeviceNotResponding,

    /// Session-key mismatch or handshake acknowledgement other than `true`.
    #[error("device failed mutual authentication")]
    InvalidAuthentication,

    /// An operation that needs an open link was called while disconnected.
    #[error("not connected")]
    NotConnected,

    /// Debug payloads are limited to the frame's four payload bytes.
    #[error("payload of {0} bytes exceeds the 4-byte frame capacity")]
    PayloadTooLarge(usize),

    /// Camera names are at most 15 ASCII characters on the wire.
    #[error("camera name must be at most 15 ASCII characters")]
    InvalidCameraName,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
