//! Device identity, firmware versions, and the calibration codec.

use std::time::Instant;

/// Firmware version as reported on the wire: a big-endian u16 with the
/// major revision in the high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion(pub u16);

impl FirmwareVersion {
    pub const V1_5: FirmwareVersion = FirmwareVersion(0x0105);
    pub const V1_6: FirmwareVersion = FirmwareVersion(0x0106);

    pub fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    pub fn major(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn minor(self) -> u8 {
        self.0 as u8
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// Linked camera names occupy 15 ASCII bytes on the wire, space-padded.
pub const CAMERA_NAME_LEN: usize = 15;

/// Everything the host learns about a connected gun.
///
/// Created at session start; mutated only by the protocol engine, plus the
/// calibration pair which the session pushes back from the frame processor
/// when the device asks for it.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub firmware: Option<FirmwareVersion>,
    pub unique_id: String,
    pub colour: String,
    pub manufacture_date: String,
    /// Name of the camera linked to this gun, trimmed of wire padding.
    pub camera: String,
    /// Stored calibration offsets in percent, decoded from the wire.
    pub calibration_x: f64,
    pub calibration_y: f64,
    /// Set when the device asks for a calibration push via the cursor
    /// status channel; cleared once the push happens.
    pub requires_calibration_push: bool,
    /// Timestamp of the last button push observed on the status channel.
    pub last_button_push: Option<Instant>,
}

/// Encode a calibration percentage for the wire:
/// `floor(v * 100 + 10000)` as big-endian u16.
pub fn encode_calibration(value: f64) -> [u8; 2] {
    ((value * 100.0 + 10000.0).floor() as u16).to_be_bytes()
}

/// Decode a wire calibration value: `(raw - 10000) / 100`.
pub fn decode_calibration(raw: u16) -> f64 {
    (raw as f64 - 10000.0) / 100.0
}
