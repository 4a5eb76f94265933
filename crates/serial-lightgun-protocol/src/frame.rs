//! Request frame layout and opcode table.

/// First byte of every request frame.
pub const FRAME_HEAD: u8 = 0xAA;

/// Last byte of every request frame.
pub const FRAME_TAIL: u8 = 0xBB;

/// Every request is exactly seven bytes:
/// `head, opcode, p0, p1, p2, p3, tail`.
pub const REQUEST_LEN: usize = 7;

/// Request opcodes. Numeric values are part of the wire format.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Cursor offset update; may elicit an asynchronous status byte.
    CursorOffset = 40,
    EnableSleepMode = 50,
    DisableSleepMode = 51,
    EnableEdgeReload = 52,
    DisableEdgeReload = 53,
    EnableEdgeClickReload = 54,
    DisableEdgeClickReload = 55,
    /// Button id in p1, key code in p3.
    AssignButton = 60,
    /// 2-byte big-endian response.
    RequestFirmware = 101,
    /// 15 space-padded ASCII bytes.
    RequestCamera = 102,
    /// One character per frame: index in p1, character in p3.
    UpdateCamera = 103,
    RequestCalibrationX = 104,
    RequestCalibrationY = 105,
    UpdateCalibrationX = 106,
    UpdateCalibrationY = 107,
    Handshake = 109,
    Connect = 110,
    /// Variable-length ASCII response.
    RequestColour = 111,
    RequestManufactureDate = 115,
    /// Sent twice, 100 ms apart, to close the handshake.
    Authenticated = 121,
    EnableRecoil = 161,
    RecoilPulseValues = 162,
    RecoilStyle = 163,
    RecoilEvents = 164,
    RecoilPositions = 165,
    RecoilStrength = 167,
    RecoilTest = 168,
    RecoilTestRepeatStart = 169,
    RecoilTestRepeatStop = 170,
    PulseStrength = 171,
    CustomPulseStrength = 172,
    EnableCalibration = 180,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        let op = match value {
            40 => Self::CursorOffset,
            50 => Self::EnableSleepMode,
            51 => Self::DisableSleepMode,
            52 => Self::EnableEdgeReload,
            53 => Self::DisableEdgeReload,
            54 => Self::EnableEdgeClickReload,
            55 => Self::DisableEdgeClickReload,
            60 => Self::AssignButton,
            101 => Self::RequestFirmware,
            102 => Self::RequestCamera,
            103 => Self::UpdateCamera,
            104 => Self::RequestCalibrationX,
            105 => Self::RequestCalibrationY,
            106 => Self::UpdateCalibrationX,
            107 => Self::UpdateCalibrationY,
            109 => Self::Handshake,
            110 => Self::Connect,
            111 => Self::RequestColour,
            115 => Self::RequestManufactureDate,
            121 => Self::Authenticated,
            161 => Self::EnableRecoil,
            162 => Self::RecoilPulseValues,
            163 => Self::RecoilStyle,
            164 => Self::RecoilEvents,
            165 => Self::RecoilPositions,
            167 => Self::RecoilStrength,
            168 => Self::RecoilTest,
            169 => Self::RecoilTestRepeatStart,
            170 => Self::RecoilTestRepeatStop,
            171 => Self::PulseStrength,
            172 => Self::CustomPulseStrength,
            180 => Self::EnableCalibration,
            _ => return None,
        };
        Some(op)
    }
}

/// A request frame value object: opcode plus four payload bytes, zero
/// unless assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    opcode: Opcode,
    payload: [u8; 4],
}

impl Request {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            payload: [0; 4],
        }
    }

    pub fn with_payload(opcode: Opcode, payload: [u8; 4]) -> Self {
        Self { opcode, payload }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn payload(&self) -> [u8; 4] {
        self.payload
    }

    /// Wire encoding, head and tail always set.
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        encode_raw(self.opcode as u8, self.payload)
    }
}

/// Frame encoding for an arbitrary opcode byte; the debug operation uses
/// this to probe opcodes the table does not name.
pub fn encode_raw(opcode: u8, payload: [u8; 4]) -> [u8; REQUEST_LEN] {
    [
        FRAME_HEAD,
        opcode,
        payload[0],
        payload[1],
        payload[2],
        payload[3],
        FRAME_TAIL,
    ]
}
