//! A firmware-faithful light-gun simulator.
//!
//! Speaks the device side of the connect sequence so engine tests can run
//! the real handshake end to end: it answers the host's nonce with the
//! derived session key, issues a handshake challenge, verifies the host's
//! digest, and acknowledges with the literal `true`.

use std::collections::VecDeque;
use std::io;

use serial_lightgun_protocol::{
    FRAME_HEAD, FRAME_TAIL, Opcode, REQUEST_LEN, SerialLink, handshake_digest, session_key_for,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GunState {
    /// Expecting framed requests.
    Frames,
    /// A Connect frame arrived; the next 32 bytes are the host nonce.
    AwaitNonce,
    /// A challenge went out; the next 32 bytes are the host digest.
    AwaitDigest,
}

/// Scripted device side of the serial link.
pub struct FakeGun {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    pending: Vec<u8>,
    state: GunState,
    challenge: [u8; 32],
    /// Answer the nonce with a corrupted session key.
    pub corrupt_session_key: bool,
    /// Acknowledge the handshake digest with something other than `true`.
    pub refuse_handshake: bool,
    /// Status reports to emit, one queue entry per cursor-offset frame.
    pub cursor_status: VecDeque<Vec<u8>>,
    /// Big-endian firmware revision served on `RequestFirmware`.
    pub firmware: [u8; 2],
    /// Space-padded camera name served on `RequestCamera`.
    pub camera_name: [u8; 15],
    /// ASCII colour record served on `RequestColour`.
    pub colour: Vec<u8>,
    /// Raw date bytes served on `RequestManufactureDate`.
    pub manufacture_date: Vec<u8>,
    /// Raw wire calibration served on the calibration queries.
    pub calibration_x: u16,
    pub calibration_y: u16,
    frames: Vec<[u8; REQUEST_LEN]>,
    digest_verified: bool,
}

impl Default for FakeGun {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGun {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            written: Vec::new(),
            pending: Vec::new(),
            state: GunState::Frames,
            challenge: [0xC7; 32],
            corrupt_session_key: false,
            refuse_handshake: false,
            cursor_status: VecDeque::new(),
            firmware: [0x01, 0x06],
            camera_name: *b"PS3 Eye Camera ",
            colour: b"Crimson".to_vec(),
            manufacture_date: vec![23, 7, 14],
            calibration_x: 10_000,
            calibration_y: 10_000,
            frames: Vec::new(),
            digest_verified: false,
        }
    }

    /// Every frame the host has sent, in order.
    pub fn frames(&self) -> &[[u8; REQUEST_LEN]] {
        &self.frames
    }

    /// Opcodes of every frame the host has sent, in order.
    pub fn opcodes(&self) -> Vec<u8> {
        self.frames.iter().map(|f| f[1]).collect()
    }

    /// Raw outbound byte stream, frames and key material interleaved.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Whether the host's handshake digest verified against the challenge.
    pub fn digest_verified(&self) -> bool {
        self.digest_verified
    }

    /// Queue response bytes for the host to read.
    pub fn push_response(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Consume host bytes according to the device state machine.
    fn pump(&mut self) {
        loop {
            match self.state {
                GunState::Frames => {
                    if self.pending.len() < REQUEST_LEN {
                        return;
                    }
                    let mut frame = [0u8; REQUEST_LEN];
                    frame.copy_from_slice(&self.pending[..REQUEST_LEN]);
                    self.pending.drain(..REQUEST_LEN);
                    assert_eq!(frame[0], FRAME_HEAD, "frame head missing: {frame:?}");
                    assert_eq!(frame[6], FRAME_TAIL, "frame tail missing: {frame:?}");
                    self.frames.push(frame);
                    self.on_frame(frame);
                }
                GunState::AwaitNonce => {
                    if self.pending.len() < 32 {
                        return;
                    }
                    let mut nonce = [0u8; 32];
                    nonce.copy_from_slice(&self.pending[..32]);
                    self.pending.drain(..32);
                    let mut key = session_key_for(&nonce);
                    if self.corrupt_session_key {
                        key[0] ^= 0xFF;
                    }
                    self.inbound.extend(key);
                    self.state = GunState::Frames;
                }
                GunState::AwaitDigest => {
                    if self.pending.len() < 32 {
                        return;
                    }
                    let mut digest = [0u8; 32];
                    digest.copy_from_slice(&self.pending[..32]);
                    self.pending.drain(..32);
                    self.digest_verified = digest == handshake_digest(&self.challenge);
                    let ack: &[u8] = if self.digest_verified && !self.refuse_handshake {
                        b"true\n"
                    } else {
                        b"false\n"
                    };
                    self.inbound.extend(ack);
                    self.state = GunState::Frames;
                }
            }
        }
    }

    fn on_frame(&mut self, frame: [u8; REQUEST_LEN]) {
        match Opcode::from_u8(frame[1]) {
            Some(Opcode::Connect) => self.state = GunState::AwaitNonce,
            Some(Opcode::Handshake) => {
                self.inbound.extend(self.challenge);
                self.state = GunState::AwaitDigest;
            }
            Some(Opcode::CursorOffset) => {
                if let Some(report) = self.cursor_status.pop_front() {
                    self.inbound.extend(report);
                }
            }
            Some(Opcode::RequestFirmware) => self.inbound.extend(self.firmware),
            Some(Opcode::RequestCamera) => self.inbound.extend(self.camera_name),
            Some(Opcode::RequestColour) => self.inbound.extend(self.colour.clone()),
            Some(Opcode::RequestManufactureDate) => {
                self.inbound.extend(self.manufacture_date.clone());
            }
            Some(Opcode::RequestCalibrationX) => {
                self.inbound.extend(self.calibration_x.to_be_bytes());
            }
            Some(Opcode::RequestCalibrationY) => {
                self.inbound.extend(self.calibration_y.to_be_bytes());
            }
            _ => {}
        }
    }
}

impl SerialLink for FakeGun {
    fn read_byte(&mut self) -> io::Result<u8> {
        self.inbound
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "device had no bytes"))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        for slot in buf.iter_mut() {
            *slot = self.read_byte()?;
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.inbound.len())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        self.pending.extend_from_slice(bytes);
        self.pump();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_frame_switches_to_nonce_mode() {
        let mut gun = FakeGun::new();
        gun.write_all(&[FRAME_HEAD, 110, 0, 0, 0, 0, FRAME_TAIL])
            .unwrap();
        assert_eq!(gun.frames().len(), 1);

        // 32 nonce bytes produce a 32-byte session key answer.
        gun.write_all(&[0x11; 32]).unwrap();
        assert_eq!(gun.bytes_available().unwrap(), 32);
        let expected = session_key_for(&[0x11; 32]);
        let mut got = [0u8; 32];
        gun.read_exact(&mut got).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_handshake_challenge_and_ack() {
        let mut gun = FakeGun::new();
        gun.write_all(&[FRAME_HEAD, 109, 0, 0, 0, 0, FRAME_TAIL])
            .unwrap();
        let mut challenge = [0u8; 32];
        gun.read_exact(&mut challenge).unwrap();

        gun.write_all(&handshake_digest(&challenge)).unwrap();
        let ack = gun.read_line().unwrap();
        assert_eq!(ack, "true");
        assert!(gun.digest_verified());
    }

    #[test]
    fn test_bad_digest_is_refused() {
        let mut gun = FakeGun::new();
        gun.write_all(&[FRAME_HEAD, 109, 0, 0, 0, 0, FRAME_TAIL])
            .unwrap();
        let mut challenge = [0u8; 32];
        gun.read_exact(&mut challenge).unwrap();

        gun.write_all(&[0u8; 32]).unwrap();
        assert_eq!(gun.read_line().unwrap(), "false");
        assert!(!gun.digest_verified());
    }
}
