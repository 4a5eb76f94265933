//! The blocking half-duplex protocol engine.
//!
//! Every operation writes a frame, pauses for the interval the firmware
//! expects, then polls and reads. The engine is strictly single-threaded;
//! callers serialise access to it (and thereby to the serial port). There is
//! no internal locking and no background thread.

use std::io;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::ProtocolError;
use crate::auth::{SessionKeys, handshake_digest};
use crate::buttons::{Button, ButtonMap, KeyCode};
use crate::device::{
    CAMERA_NAME_LEN, DeviceInfo, FirmwareVersion, decode_calibration, encode_calibration,
};
use crate::frame::{Opcode, Request, encode_raw};
use crate::link::SerialLink;
use crate::timing::{
    AUTHENTICATED_REPEAT_GAP_MS, CONNECT_DEADLINE_MS, CONNECT_FLUSH_MS, Clock,
    DEBUG_RESPONSE_WAIT_MS, HANDSHAKE_SETTLE_MS, POLL_STEP_MS, QUERY_RESPONSE_WAIT_MS,
    START_DRAIN_MS, SystemClock,
};

/// Asynchronous status bytes the device may emit after a cursor write.
mod status {
    /// Drop the trigger and pump-action mappings locally.
    pub const UNASSIGN_PRIMARY: u8 = 200;
    /// The device wants a calibration push; also resync primary buttons.
    pub const CALIBRATION_PUSH: u8 = 201;
    /// Resync the trigger and pump-action mappings.
    pub const RESYNC_PRIMARY: u8 = 202;
    /// Button activity report; layout depends on the firmware revision.
    pub const BUTTON_EVENT: u8 = 254;
}

/// Connect sequence progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Opening,
    AwaitingDeviceKey,
    AwaitingHandshakeAck,
    Authenticated,
}

/// Recoil solenoid drive style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RecoilStyle {
    Normal,
    Pulsed,
}

/// Which inputs fire the recoil solenoids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RecoilEventFlags {
    pub on_trigger: bool,
    pub on_pump_action: bool,
    pub on_front_buttons: bool,
    pub on_rear_buttons: bool,
}

/// Protocol engine over a serial link.
///
/// Owns the session: device info, button map, and per-connection keys. The
/// clock is injectable so the full connect sequence runs in tests without
/// wall-clock sleeps.
pub struct ProtocolEngine<L: SerialLink, C: Clock = SystemClock> {
    link: Option<L>,
    clock: C,
    state: ConnectionState,
    keys: Option<SessionKeys>,
    device: DeviceInfo,
    buttons: ButtonMap,
}

impl<L: SerialLink> ProtocolEngine<L, SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<L: SerialLink> Default for ProtocolEngine<L, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: SerialLink, C: Clock> ProtocolEngine<L, C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            link: None,
            clock,
            state: ConnectionState::Disconnected,
            keys: None,
            device: DeviceInfo::default(),
            buttons: ButtonMap::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Authenticated && self.link.is_some()
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn buttons(&self) -> &ButtonMap {
        &self.buttons
    }

    /// Borrow the underlying link, e.g. to inspect a test double.
    pub fn link_ref(&self) -> Option<&L> {
        self.link.as_ref()
    }

    /// Mutably borrow the underlying link.
    pub fn link_mut(&mut self) -> Option<&mut L> {
        self.link.as_mut()
    }

    fn link(&mut self) -> Result<&mut L, ProtocolError> {
        self.link.as_mut().ok_or(ProtocolError::NotConnected)
    }

    fn send(&mut self, request: Request) -> Result<(), ProtocolError> {
        let bytes = request.encode();
        trace!(opcode = ?request.opcode(), "tx frame");
        self.link()?.write_all(&bytes)?;
        Ok(())
    }

    /// Sleep, then read and return whatever the device has pending.
    fn flush_after(&mut self, millis: u64) -> Result<Vec<u8>, ProtocolError> {
        self.clock.sleep_ms(millis);
        Ok(self.link()?.drain()?)
    }

    /// Block in 10 ms steps until `count` bytes are available. The deadline
    /// is only armed during the connect sequence.
    fn poll(
        &mut self,
        count: usize,
        deadline: Option<std::time::Instant>,
    ) -> Result<(), ProtocolError> {
        loop {
            if self.link()?.bytes_available()? >= count {
                return Ok(());
            }
            if let Some(deadline) = deadline
                && self.clock.now() >= deadline
            {
                warn!(count, "device missed the connect deadline");
                return Err(ProtocolError::DeviceNotResponding);
            }
            self.clock.sleep_ms(POLL_STEP_MS);
        }
    }

    /// Run the mutually-authenticated connect sequence.
    ///
    /// `open` produces the serial link; open failures surface as
    /// [`ProtocolError::DeviceNotResponding`]. A second connect on a live
    /// session is a no-op error, [`ProtocolError::AlreadyConnected`].
    pub fn connect_with(
        &mut self,
        open: impl FnOnce() -> io::Result<L>,
    ) -> Result<(), ProtocolError> {
        if self.is_connected() {
            return Err(ProtocolError::AlreadyConnected);
        }

        self.state = ConnectionState::Opening;
        let link = match open() {
            Ok(link) => link,
            Err(error) => {
                warn!(%error, "serial port open failed");
                self.state = ConnectionState::Disconnected;
                return Err(ProtocolError::DeviceNotResponding);
            }
        };
        self.link = Some(link);

        match self.run_connect_sequence() {
            Ok(()) => {
                self.state = ConnectionState::Authenticated;
                info!("device authenticated");
                Ok(())
            }
            Err(error) => {
                self.link = None;
                self.keys = None;
                self.state = ConnectionState::Disconnected;
                Err(error)
            }
        }
    }

    fn run_connect_sequence(&mut self) -> Result<(), ProtocolError> {
        let deadline = self.clock.now() + Duration::from_millis(CONNECT_DEADLINE_MS);

        self.send(Request::new(Opcode::Connect))?;
        self.flush_after(CONNECT_FLUSH_MS)?;

        // Session key exchange: we send a fresh nonce, the device answers
        // with SHA-256(nonce || private key), which we recompute locally.
        let keys = SessionKeys::generate();
        let public_key = *keys.public_key();
        self.link()?.write_all(&public_key)?;
        self.state = ConnectionState::AwaitingDeviceKey;

        self.poll(32, Some(deadline))?;
        let mut device_key = [0u8; 32];
        self.link()?.read_exact(&mut device_key)?;
        if !keys.matches(&device_key) {
            warn!("device session key mismatch");
            return Err(ProtocolError::InvalidAuthentication);
        }
        debug!("session key verified");

        // Challenge/response: prove we hold the handshake key.
        self.send(Request::new(Opcode::Handshake))?;
        self.clock.sleep_ms(HANDSHAKE_SETTLE_MS);
        self.poll(32, Some(deadline))?;
        let mut challenge = [0u8; 32];
        self.link()?.read_exact(&mut challenge)?;
        let digest = handshake_digest(&challenge);
        self.link()?.write_all(&digest)?;
        self.state = ConnectionState::AwaitingHandshakeAck;

        self.poll(5, Some(deadline))?;
        let ack = self.link()?.read_line()?;
        if ack != "true" {
            warn!(%ack, "handshake not acknowledged");
            return Err(ProtocolError::InvalidAuthentication);
        }

        self.send(Request::new(Opcode::Authenticated))?;
        self.clock.sleep_ms(AUTHENTICATED_REPEAT_GAP_MS);
        self.send(Request::new(Opcode::Authenticated))?;

        self.keys = Some(keys);
        Ok(())
    }

    /// Close the port and drop the session keys.
    pub fn disconnect(&mut self) {
        if self.link.take().is_some() {
            info!("disconnected");
        }
        self.keys = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Post-connect start procedure: wake the device, arm reload and
    /// calibration handling, sync every button, and enable recoil.
    pub fn start(&mut self) -> Result<(), ProtocolError> {
        self.set_sleep_mode(true)?;
        self.set_edge_click_reload(true)?;
        self.set_calibration_enabled(true)?;
        self.resync_all_buttons()?;
        self.set_recoil_enabled(true)?;
        self.flush_after(START_DRAIN_MS)?;
        debug!("start procedure complete");
        Ok(())
    }

    pub fn set_sleep_mode(&mut self, enabled: bool) -> Result<(), ProtocolError> {
        self.send(Request::new(if enabled {
            Opcode::EnableSleepMode
        } else {
            Opcode::DisableSleepMode
        }))
    }

    pub fn set_edge_reload(&mut self, enabled: bool) -> Result<(), ProtocolError> {
        self.send(Request::new(if enabled {
            Opcode::EnableEdgeReload
        } else {
            Opcode::DisableEdgeReload
        }))
    }

    pub fn set_edge_click_reload(&mut self, enabled: bool) -> Result<(), ProtocolError> {
        self.send(Request::new(if enabled {
            Opcode::EnableEdgeClickReload
        } else {
            Opcode::DisableEdgeClickReload
        }))
    }

    pub fn set_calibration_enabled(&mut self, enabled: bool) -> Result<(), ProtocolError> {
        self.send(Request::with_payload(
            Opcode::EnableCalibration,
            [enabled as u8, 0, 0, 0],
        ))
    }

    /// Assign a key to a button, locally and on the device.
    pub fn assign_button(&mut self, button: Button, key: KeyCode) -> Result<(), ProtocolError> {
        self.buttons.assign(button, key);
        self.send_button_assignment(button, key)
    }

    fn send_button_assignment(&mut self, button: Button, key: KeyCode) -> Result<(), ProtocolError> {
        self.send(Request::with_payload(
            Opcode::AssignButton,
            [0, button.wire_id(), 0, key.wire_id()],
        ))
    }

    /// Replay the entire local button map to the device.
    pub fn resync_all_buttons(&mut self) -> Result<(), ProtocolError> {
        let assignments: Vec<(Button, KeyCode)> = self.buttons.iter().collect();
        for (button, key) in assignments {
            self.send_button_assignment(button, key)?;
        }
        Ok(())
    }

    /// Replay only the trigger and pump-action mappings.
    fn resync_primary_buttons(&mut self) -> Result<(), ProtocolError> {
        for button in [Button::Trigger, Button::PumpAction] {
            let key = self.buttons.get(button);
            self.send_button_assignment(button, key)?;
        }
        Ok(())
    }

    /// Transmit a cursor offset and service the device's optional status
    /// byte. The write and the status read are one atomic exchange from the
    /// caller's perspective.
    pub fn send_cursor_offset(&mut self, x: i16, y: i16) -> Result<(), ProtocolError> {
        let xb = x.to_be_bytes();
        let yb = y.to_be_bytes();
        let payload = [xb[0], xb[1], yb[0], yb[1]];
        self.send(Request::with_payload(Opcode::CursorOffset, payload))?;

        // Firmware at or below 1.5 expects a sleep-mode echo carrying the
        // same payload after every cursor write.
        if self
            .device
            .firmware
            .is_some_and(|fw| fw <= FirmwareVersion::V1_5)
        {
            self.send(Request::with_payload(Opcode::EnableSleepMode, payload))?;
        }

        self.handle_cursor_status()
    }

    fn handle_cursor_status(&mut self) -> Result<(), ProtocolError> {
        if self.link()?.bytes_available()? == 0 {
            return Ok(());
        }
        let byte = self.link()?.read_byte()?;
        match byte {
            status::UNASSIGN_PRIMARY => {
                debug!("device cleared primary button mappings");
                self.buttons.unassign(Button::Trigger);
                self.buttons.unassign(Button::PumpAction);
            }
            status::CALIBRATION_PUSH => {
                debug!("device requested a calibration push");
                self.device.requires_calibration_push = true;
                self.resync_primary_buttons()?;
            }
            status::RESYNC_PRIMARY => {
                self.resync_primary_buttons()?;
            }
            status::BUTTON_EVENT => {
                self.handle_button_event()?;
            }
            other => {
                // The device contract is loose; unknown bytes are noise.
                trace!(other, "ignoring unexpected status byte");
            }
        }
        Ok(())
    }

    fn handle_button_event(&mut self) -> Result<(), ProtocolError> {
        let Some(firmware) = self.device.firmware else {
            return Ok(());
        };
        if firmware > FirmwareVersion::V1_5 {
            if self.link()?.bytes_available()? >= 3 {
                let mut report = [0u8; 3];
                self.link()?.read_exact(&mut report)?;
                self.device.last_button_push = Some(self.clock.now());
            }
        } else if firmware < FirmwareVersion::V1_6
            && self.link()?.bytes_available()? >= 11
        {
            let mut report = [0u8; 10];
            self.link()?.read_exact(&mut report)?;
            let mut trailing = [0u8; 1];
            self.link()?.read_exact(&mut trailing)?;
            if report.iter().any(|b| *b != 0) {
                self.device.last_button_push = Some(self.clock.now());
            }
        }
        Ok(())
    }

    /// Query the firmware revision (2-byte big-endian response).
    pub fn request_firmware(&mut self) -> Result<FirmwareVersion, ProtocolError> {
        self.send(Request::new(Opcode::RequestFirmware))?;
        self.poll(2, None)?;
        let mut raw = [0u8; 2];
        self.link()?.read_exact(&mut raw)?;
        let firmware = FirmwareVersion::from_be_bytes(raw);
        info!(%firmware, "device firmware");
        self.device.firmware = Some(firmware);
        Ok(firmware)
    }

    /// Query the linked camera name (15 space-padded ASCII bytes).
    pub fn request_camera(&mut self) -> Result<String, ProtocolError> {
        self.send(Request::new(Opcode::RequestCamera))?;
        self.poll(CAMERA_NAME_LEN, None)?;
        let mut raw = [0u8; CAMERA_NAME_LEN];
        self.link()?.read_exact(&mut raw)?;
        let name = String::from_utf8_lossy(&raw).trim_end().to_string();
        self.device.camera = name.clone();
        Ok(name)
    }

    /// Write a new linked camera name, one character per frame.
    pub fn update_camera(&mut self, name: &str) -> Result<(), ProtocolError> {
        if name.len() > CAMERA_NAME_LEN || !name.is_ascii() {
            return Err(ProtocolError::InvalidCameraName);
        }
        let mut padded = [b' '; CAMERA_NAME_LEN];
        padded[..name.len()].copy_from_slice(name.as_bytes());
        for (index, ch) in padded.into_iter().enumerate() {
            self.send(Request::with_payload(
                Opcode::UpdateCamera,
                [0, index as u8, 0, ch],
            ))?;
        }
        self.device.camera = name.to_string();
        Ok(())
    }

    /// Query the shell colour / variation string.
    pub fn request_colour(&mut self) -> Result<String, ProtocolError> {
        self.send(Request::new(Opcode::RequestColour))?;
        let raw = self.flush_after(QUERY_RESPONSE_WAIT_MS)?;
        let colour = String::from_utf8_lossy(&raw).trim().to_string();
        self.device.colour = colour.clone();
        Ok(colour)
    }

    /// Query the unit's unique id.
    ///
    /// The firmware answers the identity record on the colour opcode;
    /// worth re-validating against future firmware captures.
    pub fn request_unique_id(&mut self) -> Result<String, ProtocolError> {
        self.send(Request::new(Opcode::RequestColour))?;
        let raw = self.flush_after(QUERY_RESPONSE_WAIT_MS)?;
        let id = String::from_utf8_lossy(&raw).trim().to_string();
        self.device.unique_id = id.clone();
        Ok(id)
    }

    /// Query the manufacture date: a stream of bytes, each rendered as a
    /// two-digit decimal and concatenated.
    pub fn request_manufacture_date(&mut self) -> Result<String, ProtocolError> {
        self.send(Request::new(Opcode::RequestManufactureDate))?;
        let raw = self.flush_after(QUERY_RESPONSE_WAIT_MS)?;
        let date: String = raw.iter().map(|b| format!("{b:02}")).collect();
        self.device.manufacture_date = date.clone();
        Ok(date)
    }

    pub fn request_calibration_x(&mut self) -> Result<f64, ProtocolError> {
        let value = self.request_calibration(Opcode::RequestCalibrationX)?;
        self.device.calibration_x = value;
        Ok(value)
    }

    pub fn request_calibration_y(&mut self) -> Result<f64, ProtocolError> {
        let value = self.request_calibration(Opcode::RequestCalibrationY)?;
        self.device.calibration_y = value;
        Ok(value)
    }

    fn request_calibration(&mut self, opcode: Opcode) -> Result<f64, ProtocolError> {
        self.send(Request::new(opcode))?;
        self.poll(2, None)?;
        let mut raw = [0u8; 2];
        self.link()?.read_exact(&mut raw)?;
        Ok(decode_calibration(u16::from_be_bytes(raw)))
    }

    pub fn update_calibration_x(&mut self, value: f64) -> Result<(), ProtocolError> {
        let encoded = encode_calibration(value);
        self.send(Request::with_payload(
            Opcode::UpdateCalibrationX,
            [encoded[0], encoded[1], 0, 0],
        ))?;
        self.device.calibration_x = value;
        Ok(())
    }

    pub fn update_calibration_y(&mut self, value: f64) -> Result<(), ProtocolError> {
        let encoded = encode_calibration(value);
        self.send(Request::with_payload(
            Opcode::UpdateCalibrationY,
            [encoded[0], encoded[1], 0, 0],
        ))?;
        self.device.calibration_y = value;
        Ok(())
    }

    /// Push both calibration axes and clear the device's pending request.
    pub fn push_calibration(&mut self, x: f64, y: f64) -> Result<(), ProtocolError> {
        self.update_calibration_x(x)?;
        self.update_calibration_y(y)?;
        self.device.requires_calibration_push = false;
        info!(x, y, "calibration pushed");
        Ok(())
    }

    pub fn set_recoil_enabled(&mut self, enabled: bool) -> Result<(), ProtocolError> {
        self.send(Request::with_payload(
            Opcode::EnableRecoil,
            [enabled as u8, 0, 0, 0],
        ))
    }

    /// Configure the recoil pulse: strength, start delay, and inter-pulse
    /// delay, with the strength repeated in the third slot as the firmware
    /// expects.
    pub fn set_recoil_pulse_values(
        &mut self,
        strength: u8,
        start_delay: u8,
        delay: u8,
    ) -> Result<(), ProtocolError> {
        self.send(Request::with_payload(
            Opcode::RecoilPulseValues,
            [strength, start_delay, strength, delay],
        ))
    }

    pub fn set_recoil_style(&mut self, style: RecoilStyle) -> Result<(), ProtocolError> {
        let value = match style {
            RecoilStyle::Normal => 0,
            RecoilStyle::Pulsed => 1,
        };
        self.send(Request::with_payload(Opcode::RecoilStyle, [value, 0, 0, 0]))
    }

    pub fn set_recoil_events(&mut self, flags: RecoilEventFlags) -> Result<(), ProtocolError> {
        self.send(Request::with_payload(
            Opcode::RecoilEvents,
            [
                flags.on_trigger as u8,
                flags.on_pump_action as u8,
                flags.on_front_buttons as u8,
                flags.on_rear_buttons as u8,
            ],
        ))
    }

    pub fn set_recoil_positions(
        &mut self,
        front_left: u8,
        back_left: u8,
        front_right: u8,
        back_right: u8,
    ) -> Result<(), ProtocolError> {
        self.send(Request::with_payload(
            Opcode::RecoilPositions,
            [front_left, back_left, front_right, back_right],
        ))
    }

    pub fn set_recoil_strength(&mut self, voltage: u8) -> Result<(), ProtocolError> {
        self.send(Request::with_payload(
            Opcode::RecoilStrength,
            [voltage, 0, 0, 0],
        ))
    }

    /// Fire a single test pulse.
    pub fn recoil_test(&mut self) -> Result<(), ProtocolError> {
        self.send(Request::new(Opcode::RecoilTest))
    }

    pub fn set_recoil_test_repeat(&mut self, running: bool) -> Result<(), ProtocolError> {
        self.send(Request::new(if running {
            Opcode::RecoilTestRepeatStart
        } else {
            Opcode::RecoilTestRepeatStop
        }))
    }

    pub fn set_pulse_strength(&mut self, strength: u8) -> Result<(), ProtocolError> {
        self.send(Request::with_payload(
            Opcode::PulseStrength,
            [strength, strength, strength, 0],
        ))
    }

    pub fn set_custom_pulse_strength(&mut self, amount: u8) -> Result<(), ProtocolError> {
        self.send(Request::with_payload(
            Opcode::CustomPulseStrength,
            [amount, 0, 0, 0],
        ))
    }

    /// Transmit an arbitrary opcode frame and return the device's response
    /// bytes joined with `-`. Probing tool; not part of normal operation.
    pub fn debug(&mut self, opcode: u8, payload: &[u8]) -> Result<String, ProtocolError> {
        if payload.len() > 4 {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        let mut padded = [0u8; 4];
        padded[..payload.len()].copy_from_slice(payload);
        let frame = encode_raw(opcode, padded);
        self.link()?.write_all(&frame)?;
        let raw = self.flush_after(DEBUG_RESPONSE_WAIT_MS)?;
        Ok(raw
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join("-"))
    }
}
