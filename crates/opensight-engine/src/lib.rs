//! Session orchestration for the OpenSight driver.
//!
//! A [`Session`] owns the protocol engine (and with it the device info,
//! button map, and session keys), the frame processor, and the video
//! settings. The external driver loop owns the camera; it hands each frame
//! to [`Session::handle_frame`], which runs the vision pipeline, transmits
//! the aim point over the protocol engine, and services any calibration
//! push the device has requested.
//!
//! The session is single-threaded: the protocol engine blocks for the
//! duration of each exchange, and callers running a camera loop next to a
//! UI must serialise access themselves.

#![deny(static_mut_refs)]

use std::io;

use opensight_vision::{
    AimPoint, AimTransport, FrameProcessor, FrameView, VideoSettings, VisionError,
};
use serial_lightgun_protocol::{
    Clock, ProtocolEngine, ProtocolError, SerialLink, SystemClock,
};
use tracing::debug;

/// Errors surfaced by the session layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Vision(#[from] VisionError),
}

/// A connected light-gun session.
pub struct Session<L: SerialLink, C: Clock = SystemClock> {
    protocol: ProtocolEngine<L, C>,
    processor: FrameProcessor,
    settings: VideoSettings,
}

impl<L: SerialLink> Session<L, SystemClock> {
    pub fn new(settings: VideoSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl<L: SerialLink, C: Clock> Session<L, C> {
    pub fn with_clock(settings: VideoSettings, clock: C) -> Self {
        Self {
            protocol: ProtocolEngine::with_clock(clock),
            processor: FrameProcessor::new(),
            settings,
        }
    }

    pub fn protocol(&self) -> &ProtocolEngine<L, C> {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut ProtocolEngine<L, C> {
        &mut self.protocol
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut VideoSettings {
        &mut self.settings
    }

    /// Connect, learn the device's firmware and stored calibration, then
    /// run the start procedure.
    pub fn connect_and_start(
        &mut self,
        open: impl FnOnce() -> io::Result<L>,
    ) -> Result<(), ProtocolError> {
        self.protocol.connect_with(open)?;
        self.protocol.request_firmware()?;
        self.protocol.request_calibration_x()?;
        self.protocol.request_calibration_y()?;
        self.protocol.start()?;
        Ok(())
    }

    /// Process one camera frame: compute the aim point, ship it to the
    /// device, and service a pending calibration push.
    pub fn handle_frame(
        &mut self,
        frame: &FrameView<'_>,
    ) -> Result<Option<AimPoint>, SessionError> {
        let info = self.protocol.device_info();
        let calibration = (info.calibration_x, info.calibration_y);

        let aim = {
            let mut transport = ProtocolTransport {
                protocol: &mut self.protocol,
            };
            self.processor
                .process(frame, &self.settings, calibration, &mut transport)?
        };

        if self.protocol.device_info().requires_calibration_push {
            let (x, y) = self.processor.inferred_calibration();
            debug!(x, y, "servicing device calibration push");
            self.protocol.push_calibration(x, y)?;
        }

        Ok(aim)
    }
}

/// Adapter giving the frame processor a cursor-offset path into the
/// protocol engine without a back-reference cycle.
struct ProtocolTransport<'a, L: SerialLink, C: Clock> {
    protocol: &'a mut ProtocolEngine<L, C>,
}

impl<L: SerialLink, C: Clock> AimTransport for ProtocolTransport<'_, L, C> {
    fn send_aim(
        &mut self,
        x: i16,
        y: i16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.protocol
            .send_cursor_offset(x, y)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}
