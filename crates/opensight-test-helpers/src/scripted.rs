//! A serial link fed from a canned response queue.

use std::collections::VecDeque;
use std::io;

use serial_lightgun_protocol::SerialLink;

/// Serial link whose inbound bytes come from pre-loaded script chunks and
/// whose outbound bytes are recorded for assertions.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the "device" will have ready to read.
    pub fn push_response(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Everything the host has transmitted so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl SerialLink for ScriptedLink {
    fn read_byte(&mut self) -> io::Result<u8> {
        self.inbound
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
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
        Ok(())
    }
}
