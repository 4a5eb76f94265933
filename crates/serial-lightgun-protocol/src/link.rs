//! Serial link abstraction and the serialport-backed implementation.

use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::debug;

/// Byte-level serial transport the protocol engine is written against.
///
/// Implementations must be `Send`; the engine itself serialises access, so
/// `Sync` is not required.
pub trait SerialLink: Send {
    /// Read a single byte, blocking until one arrives.
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Fill `buf` completely.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Read up to and including a newline; the returned string has the
    /// line terminator trimmed.
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        loop {
            let byte = self.read_byte()?;
            if byte == b'\n' {
                break;
            }
            line.push(byte);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Read and discard everything currently buffered, returning it.
    fn drain(&mut self) -> io::Result<Vec<u8>> {
        let available = self.bytes_available()?;
        let mut buf = vec![0u8; available];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Number of bytes ready to read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Write all bytes.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Baud rate the device runs at.
pub const BAUD_RATE: u32 = 115_200;

/// A [`SerialLink`] over a real serial port: 115200 8N1 with both RTS and
/// DTR asserted, as the firmware requires before it will talk.
pub struct SerialPortLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialPortLink {
    /// Open and configure the port at `path`.
    pub fn open(path: &str) -> io::Result<Self> {
        let mut port = serialport::new(path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(500))
            .open()
            .map_err(io::Error::other)?;
        port.write_request_to_send(true).map_err(io::Error::other)?;
        port.write_data_terminal_ready(true)
            .map_err(io::Error::other)?;
        debug!(path, "serial port opened");
        Ok(Self { port })
    }
}

impl SerialLink for SerialPortLink {
    fn read_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        Read::read_exact(&mut self.port, &mut byte)?;
        Ok(byte[0])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        Read::read_exact(&mut self.port, buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::other)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, bytes)?;
        self.port.flush()
    }
}
