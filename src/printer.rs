use std::io::{self, BufRead, BufReader, Read};

use log::{info, warn};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::{SerialConfig, constants};
use crate::error::WatchError;

/// A stream of newline-terminated text coming from the printer.
///
/// The completion watcher reads through this trait so the same loop can be
/// driven by a real serial port or by an in-memory stream in tests.
pub trait LineSource {
    /// Append bytes up to and including the next `\n` to `buf`, stopping early
    /// once `buf` holds [`constants::MAX_LINE_BYTES`].
    ///
    /// Returns the number of bytes appended. `Ok(0)` with an empty `buf` means
    /// the stream has ended.
    /// A `TimedOut` or `WouldBlock` error means no complete line arrived within
    /// the poll interval; any bytes read before the timeout are already in `buf`.
    fn read_line_into(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;

    /// Drop input that has been received but not read yet.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl<R: Read> LineSource for BufReader<R> {
    fn read_line_into(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        // Capped so a stream without newlines still hands control back.
        let room = constants::MAX_LINE_BYTES.saturating_sub(buf.len()) as u64;
        self.by_ref().take(room).read_until(b'\n', buf)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        let buffered = self.buffer().len();
        self.consume(buffered);
        Ok(())
    }
}

/// Serial connection to the printer's USB port.
///
/// Reads block for at most [`constants::SERIAL_POLL_INTERVAL`] so the caller
/// can check its deadline and cancel token between reads.
pub struct SerialLine {
    reader: BufReader<Box<dyn SerialPort>>,
    port_name: String,
}

impl SerialLine {
    /// Open the serial port described by `config` (8N1, no flow control).
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Open`] if the device does not exist, is busy, or
    /// rejects the requested baud rate.
    pub fn open(config: &SerialConfig) -> Result<Self, WatchError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(constants::SERIAL_POLL_INTERVAL)
            .open()
            .map_err(|e| {
                let available = available_ports();
                if available.is_empty() {
                    warn!("No serial ports detected on this machine");
                } else {
                    warn!("Available serial ports: {}", available.join(", "));
                }
                WatchError::Open {
                    port: config.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        info!(
            "Connected to {} at {} baud",
            config.port, config.baud_rate
        );

        Ok(Self {
            reader: BufReader::new(port),
            port_name: config.port.clone(),
        })
    }

    /// Name of the underlying device.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl LineSource for SerialLine {
    fn read_line_into(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        LineSource::read_line_into(&mut self.reader, buf)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        // Both our read buffer and the driver's receive queue hold stale bytes.
        LineSource::discard_input(&mut self.reader)?;
        self.reader.get_ref().clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Names of the serial ports currently visible to the OS.
pub fn available_ports() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn buffered_reader_yields_one_line_per_call() {
        let mut source = BufReader::new(Cursor::new(b"ok T:200\r\nok T:201\n".to_vec()));
        let mut buf = Vec::new();

        let n = source.read_line_into(&mut buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(buf, b"ok T:200\r\n");
    }

    #[test]
    fn reads_stop_at_the_line_length_cap() {
        let noise = vec![b'x'; constants::MAX_LINE_BYTES * 3];
        let mut source = BufReader::new(Cursor::new(noise));
        let mut buf = Vec::new();

        assert_eq!(
            source.read_line_into(&mut buf).unwrap(),
            constants::MAX_LINE_BYTES
        );
        // A full buffer makes no further progress.
        assert_eq!(source.read_line_into(&mut buf).unwrap(), 0);
        assert_eq!(buf.len(), constants::MAX_LINE_BYTES);
    }

    #[test]
    fn discard_input_drops_buffered_bytes() {
        let mut source = BufReader::new(Cursor::new(b"first\nstale\nstale\n".to_vec()));
        let mut buf = Vec::new();
        source.read_line_into(&mut buf).unwrap();

        source.discard_input().unwrap();
        buf.clear();
        assert_eq!(source.read_line_into(&mut buf).unwrap(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn opening_a_missing_port_reports_the_port_name() {
        let config = SerialConfig {
            port: "/dev/does-not-exist-print-complete".to_string(),
            baud_rate: 115200,
            marker: "M31".to_string(),
            timeout: None,
        };
        match SerialLine::open(&config) {
            Err(WatchError::Open { port, .. }) => assert_eq!(port, config.port),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a port that should not exist"),
        }
    }
}
