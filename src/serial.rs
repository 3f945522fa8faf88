/// Serial link reader for the sensor board.
///
/// The board prints one line per sample period:
///
/// ```text
/// 1:10.5,2:8.3
/// ```
///
/// Each comma-separated field is `<sensor id>:<reading>`. Fields that do
/// not have that shape are skipped so one garbled field never costs the
/// whole frame.

use std::io::{BufRead, BufReader, ErrorKind};
use std::time::Duration;

use crate::config::SerialConfig;
use crate::logging::{self, Component};
use crate::model::{FloodError, SensorFrame};
use crate::poll::StopSignal;

/// How long a single driver read may block before we check for an interrupt
/// and go back to waiting. Not a frame timeout: a silent board blocks forever.
const READ_SLICE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Frame parsing
// ---------------------------------------------------------------------------

/// Parses one `"<id>:<value>,..."` line into a frame.
///
/// Malformed fields are dropped; an empty or fully malformed line yields an
/// empty frame. If an id repeats, the last value wins.
pub fn parse_frame(line: &str) -> SensorFrame {
    line.trim()
        .split(',')
        .filter_map(parse_field)
        .collect()
}

fn parse_field(field: &str) -> Option<(u32, f64)> {
    let mut parts = field.split(':');
    let id = parts.next()?.trim().parse::<u32>().ok()?;
    let value = parts.next()?.trim().parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((id, value))
}

// ---------------------------------------------------------------------------
// Source abstraction
// ---------------------------------------------------------------------------

/// Anything the poll loop can pull sensor frames from.
pub trait FrameSource {
    /// Reads the next frame, blocking until one arrives.
    fn read_frame(&mut self) -> Result<SensorFrame, FloodError>;

    /// Releases the underlying channel. Returns `true` if a channel was open.
    fn close(&mut self) -> bool;
}

// ---------------------------------------------------------------------------
// Serial reader
// ---------------------------------------------------------------------------

/// Owns the serial channel to the sensor board.
pub struct SerialReader {
    port_name: String,
    baud_rate: u32,
    settle: Duration,
    channel: Option<Box<dyn BufRead + Send>>,
    interrupt: Option<StopSignal>,
}

impl SerialReader {
    pub fn new(config: &SerialConfig) -> Self {
        Self {
            port_name: config.port.clone(),
            baud_rate: config.baud_rate,
            settle: Duration::from_millis(config.settle_ms),
            channel: None,
            interrupt: None,
        }
    }

    /// Lets a pending read give up once `signal` is triggered.
    pub fn with_interrupt(mut self, signal: StopSignal) -> Self {
        self.interrupt = Some(signal);
        self
    }

    /// Wraps an already-open byte stream, e.g. a recorded capture.
    pub fn from_channel(name: &str, channel: impl BufRead + Send + 'static) -> Self {
        Self {
            port_name: name.to_string(),
            baud_rate: 0,
            settle: Duration::ZERO,
            channel: Some(Box::new(channel)),
            interrupt: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Opens the port and waits for the board to come out of reset.
    pub fn connect(&mut self) -> Result<(), FloodError> {
        let port = serialport::new(self.port_name.as_str(), self.baud_rate)
            .timeout(READ_SLICE)
            .open()
            .map_err(|e| {
                FloodError::Connection(format!("failed to open {}: {}", self.port_name, e))
            })?;

        self.channel = Some(Box::new(BufReader::new(port)));
        logging::info(
            Component::Serial,
            &format!("Serial connection established on {} @ {} baud", self.port_name, self.baud_rate),
        );

        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        Ok(())
    }

    /// Reads and parses one frame, connecting first if needed.
    pub fn read_data(&mut self) -> Result<SensorFrame, FloodError> {
        if self.channel.is_none() {
            self.connect()?;
        }

        let line = self.read_line()?;
        let frame = parse_frame(&line);
        logging::debug(Component::Serial, &format!("Frame {:?} -> {}", line.trim(), frame));
        Ok(frame)
    }

    fn read_line(&mut self) -> Result<String, FloodError> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| FloodError::Connection("serial channel not open".into()))?;

        let mut buf = Vec::new();
        loop {
            match channel.read_until(b'\n', &mut buf) {
                Ok(0) if buf.is_empty() => {
                    return Err(FloodError::Connection(format!(
                        "{} closed the connection",
                        self.port_name
                    )));
                }
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {
                    if self.interrupt.as_ref().is_some_and(StopSignal::is_triggered) {
                        return Err(FloodError::Connection("read interrupted".into()));
                    }
                }
                Err(e) => {
                    return Err(FloodError::Connection(format!(
                        "read from {} failed: {}",
                        self.port_name, e
                    )));
                }
            }
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Releases the channel. Safe to call when not connected.
    pub fn close(&mut self) -> bool {
        match self.channel.take() {
            Some(_) => {
                logging::info(Component::Serial, "Serial connection closed.");
                true
            }
            None => false,
        }
    }
}

impl FrameSource for SerialReader {
    fn read_frame(&mut self) -> Result<SensorFrame, FloodError> {
        self.read_data()
    }

    fn close(&mut self) -> bool {
        SerialReader::close(self)
    }
}

impl Drop for SerialReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the port, reads one frame and closes the port again.
pub fn read_single_frame(config: &SerialConfig) -> Result<SensorFrame, FloodError> {
    let mut reader = SerialReader::new(config);
    let result = reader.read_data();
    reader.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_well_formed_line() {
        let frame = parse_frame("1:10.5,2:8.3");
        let expected: SensorFrame = [(1, 10.5), (2, 8.3)].into_iter().collect();
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_parse_skips_garbage_token() {
        let frame = parse_frame("1:10.5,garbage,2:8.3");
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.get(1), Some(10.5));
        assert_eq!(frame.get(2), Some(8.3));
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(parse_frame("").is_empty());
        assert!(parse_frame("\r\n").is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_shapes() {
        let frame = parse_frame("x:1.0,3:abc,4:1:2,:5.0,6:,-1:2.0,7:2.5");
        let expected: SensorFrame = [(7, 2.5)].into_iter().collect();
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_line_ending() {
        let frame = parse_frame(" 1 : 10.5 , 2:8.3\r\n");
        assert_eq!(frame.get(1), Some(10.5));
        assert_eq!(frame.get(2), Some(8.3));
    }

    #[test]
    fn test_parse_last_duplicate_wins() {
        let frame = parse_frame("1:1.0,1:2.0");
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.get(1), Some(2.0));
    }

    #[test]
    fn test_read_data_from_channel() {
        let mut reader = SerialReader::from_channel("capture", Cursor::new(b"1:10.5,2:8.3\n1:11.0\n".to_vec()));

        let first = reader.read_data().unwrap();
        assert_eq!(first.get(2), Some(8.3));

        let second = reader.read_data().unwrap();
        assert_eq!(second.get(1), Some(11.0));
        assert_eq!(second.get(2), None);
    }

    #[test]
    fn test_read_data_final_line_without_newline() {
        let mut reader = SerialReader::from_channel("capture", Cursor::new(b"3:4.5".to_vec()));
        assert_eq!(reader.read_data().unwrap().get(3), Some(4.5));
    }

    #[test]
    fn test_end_of_stream_is_connection_error() {
        let mut reader = SerialReader::from_channel("capture", Cursor::new(Vec::new()));
        assert!(matches!(reader.read_data(), Err(FloodError::Connection(_))));
    }

    #[test]
    fn test_invalid_utf8_only_loses_affected_token() {
        let mut bytes = b"1:10.5,2:".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"\n");
        let mut reader = SerialReader::from_channel("capture", Cursor::new(bytes));

        let frame = reader.read_data().unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.get(1), Some(10.5));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut reader = SerialReader::from_channel("capture", Cursor::new(Vec::new()));
        assert!(reader.is_connected());
        assert!(reader.close());
        assert!(!reader.close());
        assert!(!reader.is_connected());
    }

    #[test]
    fn test_close_without_connect_is_noop() {
        let mut reader = SerialReader::new(&SerialConfig::default());
        assert!(!reader.close());
    }

    #[test]
    fn test_connect_to_missing_port_fails() {
        let config = SerialConfig {
            port: "/dev/floodcast-no-such-port".to_string(),
            baud_rate: 9600,
            settle_ms: 0,
        };
        let mut reader = SerialReader::new(&config);
        assert!(matches!(reader.connect(), Err(FloodError::Connection(_))));
        assert!(!reader.is_connected());
    }
}
