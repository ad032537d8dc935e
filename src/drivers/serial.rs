use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::time::Duration;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use crate::drivers::error::AcquisitionError;
use crate::drivers::range::Range;
use crate::drivers::source::{PinSelect, RangeControl, RawAdc, RawSample};
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
}
impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 500,
        }
    }
}
/// Bench front-end reached over a serial line.
///
/// The firmware speaks one ASCII command per line and answers each with one line:
/// `R<code>` selects mux code 0..3, `P<n>` routes pin `n`, `A` returns one
/// conversion as a decimal count. Failures come back as `ERR <reason>`.
///
/// A reply that misses the read timeout may still arrive later. Pending input is
/// dropped before the next command so replies stay paired with their commands.
pub struct SerialBench<T: SerialLink = Box<dyn SerialPort>> {
    link: BufReader<T>,
    line: String,
    resync: bool,
}
/// Byte stream the bench protocol runs over.
pub trait SerialLink: io::Read + Write {
    /// Drop whatever input has been received but not read yet.
    fn discard_input(&mut self) -> io::Result<()>;
}
impl SerialLink for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}
impl SerialBench {
    pub fn open(settings: &SerialSettings) -> Result<Self, AcquisitionError> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(Duration::from_millis(settings.timeout_ms))
            .open()?;
        info!(
            "bench front-end opened on {} @ {} baud",
            settings.port, settings.baud_rate
        );
        Ok(Self::over(port))
    }
}
impl<T: SerialLink> SerialBench<T> {
    pub fn over(link: T) -> Self {
        Self {
            link: BufReader::new(link),
            line: String::new(),
            resync: false,
        }
    }
    fn discard_stale_input(&mut self) -> Result<(), AcquisitionError> {
        let buffered = self.link.buffer().len();
        self.link.consume(buffered);
        self.link.get_mut().discard_input()?;
        debug!("bench input discarded ({buffered} buffered bytes)");
        self.resync = false;
        Ok(())
    }
    fn transact(&mut self, command: &str) -> Result<&str, AcquisitionError> {
        if self.resync {
            self.discard_stale_input()?;
        }
        let port = self.link.get_mut();
        port.write_all(command.as_bytes())?;
        port.write_all(b"\n")?;
        port.flush()?;
        self.line.clear();
        match self.link.read_line(&mut self.line) {
            Ok(0) => return Err(AcquisitionError::Bus("link closed".into())),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::TimedOut => {
                self.resync = true;
                return Err(AcquisitionError::Timeout);
            }
            Err(err) => return Err(err.into()),
        }
        let reply = self.line.trim();
        debug!("bench {command} -> {reply}");
        if let Some(reason) = reply.strip_prefix("ERR") {
            return Err(AcquisitionError::Bus(reason.trim().to_string()));
        }
        Ok(reply)
    }
    fn expect_ok(&mut self, command: &str) -> Result<(), AcquisitionError> {
        match self.transact(command)? {
            "OK" => Ok(()),
            other => Err(AcquisitionError::Protocol(other.to_string())),
        }
    }
}
impl<T: SerialLink> RawAdc for SerialBench<T> {
    fn read(&mut self) -> Result<RawSample, AcquisitionError> {
        let reply = self.transact("A")?;
        reply
            .parse::<RawSample>()
            .map_err(|_| AcquisitionError::Protocol(reply.to_string()))
    }
}
impl<T: SerialLink> RangeControl for SerialBench<T> {
    fn set(&mut self, range: Range) -> Result<(), AcquisitionError> {
        self.expect_ok(&format!("R{}", range.select_code()))
    }
}
impl<T: SerialLink> PinSelect for SerialBench<T> {
    fn select_pin(&mut self, pin: usize) -> Result<(), AcquisitionError> {
        self.expect_ok(&format!("P{pin}"))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    /// Canned replies in, captured commands out.
    struct Loopback {
        replies: Cursor<Vec<u8>>,
        sent: Vec<u8>,
    }
    impl Loopback {
        fn new(replies: &str) -> Self {
            Self {
                replies: Cursor::new(replies.as_bytes().to_vec()),
                sent: Vec::new(),
            }
        }
    }
    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.replies.read(buf)
        }
    }
    impl SerialLink for Loopback {
        fn discard_input(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    /// Answers each command line from a script. The first reply lands only after
    /// the read has already timed out.
    struct SlowFirmware {
        input: std::collections::VecDeque<u8>,
        script: std::collections::VecDeque<&'static str>,
        timed_out: bool,
        discards: usize,
    }
    impl SlowFirmware {
        fn new(script: &[&'static str]) -> Self {
            Self {
                input: Default::default(),
                script: script.iter().copied().collect(),
                timed_out: false,
                discards: 0,
            }
        }
    }
    impl Read for SlowFirmware {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.timed_out {
                self.timed_out = true;
                return Err(std::io::Error::new(ErrorKind::TimedOut, "no reply yet"));
            }
            self.input.read(buf)
        }
    }
    impl Write for SlowFirmware {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            for &byte in buf {
                if byte != b'\n' {
                    continue;
                }
                if let Some(reply) = self.script.pop_front() {
                    self.input.extend(reply.bytes());
                    self.input.push_back(b'\n');
                }
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl SerialLink for SlowFirmware {
        fn discard_input(&mut self) -> std::io::Result<()> {
            self.discards += 1;
            self.input.clear();
            Ok(())
        }
    }
    #[test]
    fn late_reply_is_dropped_after_timeout() {
        let mut bench = SerialBench::over(SlowFirmware::new(&["15430", "OK", "1000"]));
        assert!(matches!(bench.read(), Err(AcquisitionError::Timeout)));
        bench.set(Range::R0).unwrap();
        assert_eq!(bench.read().unwrap(), 1000);
        assert_eq!(bench.link.get_ref().discards, 1);
    }
    #[test]
    fn speaks_line_protocol() {
        let mut bench = SerialBench::over(Loopback::new("OK\nOK\n15430\r\n"));
        bench.set(Range::R1K).unwrap();
        bench.select_pin(12).unwrap();
        assert_eq!(bench.read().unwrap(), 15430);
        let sent = String::from_utf8(bench.link.get_ref().sent.clone()).unwrap();
        assert_eq!(sent, "R2\nP12\nA\n");
    }
    #[test]
    fn err_reply_is_a_bus_error() {
        let mut bench = SerialBench::over(Loopback::new("ERR i2c nack\n"));
        match bench.read() {
            Err(AcquisitionError::Bus(reason)) => assert_eq!(reason, "i2c nack"),
            other => panic!("unexpected {other:?}"),
        }
    }
    #[test]
    fn garbage_reply_is_a_protocol_error() {
        let mut bench = SerialBench::over(Loopback::new("-12\nBUSY\n"));
        assert!(matches!(bench.read(), Err(AcquisitionError::Protocol(_))));
        assert!(matches!(
            bench.set(Range::R0),
            Err(AcquisitionError::Protocol(_))
        ));
    }
    #[test]
    fn closed_link_is_reported() {
        let mut bench = SerialBench::over(Loopback::new(""));
        assert!(matches!(bench.read(), Err(AcquisitionError::Bus(_))));
    }
}
