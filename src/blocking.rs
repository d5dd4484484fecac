//! Blocking adapter connection over any `Read + Write` transport.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use crate::command::ObdCommand;
use crate::error::Result;
use crate::response::{ObdRawResponse, ObdResponse, SEARCHING_PATTERN};

/// Pause between read attempts while the adapter stays silent, and the read
/// timeout configured on serial ports opened through [`ObdConnection::open`].
const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A blocking connection to an ELM327-compatible OBD-II adapter.
#[derive(Debug)]
pub struct ObdConnection<P> {
    port: P,
    response_cache: HashMap<String, ObdRawResponse>,
}

impl<P: Read + Write> ObdConnection<P> {
    /// Wraps an already opened transport.
    pub fn new(port: P) -> Self {
        Self {
            port,
            response_cache: HashMap::new(),
        }
    }

    /// Executes `command` against the adapter and decodes the answer.
    ///
    /// With `use_cache` the raw answer is stored and reused per command, which
    /// is only sensible for values that cannot change within a session, like
    /// the VIN. `delay_time` adds a pause after the request is written for
    /// adapters that drop characters when polled too quickly, and
    /// `max_retries` bounds how many extra read windows a silent adapter is
    /// granted before the answer collected so far is used as-is.
    pub fn run(
        &mut self,
        command: &ObdCommand,
        use_cache: bool,
        delay_time: Duration,
        max_retries: u32,
    ) -> Result<ObdResponse> {
        let cache_key = format!("{}:{}", command.tag, command.raw_command());
        let cached = if use_cache {
            self.response_cache.get(&cache_key).cloned()
        } else {
            None
        };

        let raw_response = match cached {
            Some(raw) => {
                log::trace!("cache hit for [{cache_key}]");
                raw
            }
            None => {
                let raw = self.run_command(command, delay_time, max_retries)?;
                if use_cache {
                    self.response_cache.insert(cache_key, raw.clone());
                }
                raw
            }
        };

        command.handle_response(&raw_response)
    }

    /// Drops every cached answer.
    pub fn clear_cache(&mut self) {
        self.response_cache.clear();
    }

    fn run_command(
        &mut self,
        command: &ObdCommand,
        delay_time: Duration,
        max_retries: u32,
    ) -> Result<ObdRawResponse> {
        let started = Instant::now();
        self.send_command(command, delay_time)?;
        let value = self.read_raw_data(max_retries)?;
        Ok(ObdRawResponse::new(value, started.elapsed()))
    }

    fn send_command(&mut self, command: &ObdCommand, delay_time: Duration) -> Result<()> {
        log::trace!("send command [{}]", command.raw_command());
        let request = format!("{}\r", command.raw_command());
        self.port.write_all(request.as_bytes())?;
        self.port.flush()?;
        if !delay_time.is_zero() {
            std::thread::sleep(delay_time);
        }
        Ok(())
    }

    /// Accumulates bytes until the adapter's `>` prompt, the end of the
    /// stream, or an exhausted retry budget. A transport read timeout counts
    /// against the budget, so ports opened through [`ObdConnection::open`]
    /// pace their retries by the configured timeout alone.
    fn read_raw_data(&mut self, max_retries: u32) -> Result<String> {
        let mut accumulated = String::new();
        let mut retries = 0;
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    let received = char::from(byte[0]);
                    if received == '>' {
                        break;
                    }
                    accumulated.push(received);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    if retries >= max_retries {
                        break;
                    }
                    retries += 1;
                    if err.kind() == io::ErrorKind::WouldBlock {
                        std::thread::sleep(READ_RETRY_DELAY);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        let response = SEARCHING_PATTERN.replace_all(&accumulated, "");
        let response = response.trim().to_string();
        log::trace!("received response [{response}]");
        Ok(response)
    }
}

#[cfg(feature = "serialport")]
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
impl ObdConnection<Box<dyn serialport::SerialPort>> {
    /// Opens the serial port at `baud_rate` (8N1, no flow control) and wires
    /// it up as an adapter connection.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use elm327_lib::blocking::ObdConnection;
    /// use elm327_lib::commands::{at, engine};
    /// use std::time::Duration;
    ///
    /// fn main() -> Result<(), elm327_lib::Error> {
    ///     let mut connection = ObdConnection::open("/dev/ttyUSB0", 38400)?;
    ///
    ///     connection.run(&at::reset_adapter(), false, Duration::ZERO, 3)?;
    ///     connection.run(&at::set_echo(at::Switcher::Off), false, Duration::ZERO, 3)?;
    ///
    ///     let speed = connection.run(&engine::speed(), false, Duration::ZERO, 3)?;
    ///     println!("{}", speed.formatted_value());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(port: &str, baud_rate: u32) -> Result<Self> {
        Ok(Self::new(
            serialport::new(port, baud_rate)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(READ_RETRY_DELAY)
                .open()?,
        ))
    }

    /// Sets the length of one read window, which also paces the retries of
    /// [`ObdConnection::run`].
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        log::trace!("set timeout to {timeout:?}");
        self.port.set_timeout(timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{default_formatter, ObdCommand};
    use crate::commands::engine;
    use crate::error::Error;
    use std::io::Cursor;

    /// A fake serial port: canned input, captured output, and an optional
    /// number of timed-out reads before the input becomes available.
    struct MockPort {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
        timeouts_before_data: u32,
    }

    impl MockPort {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                written: Vec::new(),
                timeouts_before_data: 0,
            }
        }

        fn silent_at_first(input: &[u8], timeouts: u32) -> Self {
            Self {
                timeouts_before_data: timeouts,
                ..Self::new(input)
            }
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.timeouts_before_data > 0 {
                self.timeouts_before_data -= 1;
                return Err(io::ErrorKind::TimedOut.into());
            }
            self.input.read(buf)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A command that answers with the processed raw text, unvalidated, so
    /// transport behaviour can be observed directly.
    fn probe() -> ObdCommand {
        ObdCommand {
            tag: "PROBE".into(),
            name: "Transport Probe".into(),
            mode: "01".into(),
            pid: "0D".into(),
            default_unit: "".into(),
            skip_byte_validation: true,
            decoder: |raw| Ok(raw.processed_value().into()),
            formatter: default_formatter,
        }
    }

    #[test]
    fn writes_the_request_and_decodes_the_answer() {
        let mut connection = ObdConnection::new(MockPort::new(b"41 0D 40>"));

        let response = connection
            .run(&engine::speed(), false, Duration::ZERO, 0)
            .unwrap();

        assert_eq!(response.value, "64");
        assert_eq!(response.unit, "Km/h");
        assert_eq!(connection.port.written, b"01 0D\r".to_vec());
    }

    #[test]
    fn stops_reading_at_stream_end() {
        let mut connection = ObdConnection::new(MockPort::new(b"410D40"));

        let response = connection.run(&probe(), false, Duration::ZERO, 0).unwrap();

        assert_eq!(response.raw_response.value, "410D40");
    }

    #[test]
    fn returns_empty_value_when_the_adapter_stays_silent() {
        let mut connection = ObdConnection::new(MockPort::silent_at_first(b"", 5));

        let response = connection.run(&probe(), false, Duration::ZERO, 0).unwrap();

        assert_eq!(response.value, "");
    }

    #[test]
    fn retries_while_the_adapter_warms_up() {
        let mut connection = ObdConnection::new(MockPort::silent_at_first(b"41 0D 40>", 1));

        let response = connection
            .run(&engine::speed(), false, Duration::ZERO, 1)
            .unwrap();

        assert_eq!(response.value, "64");
    }

    #[test]
    fn strips_searching_noise_from_the_answer() {
        let mut connection = ObdConnection::new(MockPort::new(b"SEARCHING...410D40>"));

        let response = connection.run(&probe(), false, Duration::ZERO, 0).unwrap();

        assert_eq!(response.raw_response.value, "...410D40");
        assert_eq!(response.value, "410D40");
    }

    #[test]
    fn returns_cached_answers_without_touching_the_adapter() {
        let mut connection = ObdConnection::new(MockPort::new(b"410D40>"));

        let first = connection.run(&probe(), true, Duration::ZERO, 0).unwrap();
        let second = connection.run(&probe(), true, Duration::ZERO, 0).unwrap();

        assert_eq!(first.value, "410D40");
        assert_eq!(second.value, "410D40");
        // Exactly one request must have reached the adapter.
        assert_eq!(connection.port.written, b"01 0D\r".to_vec());
    }

    #[test]
    fn bypasses_the_cache_when_disabled() {
        let mut connection = ObdConnection::new(MockPort::new(b"410D40>410D41>"));

        let first = connection.run(&probe(), false, Duration::ZERO, 0).unwrap();
        let second = connection.run(&probe(), false, Duration::ZERO, 0).unwrap();

        assert_eq!(first.value, "410D40");
        assert_eq!(second.value, "410D41");
        assert_eq!(connection.port.written, b"01 0D\r01 0D\r".to_vec());
    }

    #[test]
    fn clearing_the_cache_forces_a_fresh_read() {
        let mut connection = ObdConnection::new(MockPort::new(b"410D40>410D41>"));

        let first = connection.run(&probe(), true, Duration::ZERO, 0).unwrap();
        connection.clear_cache();
        let second = connection.run(&probe(), true, Duration::ZERO, 0).unwrap();

        assert_eq!(first.value, "410D40");
        assert_eq!(second.value, "410D41");
        assert_eq!(connection.port.written, b"01 0D\r01 0D\r".to_vec());
    }

    #[test]
    fn honours_the_post_write_delay() {
        let mut connection = ObdConnection::new(MockPort::new(b"410D40>"));

        let response = connection
            .run(&probe(), false, Duration::from_millis(10), 0)
            .unwrap();

        assert!(response.raw_response.elapsed_time >= Duration::from_millis(10));
    }

    #[test]
    fn surfaces_error_markers_from_the_adapter() {
        let mut connection = ObdConnection::new(MockPort::new(b"UNABLE TO CONNECT>"));

        let result = connection.run(&engine::speed(), false, Duration::ZERO, 0);

        assert!(matches!(result, Err(Error::UnableToConnect { .. })));
    }
}
