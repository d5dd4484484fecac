//! Provides an asynchronous connection to ELM327-compatible OBD-II adapters,
//! using Tokio for the transport I/O.
//!
//! This module is suitable for applications built on the Tokio runtime. The
//! connection pairs any [`AsyncRead`] and [`AsyncWrite`] halves, so it works
//! equally well over a serial dongle (see `ObdConnection::open`, behind the
//! `tokio-serial-async` feature), a Bluetooth RFCOMM socket or the TCP stream
//! of a WiFi adapter.
//!
//! A command exchange writes the request followed by a carriage return, then
//! reads until the adapter prints its `>` prompt.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};

use crate::command::ObdCommand;
use crate::error::Result;
use crate::response::{ObdRawResponse, ObdResponse, SEARCHING_PATTERN};

/// How long one read attempt waits for the next byte before it counts
/// against the retry budget.
const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

/// An asynchronous connection to an ELM327-compatible OBD-II adapter.
///
/// Commands run strictly one at a time: the transport sits behind an internal
/// lock, so a connection can be shared between tasks (for example inside an
/// `Arc`) and requests never interleave on the wire.
#[derive(Debug)]
pub struct ObdConnection<R, W> {
    inner: Mutex<Inner<R, W>>,
}

#[derive(Debug)]
struct Inner<R, W> {
    reader: R,
    writer: W,
    response_cache: HashMap<String, ObdRawResponse>,
}

impl<R, W> ObdConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wraps an already opened transport.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            inner: Mutex::new(Inner {
                reader,
                writer,
                response_cache: HashMap::new(),
            }),
        }
    }

    /// Executes `command` against the adapter and decodes the answer.
    ///
    /// # Arguments
    ///
    /// * `command`: The command to send.
    /// * `use_cache`: Store and reuse the raw answer for this command in a
    ///   connection-local cache. Only sensible for values that cannot change
    ///   within a session, like the VIN or the supported PID bitmasks.
    /// * `delay_time`: Extra pause after the request is written, for adapters
    ///   that drop characters when polled too quickly. Zero skips the pause.
    /// * `max_retries`: How many additional read windows of 500 ms each to
    ///   wait through when the adapter stays silent. Once the budget is spent
    ///   the answer collected so far is used as-is.
    ///
    /// # Returns
    ///
    /// The validated and decoded [`ObdResponse`], or an [`Error`](crate::Error)
    /// when the adapter reported a failure or the answer did not decode.
    pub async fn run(
        &self,
        command: &ObdCommand,
        use_cache: bool,
        delay_time: Duration,
        max_retries: u32,
    ) -> Result<ObdResponse> {
        let mut inner = self.inner.lock().await;

        let cache_key = format!("{}:{}", command.tag, command.raw_command());
        let cached = if use_cache {
            inner.response_cache.get(&cache_key).cloned()
        } else {
            None
        };

        let raw_response = match cached {
            Some(raw) => {
                log::trace!("cache hit for [{cache_key}]");
                raw
            }
            None => {
                let raw = inner.run_command(command, delay_time, max_retries).await?;
                if use_cache {
                    inner.response_cache.insert(cache_key, raw.clone());
                }
                raw
            }
        };

        command.handle_response(&raw_response)
    }

    /// Drops every cached answer.
    pub async fn clear_cache(&self) {
        self.inner.lock().await.response_cache.clear();
    }
}

#[cfg(feature = "tokio-serial-async")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-serial-async")))]
impl
    ObdConnection<
        tokio::io::ReadHalf<tokio_serial::SerialStream>,
        tokio::io::WriteHalf<tokio_serial::SerialStream>,
    >
{
    /// Opens the serial port at `baud_rate` (8N1, no flow control) and wires
    /// it up as an adapter connection.
    ///
    /// # Arguments
    ///
    /// * `port`: The path to the serial port device (e.g., `/dev/ttyUSB0` on
    ///   Linux, `COM3` on Windows).
    /// * `baud_rate`: The port speed; ELM327 clones commonly use 38400.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use elm327_lib::commands::{at, engine};
    /// use elm327_lib::connection::ObdConnection;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), elm327_lib::Error> {
    ///     let connection = ObdConnection::open("/dev/ttyUSB0", 38400)?;
    ///
    ///     connection
    ///         .run(&at::reset_adapter(), false, Duration::ZERO, 3)
    ///         .await?;
    ///     connection
    ///         .run(&at::set_echo(at::Switcher::Off), false, Duration::ZERO, 3)
    ///         .await?;
    ///
    ///     let speed = connection
    ///         .run(&engine::speed(), false, Duration::ZERO, 3)
    ///         .await?;
    ///     println!("{}", speed.formatted_value());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(port: &str, baud_rate: u32) -> Result<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let serial = tokio_serial::new(port, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;
        let (reader, writer) = tokio::io::split(serial);
        Ok(Self::new(reader, writer))
    }
}

impl<R, W> Inner<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn run_command(
        &mut self,
        command: &ObdCommand,
        delay_time: Duration,
        max_retries: u32,
    ) -> Result<ObdRawResponse> {
        let started = Instant::now();
        self.send_command(command, delay_time).await?;
        let value = self.read_raw_data(max_retries).await?;
        Ok(ObdRawResponse::new(value, started.elapsed()))
    }

    async fn send_command(&mut self, command: &ObdCommand, delay_time: Duration) -> Result<()> {
        log::trace!("send command [{}]", command.raw_command());
        let request = format!("{}\r", command.raw_command());
        self.writer.write_all(request.as_bytes()).await?;
        self.writer.flush().await?;
        if !delay_time.is_zero() {
            sleep(delay_time).await;
        }
        Ok(())
    }

    /// Accumulates bytes until the adapter's `>` prompt, the end of the
    /// stream, or an exhausted retry budget, whichever comes first.
    async fn read_raw_data(&mut self, max_retries: u32) -> Result<String> {
        let mut accumulated = String::new();
        let mut retries = 0;
        let mut byte = [0u8; 1];

        loop {
            match timeout(READ_RETRY_DELAY, self.reader.read(&mut byte)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(_)) => {
                    let received = char::from(byte[0]);
                    if received == '>' {
                        break;
                    }
                    accumulated.push(received);
                }
                Ok(Err(err)) => return Err(err.into()),
                // Nothing arrived within the window.
                Err(_) => {
                    if retries >= max_retries {
                        break;
                    }
                    retries += 1;
                }
            }
        }

        let response = SEARCHING_PATTERN.replace_all(&accumulated, "");
        let response = response.trim().to_string();
        log::trace!("received response [{response}]");
        Ok(response)
    }
}
