//! Serial channel over a shared bus
//!
//! Wraps a serial stream with the fixed bus configuration and a
//! timeout-bounded request/response exchange. The same channel type
//! serves the dispenser bus (binary frames) and the auxiliary Adam
//! module (ASCII command lines).

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::trace;

use crate::frame::{Frame, FrameError, MAX_PAYLOAD, SOH};

/// A channel shared between drivers on the same physical port
pub type SharedChannel = Arc<Mutex<Channel>>;

/// How many stray bytes to discard while hunting for a frame start
const RESYNC_LIMIT: usize = 16;

/// Longest ASCII response line the auxiliary protocol produces
const MAX_LINE: usize = 64;

/// Fixed bus configuration: 9600 baud, 8 data bits, no parity, one stop
/// bit, no flow control, 100 ms response timeout.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout_ms: 100,
        }
    }
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out waiting for a response")]
    Timeout,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A configured, open serial channel.
pub struct Channel {
    stream: SerialStream,
    timeout: Duration,
}

impl Channel {
    /// Open the serial device at `path` with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Serial`] when the port cannot be opened
    /// or configured.
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, ChannelError> {
        let stream = tokio_serial::new(path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open_native_async()?;
        trace!(path, baud = config.baud_rate, "Opened serial channel");
        Ok(Self {
            stream,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Send a request frame and read the matching response.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Timeout`] when no response arrives within the
    /// configured window; [`ChannelError::Frame`] when the response is
    /// malformed or answers for a different address.
    pub async fn transceive(&mut self, request: &Frame) -> Result<Frame, ChannelError> {
        let encoded = request.encode();
        trace!(
            address = request.address,
            code = request.code,
            len = encoded.len(),
            "Sending frame"
        );
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;

        let response = timeout(self.timeout, self.read_frame())
            .await
            .map_err(|_| ChannelError::Timeout)??;

        if response.address != request.address {
            return Err(FrameError::AddressMismatch {
                expected: request.address,
                got: response.address,
            }
            .into());
        }
        Ok(response)
    }

    /// Read one frame, resynchronizing on the start byte. Stray bytes can
    /// linger on a half-duplex bus after a collision or late reply.
    async fn read_frame(&mut self) -> Result<Frame, ChannelError> {
        let mut byte = [0u8; 1];
        for _ in 0..RESYNC_LIMIT {
            self.stream.read_exact(&mut byte).await?;
            if byte[0] != SOH {
                trace!(byte = byte[0], "Discarding stray byte");
                continue;
            }
            let mut header = [0u8; 3];
            self.stream.read_exact(&mut header).await?;
            let len = header[2] as usize;
            if len > MAX_PAYLOAD {
                return Err(FrameError::Oversize(len).into());
            }
            let mut rest = vec![0u8; len + 1];
            self.stream.read_exact(&mut rest).await?;

            let mut wire = Vec::with_capacity(5 + len);
            wire.push(SOH);
            wire.extend_from_slice(&header);
            wire.extend_from_slice(&rest);
            return Ok(Frame::decode(&wire)?);
        }
        Err(FrameError::Malformed("no frame start within resync window".into()).into())
    }

    /// Send an ASCII command and read the CR-terminated response line,
    /// as the auxiliary Adam protocol expects.
    pub async fn transceive_line(&mut self, command: &str) -> Result<String, ChannelError> {
        trace!(command, "Sending command line");
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.flush().await?;
        timeout(self.timeout, self.read_line())
            .await
            .map_err(|_| ChannelError::Timeout)?
    }

    async fn read_line(&mut self) -> Result<String, ChannelError> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.stream.read_exact(&mut byte).await?;
            if byte[0] == b'\r' {
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            line.push(byte[0]);
            if line.len() > MAX_LINE {
                return Err(
                    FrameError::Malformed("response line exceeds protocol maximum".into()).into(),
                );
            }
        }
    }
}
