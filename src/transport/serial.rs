use super::{ReadExpectation, Transport, TransportError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// Per-port configuration. Framing is always 8N1 without flow control;
/// only the baud rate and read deadline vary between device families.
#[derive(Debug, Clone, Copy)]
pub struct SerialConfig {
    /// Baud rate, fixed by the driver that opens the port.
    pub baud: u32,
    /// Deadline for collecting a reply to a single command.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// 9600 baud with the default 250 ms deadline.
    pub const BAUD_9600: Self = Self {
        baud: 9600,
        read_timeout: Duration::from_millis(250),
    };

    /// 115200 baud with the default 250 ms deadline.
    pub const BAUD_115200: Self = Self {
        baud: 115_200,
        read_timeout: Duration::from_millis(250),
    };
}

/// An exclusive-access serial port.
///
/// Every [`exchange`](Transport::exchange) holds the port mutex across the
/// write and the read of the reply. The read deadline is enforced by the
/// runtime ([`tokio::time::timeout`] cancels the pending read when it
/// fires), so a silent device can never wedge the port.
#[derive(Debug)]
pub struct SerialTransport {
    stream: Mutex<SerialStream>,
    config: SerialConfig,
}

impl SerialTransport {
    /// Opens the serial device at `path`.
    pub fn open(path: &str, config: SerialConfig) -> Result<Self, TransportError> {
        let stream = tokio_serial::new(path, config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(std::io::Error::from)?;
        tracing::debug!(path, baud = config.baud, "Opened serial port");
        Ok(Self {
            stream: Mutex::new(stream),
            config,
        })
    }
}

async fn read_reply(
    stream: &mut SerialStream,
    read: ReadExpectation,
) -> Result<Vec<u8>, std::io::Error> {
    let mut reply = Vec::new();
    match read {
        ReadExpectation::None => {}
        ReadExpectation::Exact(len) => {
            reply.resize(len, 0);
            stream.read_exact(&mut reply).await?;
        }
        ReadExpectation::Terminated(stop) => loop {
            let byte = stream.read_u8().await?;
            reply.push(byte);
            if byte == stop {
                break;
            }
        },
    }
    Ok(reply)
}

#[async_trait]
impl Transport for SerialTransport {
    async fn exchange(
        &self,
        command: &[u8],
        read: ReadExpectation,
    ) -> Result<Vec<u8>, TransportError> {
        let mut stream = self.stream.lock().await;
        stream.write_all(command).await?;
        stream.flush().await?;

        if read == ReadExpectation::None {
            return Ok(Vec::new());
        }

        let timeout = self.config.read_timeout;
        match tokio::time::timeout(timeout, read_reply(&mut stream, read)).await {
            Ok(reply) => Ok(reply?),
            Err(_elapsed) => Err(TransportError::Timeout {
                command: String::from_utf8_lossy(command).into_owned(),
                timeout,
            }),
        }
    }
}
