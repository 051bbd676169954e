//! # Byte Transports
//!
//! Transports feed channels. `SerialTransport` reads one meter port in its own
//! task and turns a quiet line into `end_of_burst`; `replay` pushes a captured
//! byte stream through a channel offline.

use std::time::Duration;

use log::{debug, error, info};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;

use crate::channel::{Channel, SharedChannel};
use crate::clock::{Clock, ManualClock};
use crate::constants::TRANSPORT_FIFO_SIZE;
use crate::decoder::Decoder;
use crate::error::BusError;
use crate::publish::Publisher;

/// Configuration of one meter input port.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub port: String,
    pub baudrate: u32,
    /// Silence after which the current burst is considered complete.
    pub inter_frame_gap: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: 9600,
            inter_frame_gap: Duration::from_millis(30),
        }
    }
}

/// Receive-only reader feeding one channel.
pub struct SerialTransport {
    config: TransportConfig,
    channel: SharedChannel,
}

impl SerialTransport {
    pub fn new(config: TransportConfig, channel: SharedChannel) -> Self {
        Self { config, channel }
    }

    /// Opens the port and spawns the reader task.
    ///
    /// The task ends when the port reports end of file or an I/O error.
    pub fn spawn(self) -> Result<JoinHandle<Result<(), BusError>>, BusError> {
        let mut port = tokio_serial::new(&self.config.port, self.config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .open_native_async()?;

        info!(
            "Reading {} at {} baud into channel {}",
            self.config.port,
            self.config.baudrate,
            self.channel.name()
        );

        Ok(tokio::spawn(async move {
            let mut buf = [0u8; TRANSPORT_FIFO_SIZE];
            let mut in_burst = false;
            loop {
                match timeout(self.config.inter_frame_gap, port.read(&mut buf)).await {
                    Ok(Ok(0)) => {
                        debug!("{}: end of stream", self.config.port);
                        return Ok(());
                    }
                    Ok(Ok(n)) => {
                        self.channel.push(&buf[..n]);
                        in_burst = true;
                    }
                    Ok(Err(e)) => {
                        error!("{}: read failed: {e}", self.config.port);
                        return Err(BusError::Io(e));
                    }
                    Err(_) => {
                        if in_burst {
                            self.channel.end_of_burst();
                            in_burst = false;
                        }
                    }
                }
            }
        }))
    }
}

/// Pushes `data` through `channel` in bursts of `chunk` bytes and returns the
/// number of frames delivered.
///
/// Without timing information a burst ends wherever the framing policy sees a
/// frame boundary, plus once at the end of the data.
pub fn replay(
    channel: &mut Channel,
    data: &[u8],
    chunk: usize,
    decoder: &mut dyn Decoder,
    publisher: &mut dyn Publisher,
) -> u64 {
    let clock = ManualClock::new(0);
    let before = channel.stats().frames_delivered;
    let framing = channel.config().framing.clone();

    for burst in data.chunks(chunk.max(1)) {
        channel.push(burst);
        if framing.ends_frame(channel.buffered()) {
            channel.end_of_burst();
        }
        channel.tick(clock.now(), decoder, publisher);
        clock.advance(1);
    }
    channel.end_of_burst();
    channel.tick(clock.now(), decoder, publisher);

    channel.stats().frames_delivered - before
}
