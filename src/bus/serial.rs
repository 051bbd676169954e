//! # Modbus RTU over a Serial Port
//!
//! This module implements `Bus` on an RS-485 adapter opened through
//! `tokio-serial`. The port is used synchronously: the scheduler polls
//! `bytes_to_read` once per tick instead of awaiting reads, and the direction
//! line of half-duplex adapters is driven through RTS.

use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use super::{rtu, Bus, BusPoll};
use crate::error::BusError;
use crate::poll::RegisterBlock;
use crate::util::logging::log_frame_hex;

/// Configuration for the bus serial connection.
#[derive(Debug, Clone)]
pub struct SerialBusConfig {
    pub port: String,
    pub baudrate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Drive RTS high while transmitting.
    pub rts_direction: bool,
}

impl Default for SerialBusConfig {
    fn default() -> Self {
        SerialBusConfig {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: 9600,
            parity: Parity::None,
            stop_bits: StopBits::One,
            rts_direction: true,
        }
    }
}

/// Modbus RTU master on a serial port.
pub struct SerialBus {
    port: Box<dyn SerialPort>,
    config: SerialBusConfig,
    received: Vec<u8>,
    expected_len: usize,
    function: u8,
}

impl SerialBus {
    /// Opens the port with 8 data bits and the configured parity and stop bits.
    pub fn open(config: SerialBusConfig) -> Result<SerialBus, BusError> {
        let port = tokio_serial::new(&config.port, config.baudrate)
            .data_bits(DataBits::Eight)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .timeout(Duration::from_millis(10))
            .open()?;

        debug!(
            "Opened bus {} at {} baud ({:?}, {:?})",
            config.port, config.baudrate, config.parity, config.stop_bits
        );

        let mut bus = SerialBus {
            port,
            config,
            received: Vec::with_capacity(256),
            expected_len: 0,
            function: 0,
        };
        bus.disable_transmit();
        Ok(bus)
    }

    fn set_direction(&mut self, transmit: bool) {
        if !self.config.rts_direction {
            return;
        }
        if let Err(e) = self.port.write_request_to_send(transmit) {
            warn!("bus {}: cannot drive RTS: {e}", self.config.port);
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), BusError> {
        // Stale bytes would be read as the start of the answer.
        self.port.clear(ClearBuffer::Input)?;
        self.received.clear();
        log_frame_hex("bus tx", frame);
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self) -> Result<(), BusError> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(());
        }
        let mut chunk = [0u8; 256];
        let n = self.port.read(&mut chunk[..available.min(256)])?;
        self.received.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}

impl Bus for SerialBus {
    fn enable_transmit(&mut self) {
        self.set_direction(true);
    }

    fn disable_transmit(&mut self) {
        self.set_direction(false);
    }

    fn send_request(&mut self, address: u8, function: u8, block: &RegisterBlock) -> Result<(), BusError> {
        let count = block.register_count();
        let request = rtu::build_read_request(address, function, block.start, count)?;
        self.write_frame(&request)?;
        self.expected_len = rtu::expected_response_len(count);
        self.function = function;
        Ok(())
    }

    fn poll_response(&mut self) -> BusPoll {
        if let Err(e) = self.read_available() {
            warn!("bus {}: read failed: {e}", self.config.port);
            return BusPoll::Pending;
        }
        if self.received.is_empty()
            || !rtu::response_complete(&self.received, self.function, self.expected_len)
        {
            return BusPoll::Pending;
        }
        log_frame_hex("bus rx", &self.received);
        BusPoll::Complete(Bytes::from(std::mem::take(&mut self.received)))
    }

    fn take_received(&mut self) -> Bytes {
        let _ = self.read_available();
        Bytes::from(std::mem::take(&mut self.received))
    }

    fn baudrate(&self) -> u32 {
        self.config.baudrate
    }
}
