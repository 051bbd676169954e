//! # Request/Response Bus
//!
//! The poll scheduler drives a half-duplex master/slave bus through the `Bus`
//! trait. Every call returns promptly: responses are polled, never awaited.
//! The serial number request used for identity discovery is an ordinary read
//! of a holding register and goes through the same calls.

pub mod mock;
pub mod rtu;
pub mod serial;

pub use mock::MockBus;
pub use serial::{SerialBus, SerialBusConfig};

use bytes::Bytes;

use crate::error::BusError;
use crate::poll::RegisterBlock;

/// Result of polling for a response.
#[derive(Debug, Clone, PartialEq)]
pub enum BusPoll {
    /// Not (yet) a complete frame.
    Pending,
    /// A complete response or exception frame.
    Complete(Bytes),
}

/// Half-duplex request/response bus.
pub trait Bus {
    /// Drives the direction line to transmit.
    fn enable_transmit(&mut self);

    /// Releases the direction line so the slave can answer.
    fn disable_transmit(&mut self);

    /// Sends a read request for `block` to `address`.
    fn send_request(&mut self, address: u8, function: u8, block: &RegisterBlock) -> Result<(), BusError>;

    /// Checks for a complete response to the last request.
    fn poll_response(&mut self) -> BusPoll;

    /// Takes whatever arrived for the last request, complete or not.
    fn take_received(&mut self) -> Bytes;

    /// Line rate, used for settle and wire-time calculations.
    fn baudrate(&self) -> u32;
}
