//! Mock bus implementation for testing
//!
//! This module provides a scripted bus that can be used to test the poll
//! scheduler without requiring an RS-485 adapter and a meter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use super::{rtu, Bus, BusPoll};
use crate::constants::{MODBUS_READ_HOLDING_REGISTERS, SDM_HOLDING_SERIAL_NUMBER};
use crate::error::{BusError, SlaveError};
use crate::poll::RegisterBlock;

#[derive(Debug, Default)]
struct MockState {
    /// Requests written to the bus (outgoing)
    requests: Vec<Vec<u8>>,
    /// Scripted answers, one per request (incoming)
    responses: VecDeque<Vec<u8>>,
    identities: HashMap<u8, Result<u32, SlaveError>>,
    identity_queries: Vec<u8>,
    received: Vec<u8>,
    expected_len: usize,
    function: u8,
    transmit_enabled: bool,
    direction_changes: usize,
    next_error: Option<String>,
}

/// Scripted bus that answers requests from a queue.
///
/// Clones share state, so a test can keep a handle after moving the bus into
/// a scheduler or gateway.
#[derive(Debug, Clone)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
    baudrate: u32,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new(9600)
    }
}

impl MockBus {
    pub fn new(baudrate: u32) -> Self {
        MockBus {
            state: Arc::new(Mutex::new(MockState::default())),
            baudrate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue raw bytes as the answer to the next request.
    pub fn queue_response(&self, bytes: &[u8]) {
        self.lock().responses.push_back(bytes.to_vec());
    }

    /// Queue a valid response carrying `values`.
    pub fn queue_floats(&self, address: u8, function: u8, values: &[f32]) {
        self.queue_response(&rtu::encode_float_response(address, function, values));
    }

    /// Queue an exception frame.
    pub fn queue_exception(&self, address: u8, function: u8, code: u8) {
        self.queue_response(&rtu::encode_exception(address, function, code));
    }

    /// The next request gets no answer at all.
    pub fn queue_silence(&self) {
        self.queue_response(&[]);
    }

    /// Answer for serial number requests to `address`.
    ///
    /// `Ok` answers with the serial, an exception error with an exception
    /// frame, anything else (and no entry at all) with silence.
    pub fn set_identity(&self, address: u8, result: Result<u32, SlaveError>) {
        self.lock().identities.insert(address, result);
    }

    /// Fail the next `send_request` with a serial error.
    pub fn fail_next_send(&self, message: &str) {
        self.lock().next_error = Some(message.to_string());
    }

    /// Register read requests written so far; serial number requests are
    /// listed by `identity_queries` instead.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.lock().requests.clone()
    }

    /// Addresses that were asked for their identity, in order.
    pub fn identity_queries(&self) -> Vec<u8> {
        self.lock().identity_queries.clone()
    }

    pub fn transmit_enabled(&self) -> bool {
        self.lock().transmit_enabled
    }

    /// Number of times the direction line changed.
    pub fn direction_changes(&self) -> usize {
        self.lock().direction_changes
    }

    pub fn pending_responses(&self) -> usize {
        self.lock().responses.len()
    }
}

impl Bus for MockBus {
    fn enable_transmit(&mut self) {
        let mut state = self.lock();
        if !state.transmit_enabled {
            state.transmit_enabled = true;
            state.direction_changes += 1;
        }
    }

    fn disable_transmit(&mut self) {
        let mut state = self.lock();
        if state.transmit_enabled {
            state.transmit_enabled = false;
            state.direction_changes += 1;
        }
    }

    fn send_request(&mut self, address: u8, function: u8, block: &RegisterBlock) -> Result<(), BusError> {
        let count = block.register_count();
        let request = rtu::build_read_request(address, function, block.start, count)?;

        let mut state = self.lock();
        if let Some(message) = state.next_error.take() {
            return Err(BusError::Serial(message));
        }
        state.expected_len = rtu::expected_response_len(count);
        state.function = function;

        if function == MODBUS_READ_HOLDING_REGISTERS && block.start == SDM_HOLDING_SERIAL_NUMBER {
            state.identity_queries.push(address);
            let answer = state.identities.get(&address).copied();
            state.received = match answer {
                Some(Ok(serial)) => rtu::encode_read_response(address, function, &serial.to_be_bytes()),
                Some(Err(e)) if (1..=4).contains(&e.code()) => rtu::encode_exception(address, function, e.code()),
                _ => Vec::new(),
            };
            return Ok(());
        }

        state.requests.push(request.to_vec());
        state.received = state.responses.pop_front().unwrap_or_default();
        Ok(())
    }

    fn poll_response(&mut self) -> BusPoll {
        let mut state = self.lock();
        if state.received.is_empty()
            || !rtu::response_complete(&state.received, state.function, state.expected_len)
        {
            return BusPoll::Pending;
        }
        BusPoll::Complete(Bytes::from(std::mem::take(&mut state.received)))
    }

    fn take_received(&mut self) -> Bytes {
        Bytes::from(std::mem::take(&mut self.lock().received))
    }

    fn baudrate(&self) -> u32 {
        self.baudrate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MODBUS_READ_INPUT_REGISTERS;

    #[test]
    fn test_partial_response_stays_pending() {
        let mut bus = MockBus::default();
        let full = rtu::encode_float_response(1, MODBUS_READ_INPUT_REGISTERS, &[1.0]);
        bus.queue_response(&full[..6]);

        bus.send_request(1, MODBUS_READ_INPUT_REGISTERS, &RegisterBlock::single(0))
            .unwrap();
        assert_eq!(bus.poll_response(), BusPoll::Pending);
        assert_eq!(bus.take_received().len(), 6);
    }

    #[test]
    fn test_identity_answers() {
        let mut bus = MockBus::default();
        let block = RegisterBlock::single(SDM_HOLDING_SERIAL_NUMBER);
        bus.set_identity(5, Ok(4242));
        bus.set_identity(6, Err(SlaveError::IllegalDataAddress));

        bus.send_request(5, MODBUS_READ_HOLDING_REGISTERS, &block).unwrap();
        match bus.poll_response() {
            BusPoll::Complete(frame) => assert_eq!(rtu::parse_serial_number(&frame, 5), Ok(4242)),
            BusPoll::Pending => panic!("identity answer not complete"),
        }

        bus.send_request(6, MODBUS_READ_HOLDING_REGISTERS, &block).unwrap();
        match bus.poll_response() {
            BusPoll::Complete(frame) => {
                assert_eq!(rtu::parse_serial_number(&frame, 6), Err(SlaveError::IllegalDataAddress))
            }
            BusPoll::Pending => panic!("exception not complete"),
        }

        bus.send_request(7, MODBUS_READ_HOLDING_REGISTERS, &block).unwrap();
        assert_eq!(bus.poll_response(), BusPoll::Pending);

        assert_eq!(bus.identity_queries(), vec![5, 6, 7]);
        assert!(bus.requests().is_empty());
    }

    #[test]
    fn test_clone_shares_state() {
        let bus = MockBus::default();
        let mut handle = bus.clone();
        handle.enable_transmit();
        assert!(bus.transmit_enabled());
        assert_eq!(bus.direction_changes(), 1);
    }
}
