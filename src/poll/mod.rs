//! # Modbus Poll Scheduler
//!
//! One `PollScheduler` multiplexes every configured slave over a single
//! half-duplex bus. At most one poll cycle is active at a time; a cycle reads
//! the slave's register blocks in order, then publishes the collected values
//! one per tick before the next slave is considered.
//!
//! ## States
//!
//! ```text
//! Standby                      no enabled slaves, every tick is a no-op
//! Idle -> PrepareTransmit -> Transmitting -> AwaitingResponse -> Decoding
//!           ^                                    |                 |
//!           +------------- AdvanceBlock <--------+-----------------+
//!                               |            (timeout / decode error)
//!                               v                  v
//!                           Publishing <-----------+ -> Idle
//! ```
//!
//! A timeout or decode error aborts the rest of the cycle: the error is
//! recorded on the slave and a single error summary is published. The slave
//! is retried at its next interval.
//!
//! A slave whose serial number is still unknown is not polled. From `Idle`
//! the scheduler reads holding register 0xFC00 with the same settle, release
//! and deadline steps as a block read, one step per tick. A failed request
//! holds that slave back for `identity_retry_ms` and leaves its error
//! counters alone; other slaves are polled meanwhile.

pub mod register;
pub mod slave;

pub use register::{RegisterBlock, RegisterDef, RegisterLayout, ScratchMap};
pub use slave::{ErrorTally, Slave, SlaveConfig, SlaveIdentity};

use bytes::Bytes;
use log::{debug, info, warn};
use serde::Serialize;

use crate::bus::{rtu, Bus, BusPoll};
use crate::clock::Millis;
use crate::constants::{
    BITS_PER_CHARACTER, MODBUS_READ_HOLDING_REGISTERS, MODBUS_READ_INPUT_REGISTERS, MODBUS_REQUEST_LEN,
    SDM_HOLDING_SERIAL_NUMBER,
};
use crate::error::SlaveError;
use crate::publish::{ErrorSummary, Publisher};
use crate::util::logging::LogThrottle;

/// Bus timing shared by all slaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// Minimum pause between raising the direction line and sending.
    pub transmit_delay_ms: u32,
    /// Time allowed for a response after the line was released.
    pub response_timeout_ms: u32,
    /// Read function used for register blocks.
    pub function: u8,
    /// Pause before asking a slave for its serial number again.
    pub identity_retry_ms: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            transmit_delay_ms: 2,
            response_timeout_ms: 500,
            function: MODBUS_READ_INPUT_REGISTERS,
            identity_retry_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollState {
    Standby,
    Idle,
    PrepareTransmit,
    Transmitting,
    AwaitingResponse,
    Decoding,
    AdvanceBlock,
    Publishing,
}

/// The active poll of one slave.
#[derive(Debug)]
struct PollCycle {
    slave: usize,
    block: usize,
    deadline: Millis,
    release_at: Millis,
    line_released: bool,
    response: Option<Bytes>,
    tainted: Option<SlaveError>,
    summary_published: bool,
}

impl PollCycle {
    fn new(slave: usize) -> Self {
        Self {
            slave,
            block: 0,
            deadline: Millis::ZERO,
            release_at: Millis::ZERO,
            line_released: true,
            response: None,
            tainted: None,
            summary_published: false,
        }
    }
}

/// A serial number request in flight.
#[derive(Debug)]
struct IdentityQuery {
    slave: usize,
    sent: bool,
    deadline: Millis,
    release_at: Millis,
    line_released: bool,
}

/// Multi-slave polling state machine.
pub struct PollScheduler {
    config: PollConfig,
    slaves: Vec<Slave>,
    state: PollState,
    cycle: Option<PollCycle>,
    identity_query: Option<IdentityQuery>,
    scratch: ScratchMap,
    identity_log: LogThrottle,
}

impl PollScheduler {
    pub fn new(config: PollConfig, slaves: Vec<SlaveConfig>) -> Self {
        let slaves: Vec<Slave> = slaves.into_iter().map(Slave::new).collect();
        let capacity = slaves
            .iter()
            .map(|s| s.config.layout.registers.len())
            .max()
            .unwrap_or(0);
        let state = if slaves.iter().any(Slave::enabled) {
            PollState::Idle
        } else {
            info!("No enabled slaves, poll scheduler in standby");
            PollState::Standby
        };

        Self {
            config,
            slaves,
            state,
            cycle: None,
            identity_query: None,
            scratch: ScratchMap::with_capacity(capacity),
            identity_log: LogThrottle::new(60_000, 3),
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn slaves(&self) -> &[Slave] {
        &self.slaves
    }

    pub fn slave(&self, index: usize) -> Option<&Slave> {
        self.slaves.get(index)
    }

    /// Index of the slave being polled, if a cycle is active.
    pub fn active_slave(&self) -> Option<usize> {
        self.cycle.as_ref().map(|c| c.slave)
    }

    /// Index of the register block being read, if a cycle is active.
    pub fn active_block(&self) -> Option<usize> {
        self.cycle.as_ref().map(|c| c.block)
    }

    /// Values read in the active cycle and not yet published.
    pub fn pending_values(&self) -> usize {
        self.scratch.pending()
    }

    /// Advances the state machine by one step.
    pub fn tick(&mut self, now: Millis, bus: &mut dyn Bus, publisher: &mut dyn Publisher) {
        match self.state {
            PollState::Standby => {}
            PollState::Idle => self.scan(now, bus),
            _ => match self.cycle.take() {
                Some(mut cycle) => {
                    if self.step(&mut cycle, now, bus, publisher) {
                        self.cycle = Some(cycle);
                    }
                }
                None => self.set_state(PollState::Idle),
            },
        }
    }

    /// Index of the slave asked for its serial number, if a request is in flight.
    pub fn identity_pending(&self) -> Option<usize> {
        self.identity_query.as_ref().map(|q| q.slave)
    }

    fn scan(&mut self, now: Millis, bus: &mut dyn Bus) {
        if let Some(mut query) = self.identity_query.take() {
            if self.step_identity(&mut query, now, bus) {
                self.identity_query = Some(query);
            }
            return;
        }

        let settle = self.settle_ms(bus.baudrate());
        for index in 0..self.slaves.len() {
            let slave = &mut self.slaves[index];
            if !slave.enabled() {
                continue;
            }

            if slave.identity.is_none() {
                if !slave.identity_retry_due(now) {
                    continue;
                }
                debug!("slave {}: requesting serial number", slave.name());
                bus.enable_transmit();
                self.identity_query = Some(IdentityQuery {
                    slave: index,
                    sent: false,
                    deadline: now.add_ms(settle),
                    release_at: Millis::ZERO,
                    line_released: false,
                });
                return;
            }

            if slave.is_due(now) {
                slave.last_poll = now;
                debug!("slave {}: starting poll cycle", slave.name());
                self.scratch.begin(&slave.config.layout);
                self.cycle = Some(PollCycle::new(index));
                self.set_state(PollState::PrepareTransmit);
                return;
            }
        }
    }

    /// Runs one step of a serial number request; false once it is settled.
    fn step_identity(&mut self, query: &mut IdentityQuery, now: Millis, bus: &mut dyn Bus) -> bool {
        let address = self.slaves[query.slave].address();

        if !query.sent {
            if !now.reached(query.deadline) {
                return true;
            }
            let block = RegisterBlock::single(SDM_HOLDING_SERIAL_NUMBER);
            if let Err(e) = bus.send_request(address, MODBUS_READ_HOLDING_REGISTERS, &block) {
                warn!("slave {}: serial number request failed: {}", self.slaves[query.slave].name(), e);
                release_line(&mut query.line_released, bus);
                self.identity_failed(query.slave, now, SlaveError::Timeout);
                return false;
            }
            query.sent = true;
            query.release_at = now.add_ms(wire_time_ms(MODBUS_REQUEST_LEN, bus.baudrate()));
            query.deadline = query.release_at.add_ms(self.config.response_timeout_ms);
            return true;
        }

        if now.reached(query.release_at) {
            release_line(&mut query.line_released, bus);
        }
        let result = match bus.poll_response() {
            BusPoll::Complete(frame) => rtu::parse_serial_number(&frame, address),
            BusPoll::Pending if now.reached(query.deadline) => {
                let partial = bus.take_received();
                if partial.is_empty() {
                    Err(SlaveError::Timeout)
                } else {
                    Err(rtu::classify_partial(&partial, address, MODBUS_READ_HOLDING_REGISTERS, 2))
                }
            }
            BusPoll::Pending => return true,
        };
        release_line(&mut query.line_released, bus);

        match result {
            Ok(serial) => {
                let slave = &mut self.slaves[query.slave];
                info!("slave {}: serial number {}", slave.name(), serial);
                slave.resolve_identity(serial);
            }
            Err(e) => self.identity_failed(query.slave, now, e),
        }
        false
    }

    fn identity_failed(&mut self, index: usize, now: Millis, error: SlaveError) {
        let slave = &mut self.slaves[index];
        slave.identity_retry_at = Some(now.add_ms(self.config.identity_retry_ms));
        if self.identity_log.allow() {
            warn!("slave {}: identity query failed: {}", slave.name(), error);
        }
    }

    /// Runs one step of the active cycle; false once the cycle is over.
    fn step(
        &mut self,
        cycle: &mut PollCycle,
        now: Millis,
        bus: &mut dyn Bus,
        publisher: &mut dyn Publisher,
    ) -> bool {
        match self.state {
            PollState::PrepareTransmit => {
                bus.enable_transmit();
                cycle.line_released = false;
                cycle.deadline = now.add_ms(self.settle_ms(bus.baudrate()));
                self.set_state(PollState::Transmitting);
            }
            PollState::Transmitting => {
                if now.reached(cycle.deadline) {
                    self.transmit(cycle, now, bus);
                }
            }
            PollState::AwaitingResponse => {
                if now.reached(cycle.release_at) {
                    release_line(&mut cycle.line_released, bus);
                }
                match bus.poll_response() {
                    BusPoll::Complete(frame) => {
                        release_line(&mut cycle.line_released, bus);
                        cycle.response = Some(frame);
                        self.set_state(PollState::Decoding);
                    }
                    BusPoll::Pending => {
                        if now.reached(cycle.deadline) {
                            release_line(&mut cycle.line_released, bus);
                            let partial = bus.take_received();
                            let error = self.classify_timeout(cycle, &partial);
                            self.fail(cycle, error);
                        }
                    }
                }
            }
            PollState::Decoding => self.decode(cycle),
            PollState::AdvanceBlock => {
                let blocks = self.slaves[cycle.slave].config.layout.blocks.len();
                if cycle.block + 1 < blocks {
                    cycle.block += 1;
                    self.set_state(PollState::PrepareTransmit);
                } else {
                    self.set_state(PollState::Publishing);
                }
            }
            PollState::Publishing => return self.publish_next(cycle, publisher),
            PollState::Idle | PollState::Standby => return false,
        }
        true
    }

    fn transmit(&mut self, cycle: &mut PollCycle, now: Millis, bus: &mut dyn Bus) {
        let slave = &self.slaves[cycle.slave];
        let Some(block) = slave.config.layout.blocks.get(cycle.block).copied() else {
            release_line(&mut cycle.line_released, bus);
            self.set_state(PollState::Publishing);
            return;
        };

        match bus.send_request(slave.address(), self.config.function, &block) {
            Ok(()) => {
                let wire_ms = wire_time_ms(MODBUS_REQUEST_LEN, bus.baudrate());
                cycle.release_at = now.add_ms(wire_ms);
                cycle.deadline = cycle.release_at.add_ms(self.config.response_timeout_ms);
                self.set_state(PollState::AwaitingResponse);
            }
            Err(e) => {
                warn!("slave {}: request failed: {}", slave.name(), e);
                release_line(&mut cycle.line_released, bus);
                self.fail(cycle, SlaveError::Timeout);
            }
        }
    }

    fn decode(&mut self, cycle: &mut PollCycle) {
        let slave = &self.slaves[cycle.slave];
        let frame = cycle.response.take().unwrap_or_default();
        let Some(block) = slave.config.layout.blocks.get(cycle.block).copied() else {
            self.set_state(PollState::AdvanceBlock);
            return;
        };

        let count = block.register_count();
        match rtu::parse_read_response(&frame, slave.address(), self.config.function, count) {
            Ok(data) => {
                for (address, value) in block.float_addresses().zip(rtu::registers_as_f32(data)) {
                    self.scratch.insert(address, value);
                }
                self.slaves[cycle.slave].record_success();
                self.set_state(PollState::AdvanceBlock);
            }
            Err(e) => self.fail(cycle, e),
        }
    }

    fn publish_next(&mut self, cycle: &mut PollCycle, publisher: &mut dyn Publisher) -> bool {
        let slave = &self.slaves[cycle.slave];

        if cycle.tainted.is_some() && !cycle.summary_published {
            let summary = ErrorSummary {
                success: slave.success,
                fail: slave.errors,
                last_error: slave.last_error,
            };
            publisher.publish_error(slave.name(), &summary);
            self.scratch.clear();
            cycle.summary_published = true;
            return true;
        }

        if let Some((index, value)) = self.scratch.take_next() {
            if let Some(def) = slave.config.layout.register(index) {
                let key = format!("{}/{}", slave.name(), def.name);
                publisher.publish(&key, &format!("{:.*}", def.precision as usize, value));
            }
            return true;
        }

        let slave = &mut self.slaves[cycle.slave];
        if slave.identity_fresh {
            if let Some(identity) = slave.identity {
                publisher.publish_identity(slave.name(), &identity);
            }
            slave.identity_fresh = false;
        }
        debug!("slave {}: poll cycle finished", slave.name());
        self.set_state(PollState::Idle);
        false
    }

    fn classify_timeout(&self, cycle: &PollCycle, partial: &[u8]) -> SlaveError {
        let slave = &self.slaves[cycle.slave];
        let count = slave
            .config
            .layout
            .blocks
            .get(cycle.block)
            .map(RegisterBlock::register_count)
            .unwrap_or(2);
        rtu::classify_partial(partial, slave.address(), self.config.function, count)
    }

    fn fail(&mut self, cycle: &mut PollCycle, error: SlaveError) {
        let slave = &mut self.slaves[cycle.slave];
        warn!(
            "slave {}: block {} failed: {} (code {})",
            slave.name(),
            cycle.block,
            error,
            error.code()
        );
        slave.record_error(error);
        cycle.tainted = Some(error);
        self.set_state(PollState::Publishing);
    }

    /// Settle time between raising the line and sending: the configured
    /// delay, but never less than the 3.5 character inter-frame silence.
    fn settle_ms(&self, baudrate: u32) -> u32 {
        let silence = (35 * 1000u32).div_ceil(baudrate.max(1));
        self.config.transmit_delay_ms.max(silence)
    }

    fn set_state(&mut self, next: PollState) {
        if self.state != next {
            debug!("poll: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

fn release_line(released: &mut bool, bus: &mut dyn Bus) {
    if !*released {
        bus.disable_transmit();
        *released = true;
    }
}

/// Milliseconds needed to clock `bytes` onto the wire, rounded up.
pub fn wire_time_ms(bytes: usize, baudrate: u32) -> u32 {
    (bytes as u32 * BITS_PER_CHARACTER * 1000).div_ceil(baudrate.max(1))
}
