use std::sync::Arc;

use serde::Serialize;

use super::register::RegisterLayout;
use crate::clock::Millis;
use crate::error::SlaveError;

/// Static configuration of one polled meter.
#[derive(Debug, Clone)]
pub struct SlaveConfig {
    pub name: String,
    pub address: u8,
    /// Poll interval; 0 disables the slave.
    pub interval_ms: u32,
    pub layout: Arc<RegisterLayout>,
    /// Query the serial number before the first poll.
    pub discover_identity: bool,
}

impl SlaveConfig {
    pub fn new(name: &str, address: u8, interval_ms: u32, layout: Arc<RegisterLayout>) -> Self {
        Self {
            name: name.to_string(),
            address,
            interval_ms,
            layout,
            discover_identity: true,
        }
    }

    pub fn without_identity(mut self) -> Self {
        self.discover_identity = false;
        self
    }
}

/// What a slave reported about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlaveIdentity {
    pub address: u8,
    /// 0 when the meter does not report one.
    pub serial: u32,
}

/// Error counts by kind, kept alongside the totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorTally {
    pub checksum: u32,
    pub wrong_bytes: u32,
    pub not_enough_bytes: u32,
    pub timeout: u32,
    pub exception: u32,
}

impl ErrorTally {
    fn record(&mut self, error: SlaveError) {
        let counter = match error {
            SlaveError::ChecksumError => &mut self.checksum,
            SlaveError::WrongBytes => &mut self.wrong_bytes,
            SlaveError::NotEnoughBytes => &mut self.not_enough_bytes,
            SlaveError::Timeout => &mut self.timeout,
            _ => &mut self.exception,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Runtime record of a polled slave.
#[derive(Debug, Clone)]
pub struct Slave {
    pub config: SlaveConfig,
    pub last_poll: Millis,
    pub identity: Option<SlaveIdentity>,
    /// Identity resolved but not yet published.
    pub identity_fresh: bool,
    /// Earliest time for the next serial number request after a failed one.
    pub identity_retry_at: Option<Millis>,
    pub success: u32,
    pub errors: u32,
    pub last_error: Option<SlaveError>,
    pub tally: ErrorTally,
}

impl Slave {
    pub fn new(config: SlaveConfig) -> Self {
        // Without discovery the identity is just the address.
        let identity = (!config.discover_identity).then_some(SlaveIdentity {
            address: config.address,
            serial: 0,
        });
        Self {
            identity_fresh: identity.is_some(),
            identity,
            identity_retry_at: None,
            config,
            last_poll: Millis::ZERO,
            success: 0,
            errors: 0,
            last_error: None,
            tally: ErrorTally::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn address(&self) -> u8 {
        self.config.address
    }

    pub fn enabled(&self) -> bool {
        self.config.interval_ms > 0
    }

    pub fn is_due(&self, now: Millis) -> bool {
        now.since(self.last_poll) >= self.config.interval_ms
    }

    pub(crate) fn record_success(&mut self) {
        self.success = self.success.wrapping_add(1);
    }

    pub(crate) fn record_error(&mut self, error: SlaveError) {
        self.errors = self.errors.wrapping_add(1);
        self.last_error = Some(error);
        self.tally.record(error);
    }

    pub(crate) fn resolve_identity(&mut self, serial: u32) {
        self.identity = Some(SlaveIdentity {
            address: self.config.address,
            serial,
        });
        self.identity_fresh = true;
        self.identity_retry_at = None;
    }

    /// True when no serial number request is being held back.
    pub fn identity_retry_due(&self, now: Millis) -> bool {
        self.identity_retry_at.map_or(true, |at| now.reached(at))
    }
}
