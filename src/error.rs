//! # Gateway Error Handling
//!
//! This module defines the error types of the sml-gateway crate.
//!
//! The acquisition state machines never fail hard: `FrameError` and `SlaveError`
//! are recorded and logged while the machines return to idle. `BusError` covers
//! transport faults of a bus driver, and `GatewayError` is what the outer
//! surfaces (configuration loading, the CLI) report.

use thiserror::Error;

use crate::constants::{
    MODBUS_EXCEPTION_ILLEGAL_DATA_ADDRESS, MODBUS_EXCEPTION_ILLEGAL_DATA_VALUE,
    MODBUS_EXCEPTION_ILLEGAL_FUNCTION, MODBUS_EXCEPTION_SLAVE_DEVICE_FAILURE,
};

/// Reasons a channel discards its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The buffered burst cannot hold both markers.
    #[error("Frame too short: {len} bytes, need at least {min}")]
    FrameTooShort { len: usize, min: usize },

    /// The leading bytes are not the configured start marker.
    #[error("Start marker mismatch")]
    StartMarkerMismatch,

    /// The trailer does not begin with the configured end marker.
    #[error("End marker mismatch")]
    EndMarkerMismatch,

    /// Appending a burst would have exceeded the buffer capacity.
    #[error("Buffer overflow: {attempted} bytes exceed capacity {capacity}")]
    BufferOverflow { capacity: usize, attempted: usize },
}

/// Per-slave polling errors.
///
/// Codes follow the SDM meter numbering so that a `last_error` value read from
/// a status snapshot means the same thing as on the meter's own tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlaveError {
    #[error("illegal function")]
    IllegalFunction,

    #[error("illegal data address")]
    IllegalDataAddress,

    #[error("illegal data value")]
    IllegalDataValue,

    #[error("slave device failure")]
    SlaveDeviceFailure,

    #[error("crc error")]
    ChecksumError,

    /// Address, function code or byte count did not match the request.
    #[error("wrong bytes")]
    WrongBytes,

    #[error("not enough bytes")]
    NotEnoughBytes,

    /// No response at all (identity queries and bus write failures).
    #[error("timeout")]
    Timeout,

    #[error("unknown: {0}")]
    Unknown(u8),
}

impl SlaveError {
    /// Numeric error code as published in status snapshots.
    pub fn code(&self) -> u8 {
        match self {
            SlaveError::IllegalFunction => 1,
            SlaveError::IllegalDataAddress => 2,
            SlaveError::IllegalDataValue => 3,
            SlaveError::SlaveDeviceFailure => 4,
            SlaveError::ChecksumError => 5,
            SlaveError::WrongBytes => 6,
            SlaveError::NotEnoughBytes => 7,
            SlaveError::Timeout => 8,
            SlaveError::Unknown(code) => *code,
        }
    }

    /// Maps a Modbus exception code to the error taxonomy.
    pub fn from_exception_code(code: u8) -> Self {
        match code {
            MODBUS_EXCEPTION_ILLEGAL_FUNCTION => SlaveError::IllegalFunction,
            MODBUS_EXCEPTION_ILLEGAL_DATA_ADDRESS => SlaveError::IllegalDataAddress,
            MODBUS_EXCEPTION_ILLEGAL_DATA_VALUE => SlaveError::IllegalDataValue,
            MODBUS_EXCEPTION_SLAVE_DEVICE_FAILURE => SlaveError::SlaveDeviceFailure,
            other => SlaveError::Unknown(other),
        }
    }
}

/// Errors raised by a bus driver.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A register block spans more registers than one request may read.
    #[error("Request too large: {0} registers")]
    RequestTooLarge(u16),
}

impl From<tokio_serial::Error> for BusError {
    fn from(e: tokio_serial::Error) -> Self {
        BusError::Serial(e.to_string())
    }
}

/// Crate-level error for configuration loading and the command line.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// A catch-all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_codes_map_to_taxonomy() {
        assert_eq!(SlaveError::from_exception_code(1), SlaveError::IllegalFunction);
        assert_eq!(SlaveError::from_exception_code(4), SlaveError::SlaveDeviceFailure);
        assert_eq!(SlaveError::from_exception_code(0x0B), SlaveError::Unknown(0x0B));
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(SlaveError::ChecksumError.code(), 5);
        assert_eq!(SlaveError::NotEnoughBytes.code(), 7);
        assert_eq!(SlaveError::Timeout.code(), 8);
        assert_eq!(SlaveError::Unknown(42).code(), 42);
    }
}
