//! Tests for the error enums and their `Display` output.

use sml_gateway::{BusError, FrameError, GatewayError, SlaveError};

/// Tests that slave errors read the way they are published under `last_error`.
#[test]
fn test_slave_error_text() {
    assert_eq!(SlaveError::IllegalDataAddress.to_string(), "illegal data address");
    assert_eq!(SlaveError::ChecksumError.to_string(), "crc error");
    assert_eq!(SlaveError::WrongBytes.to_string(), "wrong bytes");
    assert_eq!(SlaveError::Timeout.to_string(), "timeout");
    assert_eq!(SlaveError::Unknown(11).to_string(), "unknown: 11");
}

/// Tests that exception codes 1 to 4 keep their own numbers.
#[test]
fn test_exception_codes_round_through_taxonomy() {
    for code in 1..=4u8 {
        assert_eq!(SlaveError::from_exception_code(code).code(), code);
    }
    assert_eq!(SlaveError::WrongBytes.code(), 6);
}

/// Tests that frame errors carry their lengths into the message.
#[test]
fn test_frame_error_text() {
    let err = FrameError::FrameTooShort { len: 8, min: 16 };
    assert_eq!(err.to_string(), "Frame too short: 8 bytes, need at least 16");

    let err = FrameError::BufferOverflow {
        capacity: 1000,
        attempted: 1064,
    };
    assert_eq!(err.to_string(), "Buffer overflow: 1064 bytes exceed capacity 1000");
}

/// Tests that bus and frame errors convert into the crate-level error.
#[test]
fn test_gateway_error_conversions() {
    let err: GatewayError = BusError::RequestTooLarge(130).into();
    assert_eq!(err.to_string(), "Bus error: Request too large: 130 registers");

    let err: GatewayError = FrameError::EndMarkerMismatch.into();
    assert_eq!(err.to_string(), "Frame error: End marker mismatch");

    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: GatewayError = io.into();
    assert!(matches!(err, GatewayError::Io(_)));
}

/// Tests that a serial error message is kept verbatim.
#[test]
fn test_bus_serial_error() {
    let err = BusError::Serial("device busy".to_string());
    assert_eq!(err.to_string(), "Serial port error: device busy");
}
