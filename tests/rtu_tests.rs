//! Tests for the Modbus RTU codec against captured SDM630 traffic.

use sml_gateway::bus::rtu::{
    build_read_request, build_serial_number_request, crc16, expected_response_len,
    parse_read_response, parse_serial_number, registers_as_f32, response_complete,
};
use sml_gateway::constants::{
    MODBUS_READ_HOLDING_REGISTERS, MODBUS_READ_INPUT_REGISTERS, SDM_FREQUENCY,
    SDM_PHASE_1_VOLTAGE,
};
use sml_gateway::poll::RegisterBlock;
use sml_gateway::util::hex::decode_hex;
use sml_gateway::SlaveError;

/// Tests the CRC against the standard check value of CRC-16/MODBUS.
#[test]
fn test_crc_check_value() {
    assert_eq!(crc16(b"123456789"), 0x4B37);
}

/// Tests that the frequency request matches a captured request byte for byte.
#[test]
fn test_frequency_request_bytes() {
    let request = build_read_request(1, MODBUS_READ_INPUT_REGISTERS, SDM_FREQUENCY, 2).unwrap();
    assert_eq!(&request[..6], &[0x01, 0x04, 0x00, 0x46, 0x00, 0x02]);
    assert_eq!(crc16(&request), 0x0000);
}

/// Tests that the serial number request addresses holding register 0xFC00.
#[test]
fn test_serial_number_request() {
    let request = build_serial_number_request(1).unwrap();
    assert_eq!(&request[..6], &[0x01, 0x03, 0xFC, 0x00, 0x00, 0x02]);
}

/// Tests that a captured voltage response decodes to the expected float.
#[test]
fn test_captured_voltage_response() {
    // 230.0 V = 0x43660000
    let mut frame = decode_hex("01 04 04 43 66 00 00").unwrap();
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());

    let block = RegisterBlock::single(SDM_PHASE_1_VOLTAGE);
    let count = block.register_count();
    assert_eq!(expected_response_len(count), frame.len());
    assert!(response_complete(&frame, MODBUS_READ_INPUT_REGISTERS, frame.len()));

    let data = parse_read_response(&frame, 1, MODBUS_READ_INPUT_REGISTERS, count).unwrap();
    let values: Vec<f32> = registers_as_f32(data).collect();
    assert_eq!(values, vec![230.0]);
}

/// Tests that a response with the wrong byte count is rejected.
#[test]
fn test_wrong_byte_count() {
    let mut frame = vec![0x01, 0x04, 0x02, 0x43, 0x66, 0x00, 0x00];
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    assert_eq!(
        parse_read_response(&frame, 1, MODBUS_READ_INPUT_REGISTERS, 2),
        Err(SlaveError::WrongBytes)
    );
}

/// Tests that an answer to a different function code is rejected.
#[test]
fn test_wrong_function() {
    let mut frame = vec![0x01, 0x03, 0x04, 0x43, 0x66, 0x00, 0x00];
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    assert_eq!(
        parse_read_response(&frame, 1, MODBUS_READ_INPUT_REGISTERS, 2),
        Err(SlaveError::WrongBytes)
    );
}

/// Tests that a short frame is reported as not enough bytes.
#[test]
fn test_truncated_response() {
    assert_eq!(
        parse_read_response(&[0x01, 0x04, 0x04], 1, MODBUS_READ_INPUT_REGISTERS, 2),
        Err(SlaveError::NotEnoughBytes)
    );
    assert!(!response_complete(&[0x01, 0x04, 0x04, 0x43], MODBUS_READ_INPUT_REGISTERS, 9));
}

/// Tests that an exception frame with a broken checksum is a CRC error, not an
/// exception.
#[test]
fn test_exception_with_bad_crc() {
    let frame = [0x01, 0x84, 0x02, 0x00, 0x00];
    assert_eq!(
        parse_read_response(&frame, 1, MODBUS_READ_INPUT_REGISTERS, 2),
        Err(SlaveError::ChecksumError)
    );
}

/// Tests decoding of a serial number response.
#[test]
fn test_serial_number_response() {
    let mut frame = vec![0x02, MODBUS_READ_HOLDING_REGISTERS, 0x04, 0x01, 0x31, 0x2D, 0x00];
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    assert_eq!(parse_serial_number(&frame, 2), Ok(0x0131_2D00));
}
