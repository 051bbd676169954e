//! # Modbus RTU Codec
//!
//! Request building and response decoding for the two read functions the
//! poller uses. Frames carry a CRC-16/MODBUS checksum, low byte first.
//!
//! SDM meters expose every quantity as an IEEE-754 float spread over two
//! big-endian registers, so register counts here are always even.
//!
//! ```rust
//! use sml_gateway::bus::rtu::{build_read_request, crc16};
//!
//! let request = build_read_request(1, 0x04, 0x0000, 2).unwrap();
//! assert_eq!(request, [0x01, 0x04, 0x00, 0x00, 0x00, 0x02, 0x71, 0xCB]);
//! assert_eq!(crc16(&request[..6]), 0xCB71);
//! ```

use crc::{Crc, CRC_16_MODBUS};
use nom::bytes::complete::take;
use nom::number::complete::{be_u8, le_u16};
use nom::IResult;

use crate::constants::{
    MODBUS_EXCEPTION_FLAG, MODBUS_MAX_READ_REGISTERS, MODBUS_MIN_RESPONSE_LEN,
    MODBUS_READ_HOLDING_REGISTERS, MODBUS_REQUEST_LEN, SDM_HOLDING_SERIAL_NUMBER,
};
use crate::error::{BusError, SlaveError};

const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC-16/MODBUS of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    MODBUS_CRC.checksum(data)
}

/// Builds a read request for `count` registers starting at `start`.
pub fn build_read_request(
    address: u8,
    function: u8,
    start: u16,
    count: u16,
) -> Result<[u8; MODBUS_REQUEST_LEN], BusError> {
    if count == 0 || count > MODBUS_MAX_READ_REGISTERS {
        return Err(BusError::RequestTooLarge(count));
    }

    let mut request = [0u8; MODBUS_REQUEST_LEN];
    request[0] = address;
    request[1] = function;
    request[2..4].copy_from_slice(&start.to_be_bytes());
    request[4..6].copy_from_slice(&count.to_be_bytes());
    let crc = crc16(&request[..6]);
    request[6..8].copy_from_slice(&crc.to_le_bytes());
    Ok(request)
}

/// Length of a normal response to a read of `count` registers.
pub fn expected_response_len(count: u16) -> usize {
    // address, function, byte count, data, crc
    3 + 2 * count as usize + 2
}

/// True once `buf` holds either the full normal response or an exception frame.
pub fn response_complete(buf: &[u8], function: u8, expected_len: usize) -> bool {
    if buf.len() >= MODBUS_MIN_RESPONSE_LEN && buf[1] == function | MODBUS_EXCEPTION_FLAG {
        return true;
    }
    buf.len() >= expected_len
}

struct Header {
    address: u8,
    function: u8,
    byte_count: u8,
}

fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, address) = be_u8(input)?;
    let (input, function) = be_u8(input)?;
    let (input, byte_count) = be_u8(input)?;
    Ok((
        input,
        Header {
            address,
            function,
            byte_count,
        },
    ))
}

fn parse_body(input: &[u8], len: usize) -> IResult<&[u8], (&[u8], u16)> {
    let (input, data) = take(len)(input)?;
    let (input, crc) = le_u16(input)?;
    Ok((input, (data, crc)))
}

/// Validates a read response and returns its register payload.
///
/// Check order: length, exception frame, checksum, then address, function
/// and byte count against the request.
pub fn parse_read_response(
    frame: &[u8],
    address: u8,
    function: u8,
    count: u16,
) -> Result<&[u8], SlaveError> {
    if frame.len() < MODBUS_MIN_RESPONSE_LEN {
        return Err(SlaveError::NotEnoughBytes);
    }

    if frame[1] == function | MODBUS_EXCEPTION_FLAG {
        let exception = &frame[..MODBUS_MIN_RESPONSE_LEN];
        let received = u16::from_le_bytes([exception[3], exception[4]]);
        if crc16(&exception[..3]) != received {
            return Err(SlaveError::ChecksumError);
        }
        if exception[0] != address {
            return Err(SlaveError::WrongBytes);
        }
        return Err(SlaveError::from_exception_code(exception[2]));
    }

    let expected = expected_response_len(count);
    if frame.len() < expected {
        return Err(SlaveError::NotEnoughBytes);
    }
    let frame = &frame[..expected];

    let (rest, header) = parse_header(frame).map_err(|_| SlaveError::NotEnoughBytes)?;
    let data_len = expected - 5;
    let (_, (data, received_crc)) =
        parse_body(rest, data_len).map_err(|_| SlaveError::NotEnoughBytes)?;

    if crc16(&frame[..expected - 2]) != received_crc {
        return Err(SlaveError::ChecksumError);
    }

    if header.address != address
        || header.function != function
        || header.byte_count as usize != data_len
    {
        return Err(SlaveError::WrongBytes);
    }

    Ok(data)
}

/// Interprets a register payload as consecutive big-endian floats.
pub fn registers_as_f32(data: &[u8]) -> impl Iterator<Item = f32> + '_ {
    data.chunks_exact(4)
        .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
}

/// Request for the meter serial number (two holding registers at 0xFC00).
pub fn build_serial_number_request(address: u8) -> Result<[u8; MODBUS_REQUEST_LEN], BusError> {
    build_read_request(address, MODBUS_READ_HOLDING_REGISTERS, SDM_HOLDING_SERIAL_NUMBER, 2)
}

/// Decodes the serial number response.
pub fn parse_serial_number(frame: &[u8], address: u8) -> Result<u32, SlaveError> {
    let data = parse_read_response(frame, address, MODBUS_READ_HOLDING_REGISTERS, 2)?;
    Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

/// Classifies whatever arrived before a response deadline expired.
///
/// Anything shorter than an exception frame is `NotEnoughBytes`. Longer
/// leftovers are checked header first, so an exception or response for
/// another slave or function reads as `WrongBytes` rather than as a short
/// frame.
pub fn classify_partial(frame: &[u8], address: u8, function: u8, count: u16) -> SlaveError {
    if frame.len() < MODBUS_MIN_RESPONSE_LEN {
        return SlaveError::NotEnoughBytes;
    }

    if frame[1] & MODBUS_EXCEPTION_FLAG != 0 {
        let received = u16::from_le_bytes([frame[3], frame[4]]);
        if crc16(&frame[..3]) != received {
            return SlaveError::ChecksumError;
        }
        if frame[0] != address || frame[1] != function | MODBUS_EXCEPTION_FLAG {
            return SlaveError::WrongBytes;
        }
        return SlaveError::from_exception_code(frame[2]);
    }

    if frame[0] != address || frame[1] != function {
        return SlaveError::WrongBytes;
    }
    match parse_read_response(frame, address, function, count) {
        Err(e) => e,
        // A complete frame the bus never reported.
        Ok(_) => SlaveError::Timeout,
    }
}

/// Encodes a normal read response carrying `payload`; used by bus mocks and
/// tests.
pub fn encode_read_response(address: u8, function: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 5);
    frame.push(address);
    frame.push(function);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Encodes a response carrying the given float values.
pub fn encode_float_response(address: u8, function: u8, values: &[f32]) -> Vec<u8> {
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
    encode_read_response(address, function, &payload)
}

/// Encodes an exception response.
pub fn encode_exception(address: u8, function: u8, code: u8) -> Vec<u8> {
    let mut frame = vec![address, function | MODBUS_EXCEPTION_FLAG, code];
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}
