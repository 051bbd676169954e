//! Gateway Protocol Constants
//!
//! This module defines the byte-exact framing constants for SML bursts and the
//! Modbus RTU / SDM energy meter constants used by the polling side.

// ----------------------------------------------------------------------------
// SML transport framing
// ----------------------------------------------------------------------------

/// SML escape sequence followed by the version 1 start marker
pub const SML_START_SEQUENCE: [u8; 8] = [0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01];

/// SML escape sequence followed by the end-of-message marker
pub const SML_END_SEQUENCE: [u8; 5] = [0x1B, 0x1B, 0x1B, 0x1B, 0x1A];

/// End marker plus fill-count byte and two CRC bytes
pub const SML_TRAILER_LENGTH: usize = 8;

/// Default channel buffer size (one second of data at 9600 baud)
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Largest burst a serial bridge FIFO hands over at once
pub const TRANSPORT_FIFO_SIZE: usize = 64;

// ----------------------------------------------------------------------------
// Modbus RTU
// ----------------------------------------------------------------------------

pub const MODBUS_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const MODBUS_READ_INPUT_REGISTERS: u8 = 0x04;

/// Set on the function code of an exception response
pub const MODBUS_EXCEPTION_FLAG: u8 = 0x80;

pub const MODBUS_EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;
pub const MODBUS_EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
pub const MODBUS_EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;
pub const MODBUS_EXCEPTION_SLAVE_DEVICE_FAILURE: u8 = 0x04;

/// Address, function, exception code and two CRC bytes
pub const MODBUS_MIN_RESPONSE_LEN: usize = 5;

/// Address, function, start (2), quantity (2) and CRC (2)
pub const MODBUS_REQUEST_LEN: usize = 8;

/// Protocol limit for a single read request
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

pub const MODBUS_MIN_SLAVE_ADDRESS: u8 = 1;
pub const MODBUS_MAX_SLAVE_ADDRESS: u8 = 247;

/// Bits on the wire per character (start, 8 data, stop)
pub const BITS_PER_CHARACTER: u32 = 10;

// ----------------------------------------------------------------------------
// SDM energy meter register map (input registers, float32 pairs)
// ----------------------------------------------------------------------------

pub const SDM_PHASE_1_VOLTAGE: u16 = 0x0000;
pub const SDM_PHASE_2_VOLTAGE: u16 = 0x0002;
pub const SDM_PHASE_3_VOLTAGE: u16 = 0x0004;
pub const SDM_PHASE_1_CURRENT: u16 = 0x0006;
pub const SDM_PHASE_2_CURRENT: u16 = 0x0008;
pub const SDM_PHASE_3_CURRENT: u16 = 0x000A;
pub const SDM_PHASE_1_POWER: u16 = 0x000C;
pub const SDM_PHASE_2_POWER: u16 = 0x000E;
pub const SDM_PHASE_3_POWER: u16 = 0x0010;
pub const SDM_SUM_LINE_CURRENT: u16 = 0x0030;
pub const SDM_TOTAL_SYSTEM_POWER: u16 = 0x0034;
pub const SDM_TOTAL_SYSTEM_APPARENT_POWER: u16 = 0x0038;
pub const SDM_TOTAL_SYSTEM_REACTIVE_POWER: u16 = 0x003C;
pub const SDM_TOTAL_SYSTEM_POWER_FACTOR: u16 = 0x003E;
pub const SDM_TOTAL_SYSTEM_PHASE_ANGLE: u16 = 0x0042;
pub const SDM_FREQUENCY: u16 = 0x0046;
pub const SDM_IMPORT_ACTIVE_ENERGY: u16 = 0x0048;
pub const SDM_EXPORT_ACTIVE_ENERGY: u16 = 0x004A;
pub const SDM_LINE_1_TO_LINE_2_VOLTS: u16 = 0x00C8;
pub const SDM_LINE_2_TO_LINE_3_VOLTS: u16 = 0x00CA;
pub const SDM_LINE_3_TO_LINE_1_VOLTS: u16 = 0x00CC;
pub const SDM_NEUTRAL_CURRENT: u16 = 0x00E0;

/// Holding register carrying the meter serial number (u32, two registers)
pub const SDM_HOLDING_SERIAL_NUMBER: u16 = 0xFC00;
