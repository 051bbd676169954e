#![no_main]

use libfuzzer_sys::fuzz_target;
use sml_gateway::bus::rtu::{classify_partial, parse_read_response, parse_serial_number, registers_as_f32};
use sml_gateway::constants::MODBUS_READ_INPUT_REGISTERS;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let count = u16::from(data[0] % 126);
    let frame = &data[1..];

    if let Ok(payload) = parse_read_response(frame, 1, MODBUS_READ_INPUT_REGISTERS, count) {
        assert_eq!(payload.len(), count as usize * 2);
        let _ = registers_as_f32(payload).count();
    }
    let _ = classify_partial(frame, 1, MODBUS_READ_INPUT_REGISTERS, count);
    let _ = parse_serial_number(frame, 1);
});
