//! Register layouts and the per-cycle scratch map.

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// A named float register published after each cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDef {
    pub address: u16,
    pub name: String,
    /// Decimal places in the published value.
    #[serde(default)]
    pub precision: u8,
}

impl RegisterDef {
    pub fn new(address: u16, name: &str, precision: u8) -> Self {
        Self {
            address,
            name: name.to_string(),
            precision,
        }
    }
}

/// A contiguous range of float registers read in one request.
///
/// `end` is the address of the last float in the range. A block without an
/// end, or with an end below its start, reads a single float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBlock {
    pub start: u16,
    #[serde(default)]
    pub end: Option<u16>,
}

impl RegisterBlock {
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn single(start: u16) -> Self {
        Self { start, end: None }
    }

    /// Number of 16-bit registers requested, saturating at `u16::MAX` for
    /// ranges no request could carry.
    pub fn register_count(&self) -> u16 {
        match self.end {
            Some(end) if end >= self.start => {
                let count = u32::from(end) - u32::from(self.start) + 2;
                u16::try_from(count).unwrap_or(u16::MAX)
            }
            _ => 2,
        }
    }

    /// Addresses of the floats this block returns, in order.
    pub fn float_addresses(&self) -> impl Iterator<Item = u16> {
        let start = self.start;
        (0..self.register_count() / 2).map(move |i| start.wrapping_add(i * 2))
    }
}

/// Which registers a slave exposes and how to read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterLayout {
    pub registers: Vec<RegisterDef>,
    pub blocks: Vec<RegisterBlock>,
}

impl RegisterLayout {
    /// Eastron SDM630 three-phase meter.
    pub fn sdm630() -> Self {
        let registers = vec![
            RegisterDef::new(SDM_PHASE_1_VOLTAGE, "voltage_L1", 1),
            RegisterDef::new(SDM_PHASE_2_VOLTAGE, "voltage_L2", 1),
            RegisterDef::new(SDM_PHASE_3_VOLTAGE, "voltage_L3", 1),
            RegisterDef::new(SDM_PHASE_1_CURRENT, "current_L1", 3),
            RegisterDef::new(SDM_PHASE_2_CURRENT, "current_L2", 3),
            RegisterDef::new(SDM_PHASE_3_CURRENT, "current_L3", 3),
            RegisterDef::new(SDM_PHASE_1_POWER, "power_L1", 0),
            RegisterDef::new(SDM_PHASE_2_POWER, "power_L2", 0),
            RegisterDef::new(SDM_PHASE_3_POWER, "power_L3", 0),
            RegisterDef::new(SDM_SUM_LINE_CURRENT, "current_sum", 3),
            RegisterDef::new(SDM_TOTAL_SYSTEM_POWER, "power_total", 0),
            RegisterDef::new(SDM_TOTAL_SYSTEM_APPARENT_POWER, "power_apparent", 0),
            RegisterDef::new(SDM_TOTAL_SYSTEM_REACTIVE_POWER, "power_reactive", 0),
            RegisterDef::new(SDM_TOTAL_SYSTEM_POWER_FACTOR, "power_factor", 3),
            RegisterDef::new(SDM_TOTAL_SYSTEM_PHASE_ANGLE, "phase_angle", 0),
            RegisterDef::new(SDM_FREQUENCY, "frequency", 2),
            RegisterDef::new(SDM_NEUTRAL_CURRENT, "current_N", 3),
            RegisterDef::new(SDM_LINE_1_TO_LINE_2_VOLTS, "voltage_L1_L2", 1),
            RegisterDef::new(SDM_LINE_2_TO_LINE_3_VOLTS, "voltage_L2_L3", 1),
            RegisterDef::new(SDM_LINE_3_TO_LINE_1_VOLTS, "voltage_L3_L1", 1),
            RegisterDef::new(SDM_IMPORT_ACTIVE_ENERGY, "energy_import", 3),
            RegisterDef::new(SDM_EXPORT_ACTIVE_ENERGY, "energy_export", 3),
        ];
        let blocks = vec![
            RegisterBlock::new(SDM_PHASE_1_VOLTAGE, SDM_PHASE_3_POWER),
            RegisterBlock::new(SDM_SUM_LINE_CURRENT, SDM_FREQUENCY),
            RegisterBlock::new(SDM_LINE_1_TO_LINE_2_VOLTS, SDM_LINE_3_TO_LINE_1_VOLTS),
            RegisterBlock::new(SDM_IMPORT_ACTIVE_ENERGY, SDM_EXPORT_ACTIVE_ENERGY),
            RegisterBlock::single(SDM_NEUTRAL_CURRENT),
        ];
        Self { registers, blocks }
    }

    pub fn register(&self, index: usize) -> Option<&RegisterDef> {
        self.registers.get(index)
    }

    pub fn find(&self, address: u16) -> Option<&RegisterDef> {
        self.registers.iter().find(|r| r.address == address)
    }
}

/// Freshly read values of the active cycle, keyed by register address.
///
/// Entries follow the layout's register order. Capacity grows to the largest
/// layout once and is reused for every later cycle.
#[derive(Debug, Default)]
pub struct ScratchMap {
    entries: Vec<(u16, Option<f32>)>,
}

impl ScratchMap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Prepares the map for a cycle over `layout`, all values unset.
    pub fn begin(&mut self, layout: &RegisterLayout) {
        self.entries.clear();
        self.entries
            .extend(layout.registers.iter().map(|r| (r.address, None)));
    }

    /// Stores a value; addresses outside the layout and NaN are ignored.
    pub fn insert(&mut self, address: u16, value: f32) -> bool {
        if value.is_nan() {
            return false;
        }
        match self.entries.iter_mut().find(|(a, _)| *a == address) {
            Some(entry) => {
                entry.1 = Some(value);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the first set value with its layout index.
    pub fn take_next(&mut self) -> Option<(usize, f32)> {
        self.entries
            .iter_mut()
            .enumerate()
            .find_map(|(i, (_, v))| v.take().map(|value| (i, value)))
    }

    /// Unsets every value.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.1 = None;
        }
    }

    /// Number of values waiting to be published.
    pub fn pending(&self) -> usize {
        self.entries.iter().filter(|(_, v)| v.is_some()).count()
    }
}
