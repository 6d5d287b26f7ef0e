pub mod bms;
pub use bms::{Cell, CellStore};

/// Cells held in the store, whether or not they sit in a balancing group.
pub const N_CELLS: usize = 16;
/// Voltages exported on the snapshot page (30-byte voltage buffer).
pub const N_CELLS_FINAL: usize = 15;
/// Length of each cell's sliding sample window.
pub const N_SAMPLES: usize = 10;
/// Thermistor channels on the ADS7952.
pub const N_ADC_CHANNELS: usize = 12;
/// Width of a per-chip discharge mask.
pub const GROUP_CELLS: usize = 4;

/// LTC6804 comparator thresholds, 100 uV per LSB.
#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Voltages {
    MaxVoltage = 42000,
    MinVoltage = 30000,
}

impl Voltages {
    pub fn as_raw(&self) -> u16 {
        *self as u16
    }
}

/// One monitoring chip and its half of the pack.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GroupId {
    Lower,
    Upper,
}

impl GroupId {
    pub const ALL: [GroupId; 2] = [GroupId::Lower, GroupId::Upper];

    pub fn index(&self) -> usize {
        match self {
            GroupId::Lower => 0,
            GroupId::Upper => 1,
        }
    }
}

/// Out-of-band command and response identifiers on the vehicle bus.
///
/// The core only names these; payloads are interpreted by the transmission layer.
#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandId {
    PmsDisconnectArray = 0x777,
    PmsDisconnectArrayResponse = 0x778,
    EnableBalancing = 0x888,
    EvdcDrive = 0x501,
    BpsTripSignal = 0x303,
    Mppt1Response = 0x771,
    Mppt2Response = 0x772,
    Mppt3Response = 0x773,
    Mppt4Response = 0x774,
}

impl CommandId {
    pub const ALL: [CommandId; 9] = [
        CommandId::PmsDisconnectArray,
        CommandId::PmsDisconnectArrayResponse,
        CommandId::EnableBalancing,
        CommandId::EvdcDrive,
        CommandId::BpsTripSignal,
        CommandId::Mppt1Response,
        CommandId::Mppt2Response,
        CommandId::Mppt3Response,
        CommandId::Mppt4Response,
    ];

    pub fn as_raw(&self) -> u16 {
        *self as u16
    }

    pub fn from_raw(id: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|cmd| cmd.as_raw() == id)
    }
}
