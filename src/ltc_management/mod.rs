pub mod ltc6804;
pub mod pec;

pub use ltc6804::Ltc6804;

use crate::balance::DischargeMask;
use crate::spi_device::BusError;
use crate::types::GroupId;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LtcError {
    Spi,
    ChipSelect,
    Pec,
}

impl From<BusError> for LtcError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Spi => LtcError::Spi,
            BusError::ChipSelect => LtcError::ChipSelect,
        }
    }
}

/// Boundary to the cell-monitoring chips, one chip per balancing group.
pub trait CellMonitor {
    /// Fills `out` with the group's raw cell readings, first cell first.
    fn read_cells(&mut self, group: GroupId, out: &mut [u16]) -> Result<(), LtcError>;

    /// Writes `mask` to the discharge switches of `group`'s chip, and only that chip.
    fn write_discharge(&mut self, group: GroupId, mask: DischargeMask) -> Result<(), LtcError>;
}
