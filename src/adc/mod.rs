pub mod ads7952;

pub use ads7952::Ads7952;

use crate::spi_device::BusError;
use crate::types::N_ADC_CHANNELS;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcError {
    Spi,
    ChipSelect,
    /// A channel never came back in the scan.
    MissingChannel,
}

impl From<BusError> for AdcError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Spi => AdcError::Spi,
            BusError::ChipSelect => AdcError::ChipSelect,
        }
    }
}

/// Boundary to the thermistor ADC.
pub trait TemperatureFrontEnd {
    /// Raw codes, one per thermistor channel.
    fn read_channels(&mut self, out: &mut [u16; N_ADC_CHANNELS]) -> Result<(), AdcError>;
}
