use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use super::{AdcError, TemperatureFrontEnd};
use crate::spi_device;
use crate::types::N_ADC_CHANNELS;

const MODE_MANUAL: u16 = 0x1 << 12;
const PROGRAM: u16 = 1 << 11;
// 0 to 2 x VREF input range
const RANGE_2X: u16 = 1 << 6;

// A conversion result comes back two frames after the frame that selected it.
const PIPELINE_DEPTH: usize = 2;

const CODE_MASK: u16 = 0x0FFF;

/// Manual-mode frame selecting `channel` for the next conversion.
pub fn manual_command(channel: u8) -> u16 {
    MODE_MANUAL | PROGRAM | (((channel & 0x0F) as u16) << 7) | RANGE_2X
}

/// Channel address and 12-bit code of a returned frame.
pub fn decode_frame(word: u16) -> (usize, u16) {
    ((word >> 12) as usize, word & CODE_MASK)
}

/// 12-channel, 12-bit SAR ADC reading the thermistor dividers.
pub struct Ads7952<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI: SpiBus, CS: OutputPin> Ads7952<SPI, CS> {
    pub fn new(spi: SPI, cs: CS) -> Self {
        Ads7952 { spi, cs }
    }

    /// One 16-bit frame, selected by its own chip-select pulse.
    fn frame(&mut self, command: u16) -> Result<u16, AdcError> {
        let mut rx = [0u8; 2];
        spi_device::transfer(&mut self.spi, &mut self.cs, &mut rx, &command.to_be_bytes())?;
        Ok(u16::from_be_bytes(rx))
    }
}

impl<SPI: SpiBus, CS: OutputPin> TemperatureFrontEnd for Ads7952<SPI, CS> {
    fn read_channels(&mut self, out: &mut [u16; N_ADC_CHANNELS]) -> Result<(), AdcError> {
        let mut seen: u16 = 0;

        for frame in 0..N_ADC_CHANNELS + PIPELINE_DEPTH {
            // Trailing frames only flush the pipeline.
            let channel = if frame < N_ADC_CHANNELS { frame } else { 0 };
            let word = self.frame(manual_command(channel as u8))?;

            if frame >= PIPELINE_DEPTH {
                let (address, code) = decode_frame(word);
                if address < N_ADC_CHANNELS {
                    out[address] = code;
                    seen |= 1 << address;
                }
            }
        }

        if seen != (1 << N_ADC_CHANNELS) - 1 {
            return Err(AdcError::MissingChannel);
        }
        Ok(())
    }
}
