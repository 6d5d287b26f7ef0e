use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use super::pec::{calculate_pec, check_pec};
use super::{CellMonitor, LtcError};
use crate::balance::DischargeMask;
use crate::config::BmsConfig;
use crate::spi_device;
use crate::types::GroupId;

/// Write Configuration Register Group
pub const WRCFG: [u8; 2] = [0x00, 0x01];

/// Read Configuration Register Group
pub const RDCFG: [u8; 2] = [0x00, 0x02];

/// Read Cell Voltage Register Group A (cells 1-3)
pub const RDCVA: [u8; 2] = [0x00, 0x04];

/// Read Cell Voltage Register Group B (cells 4-6)
pub const RDCVB: [u8; 2] = [0x00, 0x06];

/// Start cell conversion, normal mode, discharge off during conversion, all cells
pub const ADCV: [u8; 2] = [0x03, 0x60];

// Normal-mode conversion of all twelve inputs takes 2.3 ms.
const CONVERSION_TIME_US: u32 = 3_000;

const CELLS_PER_REGISTER: usize = 3;
const REGISTER_LEN: usize = 6;

const REFON: u8 = 0x04; // Reference stays powered between conversions
const GPIOS: u8 = 0xF8; // GPIO1..5 pull-downs off

/// Command word followed by its PEC.
pub fn prepare_command(cmd: [u8; 2]) -> [u8; 4] {
    let mut cmd_f = [0u8; 4];
    cmd_f[0..2].copy_from_slice(&cmd);
    cmd_f[2..4].copy_from_slice(&calculate_pec(&cmd));
    cmd_f
}

/// CFGR0..CFGR5 with the comparator thresholds and the discharge bits.
///
/// Thresholds are in 100 uV units, as read from the cell registers.
pub fn config_register(mask: DischargeMask, under_voltage: u16, over_voltage: u16) -> [u8; 6] {
    let uv_val = (under_voltage / 16).saturating_sub(1);
    let ov_val = over_voltage / 16;

    [
        GPIOS | REFON,
        (uv_val & 0xFF) as u8,
        (((ov_val & 0xF) << 4) | ((uv_val & 0xF00) >> 8)) as u8,
        (ov_val >> 4) as u8,
        // DCC1..DCC4, cells past the group width stay off
        mask.bits(),
        0x00,
    ]
}

/// WRCFG frame: command, PEC, six configuration bytes, PEC.
pub fn write_config_frame(config: &[u8; 6]) -> [u8; 12] {
    let mut frame = [0u8; 12];
    frame[0..4].copy_from_slice(&prepare_command(WRCFG));
    frame[4..10].copy_from_slice(config);
    frame[10..12].copy_from_slice(&calculate_pec(config));
    frame
}

/// Three little-endian cell readings from a PEC-checked register block.
pub fn decode_cell_register(block: &[u8; 8]) -> Result<[u16; CELLS_PER_REGISTER], LtcError> {
    if !check_pec(block) {
        return Err(LtcError::Pec);
    }
    let mut cells = [0u16; CELLS_PER_REGISTER];
    for (i, cell) in cells.iter_mut().enumerate() {
        *cell = u16::from_le_bytes([block[2 * i], block[2 * i + 1]]);
    }
    Ok(cells)
}

/// Two LTC6804 chips on one SPI bus, each behind its own chip select.
pub struct Ltc6804<SPI, CS, D> {
    spi: SPI,
    lower_cs: CS,
    upper_cs: CS,
    delay: D,
    under_voltage: u16,
    over_voltage: u16,
}

impl<SPI, CS, D> Ltc6804<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, lower_cs: CS, upper_cs: CS, delay: D, config: &BmsConfig) -> Self {
        Ltc6804 {
            spi,
            lower_cs,
            upper_cs,
            delay,
            under_voltage: config.under_voltage,
            over_voltage: config.over_voltage,
        }
    }

    fn bus(&mut self, group: GroupId) -> (&mut SPI, &mut CS) {
        match group {
            GroupId::Lower => (&mut self.spi, &mut self.lower_cs),
            GroupId::Upper => (&mut self.spi, &mut self.upper_cs),
        }
    }

    /// Brings the chip's isoSPI port out of idle.
    pub fn wakeup(&mut self, group: GroupId) -> Result<(), LtcError> {
        let (spi, cs) = self.bus(group);
        spi_device::write(spi, cs, &[0xFF; 8])?;
        Ok(())
    }

    /// Clears every discharge switch and loads the comparator thresholds.
    pub fn init(&mut self) -> Result<(), LtcError> {
        for group in GroupId::ALL {
            self.wakeup(group)?;
            self.write_discharge(group, DischargeMask::CLEAR)?;
        }
        Ok(())
    }

    /// Configuration register as the chip reports it.
    pub fn read_config(&mut self, group: GroupId) -> Result<[u8; 6], LtcError> {
        let cmd = prepare_command(RDCFG);
        let mut block = [0u8; 8];
        let (spi, cs) = self.bus(group);
        spi_device::cmd_read(spi, cs, &cmd, &mut block)?;
        if !check_pec(&block) {
            return Err(LtcError::Pec);
        }
        let mut config = [0u8; 6];
        config.copy_from_slice(&block[..REGISTER_LEN]);
        Ok(config)
    }

    pub fn start_cell_conversion(&mut self, group: GroupId) -> Result<(), LtcError> {
        let cmd = prepare_command(ADCV);
        let (spi, cs) = self.bus(group);
        spi_device::write(spi, cs, &cmd)?;
        self.delay.delay_us(CONVERSION_TIME_US);
        Ok(())
    }

    fn read_register(&mut self, group: GroupId, register: [u8; 2]) -> Result<[u16; CELLS_PER_REGISTER], LtcError> {
        let cmd = prepare_command(register);
        let mut block = [0u8; 8]; // 6 data bytes + 2 PEC bytes
        let (spi, cs) = self.bus(group);
        spi_device::cmd_read(spi, cs, &cmd, &mut block)?;
        decode_cell_register(&block)
    }
}

impl<SPI, CS, D> CellMonitor for Ltc6804<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    fn read_cells(&mut self, group: GroupId, out: &mut [u16]) -> Result<(), LtcError> {
        self.wakeup(group)?;
        self.start_cell_conversion(group)?;

        for (chunk, register) in out.chunks_mut(CELLS_PER_REGISTER).zip([RDCVA, RDCVB]) {
            let cells = self.read_register(group, register)?;
            chunk.copy_from_slice(&cells[..chunk.len()]);
        }
        Ok(())
    }

    fn write_discharge(&mut self, group: GroupId, mask: DischargeMask) -> Result<(), LtcError> {
        let config = config_register(mask, self.under_voltage, self.over_voltage);
        let frame = write_config_frame(&config);
        let (spi, cs) = self.bus(group);
        spi_device::write(spi, cs, &frame)?;
        Ok(())
    }
}
