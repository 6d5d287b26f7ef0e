//! Snapshot page and the telemetry buffers packed from it each cycle.
//!
//! Everything on the wire is little-endian and packed, no padding.
use super::PageId;
use crate::balance::GroupMasks;
use crate::types::{CellStore, N_ADC_CHANNELS, N_CELLS, N_CELLS_FINAL};

pub const PAGE_LEN: usize = N_CELLS_FINAL * 2 + N_ADC_CHANNELS + 2 + 4;

pub const VOLTAGE_PAGE_LEN: usize = 30;
pub const TEMPERATURE_PAGE_LEN: usize = 24;
pub const CUR_BAL_STAT_PAGE_LEN: usize = 8;

const _: () = assert!(N_CELLS_FINAL * 2 == VOLTAGE_PAGE_LEN);
const _: () = assert!(N_ADC_CHANNELS * 2 == TEMPERATURE_PAGE_LEN);

/// Most recent view of the pack, rebuilt in full every cycle.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BmsPage {
    pub voltages: [u16; N_CELLS_FINAL],
    pub temps: [i8; N_ADC_CHANNELS],
    /// No current sensor yet, always 0.
    pub current: i16,
    /// Upper group in bits 4..8, lower group in bits 0..4.
    pub discharge: u32,
}

impl BmsPage {
    pub fn rebuild(&mut self, store: &CellStore, temperatures: &[f32; N_ADC_CHANNELS], masks: &GroupMasks) {
        for i in 0..N_CELLS.min(N_CELLS_FINAL) {
            self.voltages[i] = store.average_voltage(i);
        }
        for (slot, &t) in self.temps.iter_mut().zip(temperatures.iter()) {
            // truncates toward zero, saturates at the i8 range
            *slot = t as i8;
        }
        self.current = 0;
        self.discharge = masks.packed();
    }

    /// Wire layout: voltages, temperatures, current, discharge mask.
    pub fn to_bytes(&self) -> [u8; PAGE_LEN] {
        let mut out = [0u8; PAGE_LEN];
        let mut at = 0;
        for v in self.voltages {
            out[at..at + 2].copy_from_slice(&v.to_le_bytes());
            at += 2;
        }
        for t in self.temps {
            out[at] = t as u8;
            at += 1;
        }
        out[at..at + 2].copy_from_slice(&self.current.to_le_bytes());
        at += 2;
        out[at..at + 4].copy_from_slice(&self.discharge.to_le_bytes());
        out
    }
}

/// Backing storage of the three aggregated telemetry packets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetryBuffers {
    pub voltage: [u8; VOLTAGE_PAGE_LEN],
    /// Temperatures in 0.1 degC.
    pub temperature: [u8; TEMPERATURE_PAGE_LEN],
    /// Current, discharge mask, balancing flag, fault summary.
    pub cur_bal_stat: [u8; CUR_BAL_STAT_PAGE_LEN],
}

impl Default for TelemetryBuffers {
    fn default() -> Self {
        TelemetryBuffers {
            voltage: [0; VOLTAGE_PAGE_LEN],
            temperature: [0; TEMPERATURE_PAGE_LEN],
            cur_bal_stat: [0; CUR_BAL_STAT_PAGE_LEN],
        }
    }
}

impl TelemetryBuffers {
    pub fn pack(&mut self, page: &BmsPage, temperatures: &[f32; N_ADC_CHANNELS], balancing: bool, faults: u8) {
        for (chunk, v) in self.voltage.chunks_exact_mut(2).zip(page.voltages) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        for (chunk, &t) in self.temperature.chunks_exact_mut(2).zip(temperatures.iter()) {
            let deci = (t * 10.0) as i16;
            chunk.copy_from_slice(&deci.to_le_bytes());
        }
        self.cur_bal_stat[0..2].copy_from_slice(&page.current.to_le_bytes());
        self.cur_bal_stat[2..6].copy_from_slice(&page.discharge.to_le_bytes());
        self.cur_bal_stat[6] = balancing as u8;
        self.cur_bal_stat[7] = faults;
    }

    pub fn page(&self, id: PageId) -> &[u8] {
        match id {
            PageId::Voltage => &self.voltage,
            PageId::Temperature => &self.temperature,
            PageId::CurBalStat => &self.cur_bal_stat,
        }
    }
}
