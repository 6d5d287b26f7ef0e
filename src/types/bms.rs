use crate::config::BalancingGroup;
use crate::filter::SampleWindow;

use super::{GROUP_CELLS, N_CELLS};

/// Fault summary bits, as packed in the balance-status telemetry buffer.
pub const FAULT_OV: u8 = 0x01;
pub const FAULT_UV: u8 = 0x02;
pub const FAULT_OT: u8 = 0x04;

#[derive(Default, Debug, Copy, Clone)]
pub struct Cell {
    voltage: u16,
    window: SampleWindow,
    ov_flag: bool,
    uv_flag: bool,
    ot_flag: bool,
    discharge_bit: Option<u8>,
}

impl Cell {
    pub const fn new() -> Self {
        Cell {
            voltage: 0,
            window: SampleWindow::new(),
            ov_flag: false,
            uv_flag: false,
            ot_flag: false,
            discharge_bit: None,
        }
    }

    /// Latest raw reading.
    pub fn voltage(&self) -> u16 {
        self.voltage
    }

    /// Sliding-window mean, the only value balancing and telemetry compare.
    pub fn average_voltage(&self) -> u16 {
        self.window.average()
    }

    pub fn samples(&self) -> &SampleWindow {
        &self.window
    }

    /// Bit position in the owning group's discharge mask.
    pub fn discharge_bit(&self) -> Option<u8> {
        self.discharge_bit
    }

    pub fn ov_flag(&self) -> bool {
        self.ov_flag
    }

    pub fn uv_flag(&self) -> bool {
        self.uv_flag
    }

    pub fn ot_flag(&self) -> bool {
        self.ot_flag
    }

    pub fn set_flags(&mut self, ov: bool, uv: bool, ot: bool) {
        self.ov_flag = ov;
        self.uv_flag = uv;
        self.ot_flag = ot;
    }

    fn update(&mut self, value: u16) {
        self.voltage = value;
        self.window.push(value);
    }
}

/// Per-cell state for the whole pack.
#[derive(Debug, Copy, Clone)]
pub struct CellStore {
    cells: [Cell; N_CELLS],
}

impl CellStore {
    pub fn new(groups: &[BalancingGroup]) -> Self {
        let mut cells = [Cell::new(); N_CELLS];
        for group in groups {
            // a mask has GROUP_CELLS bits, cells past that never bleed
            for (bit, i) in group.cells().take(GROUP_CELLS).enumerate() {
                if let Some(cell) = cells.get_mut(i) {
                    cell.discharge_bit = Some(bit as u8);
                }
            }
        }
        CellStore { cells }
    }

    /// Pushes a raw reading through the cell's sample window.
    pub fn update_cell(&mut self, i: usize, value: u16) {
        self.cells[i].update(value);
    }

    pub fn cell(&self, i: usize) -> &Cell {
        &self.cells[i]
    }

    pub fn cell_mut(&mut self, i: usize) -> &mut Cell {
        &mut self.cells[i]
    }

    pub fn cells(&self) -> &[Cell; N_CELLS] {
        &self.cells
    }

    pub fn average_voltage(&self, i: usize) -> u16 {
        self.cells[i].average_voltage()
    }

    pub fn average_voltages(&self) -> [u16; N_CELLS] {
        let mut out = [0u16; N_CELLS];
        for (slot, cell) in out.iter_mut().zip(self.cells.iter()) {
            *slot = cell.average_voltage();
        }
        out
    }

    /// OR of every cell's fault flags, `FAULT_*` bits.
    pub fn fault_summary(&self) -> u8 {
        self.cells.iter().fold(0, |acc, cell| {
            let mut bits = acc;
            if cell.ov_flag {
                bits |= FAULT_OV;
            }
            if cell.uv_flag {
                bits |= FAULT_UV;
            }
            if cell.ot_flag {
                bits |= FAULT_OT;
            }
            bits
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BmsConfig;
    use crate::types::{GroupId, N_SAMPLES};

    #[test]
    fn new_store_is_zeroed_with_group_bits() {
        let config = BmsConfig::default();
        let store = CellStore::new(&config.groups);

        for (i, cell) in store.cells().iter().enumerate() {
            assert_eq!(cell.voltage(), 0);
            assert_eq!(cell.average_voltage(), 0);
            assert!(!cell.ov_flag() && !cell.uv_flag() && !cell.ot_flag());
            let expected = match i {
                0..=3 => Some(i as u8),
                12..=15 => Some((i - 12) as u8),
                _ => None,
            };
            assert_eq!(cell.discharge_bit(), expected, "cell {}", i);
        }
        assert_eq!(store.fault_summary(), 0);
    }

    #[test]
    fn oversized_group_assigns_only_mask_width_bits() {
        let groups = [
            BalancingGroup::new(GroupId::Lower, 2, 12),
            BalancingGroup::new(GroupId::Upper, 30, 4),
        ];
        let store = CellStore::new(&groups);
        assert_eq!(store.cell(5).discharge_bit(), Some(3));
        assert!((6..N_CELLS).all(|i| store.cell(i).discharge_bit().is_none()));
        assert!(store.cell(0).discharge_bit().is_none());
    }

    #[test]
    fn update_only_touches_the_addressed_cell() {
        let mut store = CellStore::new(&BmsConfig::default().groups);
        for _ in 0..N_SAMPLES {
            store.update_cell(2, 37_000);
        }
        assert_eq!(store.cell(2).voltage(), 37_000);
        assert_eq!(store.average_voltage(2), 37_000);
        assert_eq!(store.average_voltage(1), 0);
        assert_eq!(store.average_voltage(3), 0);
    }

    #[test]
    fn fault_summary_ors_flags() {
        let mut store = CellStore::new(&BmsConfig::default().groups);
        store.cell_mut(0).set_flags(true, false, false);
        store.cell_mut(9).set_flags(false, false, true);
        assert_eq!(store.fault_summary(), FAULT_OV | FAULT_OT);
    }
}
