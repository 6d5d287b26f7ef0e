//! Extremum scan and threshold balancing.
//!
//! Masks are recomputed from the current averages every cycle. There is no
//! hysteresis: a cell hovering on the threshold may toggle between cycles.
use crate::config::{BalancingGroup, BmsConfig};
use crate::types::{CellStore, GroupId, GROUP_CELLS, N_CELLS};

/// Per-chip discharge bits, bit n bleeds the group's n-th cell.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DischargeMask(u8);

impl DischargeMask {
    pub const CLEAR: DischargeMask = DischargeMask(0);

    const VALID: u8 = (1 << GROUP_CELLS) - 1;

    pub fn from_bits(bits: u8) -> Self {
        DischargeMask(bits & Self::VALID)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_set(&self, bit: u8) -> bool {
        (bit as usize) < GROUP_CELLS && self.0 & (1 << bit) != 0
    }

    /// Bits past the group width are ignored.
    pub fn set(&mut self, bit: u8, on: bool) {
        if bit as usize >= GROUP_CELLS {
            return;
        }
        if on {
            self.0 |= 1 << bit;
        } else {
            self.0 &= !(1 << bit);
        }
    }
}

/// Both chips' masks, indexed by `GroupId::index()`.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupMasks(pub [DischargeMask; 2]);

impl GroupMasks {
    pub fn get(&self, group: GroupId) -> DischargeMask {
        self.0[group.index()]
    }

    pub fn set(&mut self, group: GroupId, mask: DischargeMask) {
        self.0[group.index()] = mask;
    }

    /// Upper mask in the high nibble, lower mask in the low nibble.
    pub fn packed(&self) -> u32 {
        let lower = self.get(GroupId::Lower).bits() as u32 & 0xF;
        let upper = self.get(GroupId::Upper).bits() as u32 & 0xF;
        (upper << 4) | lower
    }
}

/// Index of the lowest average in the group. Later ties win.
///
/// `None` only for a group with no cells inside the store.
pub fn lowest_in_group(store: &CellStore, group: &BalancingGroup) -> Option<usize> {
    let mut cells = group.cells();
    let mut lowest = cells.next()?;
    for i in cells {
        if store.average_voltage(i) <= store.average_voltage(lowest) {
            lowest = i;
        }
    }
    Some(lowest)
}

/// Index of the highest average in the whole store. Later ties win.
pub fn highest_overall(store: &CellStore) -> usize {
    let mut highest = 0;
    for i in 0..N_CELLS {
        if store.average_voltage(i) >= store.average_voltage(highest) {
            highest = i;
        }
    }
    highest
}

pub fn group_mask(store: &CellStore, group: &BalancingGroup, threshold: u16) -> DischargeMask {
    let mut mask = DischargeMask::CLEAR;
    let Some(lowest) = lowest_in_group(store, group) else {
        return mask;
    };
    let min = store.average_voltage(lowest);

    for i in group.cells() {
        let cell = store.cell(i);
        if let Some(bit) = cell.discharge_bit() {
            let above = cell.average_voltage().saturating_sub(min);
            mask.set(bit, above > threshold);
        }
    }
    mask
}

pub fn compute_masks(store: &CellStore, config: &BmsConfig) -> GroupMasks {
    let mut masks = GroupMasks::default();
    for id in GroupId::ALL {
        masks.set(id, group_mask(store, config.group(id), config.balance_threshold));
    }
    masks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::N_SAMPLES;

    fn store_with(averages: &[u16; N_CELLS]) -> CellStore {
        let mut store = CellStore::new(&BmsConfig::default().groups);
        for _ in 0..N_SAMPLES {
            for (i, &v) in averages.iter().enumerate() {
                store.update_cell(i, v);
            }
        }
        store
    }

    fn config_with_threshold(threshold: u16) -> BmsConfig {
        BmsConfig {
            balance_threshold: threshold,
            ..BmsConfig::default()
        }
    }

    #[test]
    fn lowest_stays_inside_its_group() {
        let mut averages = [40_000u16; N_CELLS];
        averages[7] = 1; // outside both groups
        averages[13] = 35_000;
        let store = store_with(&averages);
        let config = BmsConfig::default();

        let lower = lowest_in_group(&store, config.group(GroupId::Lower)).unwrap();
        let upper = lowest_in_group(&store, config.group(GroupId::Upper));
        assert!(config.group(GroupId::Lower).contains(lower));
        assert_eq!(upper, Some(13));
    }

    #[test]
    fn lowest_tie_resolves_to_last_index() {
        let mut averages = [40_000u16; N_CELLS];
        averages[0] = 36_000;
        averages[2] = 36_000;
        let store = store_with(&averages);
        let config = BmsConfig::default();
        assert_eq!(lowest_in_group(&store, config.group(GroupId::Lower)), Some(2));

        let flat = store_with(&[38_000; N_CELLS]);
        assert_eq!(lowest_in_group(&flat, config.group(GroupId::Upper)), Some(15));
    }

    #[test]
    fn highest_scans_every_cell() {
        let mut averages = [36_000u16; N_CELLS];
        averages[6] = 41_000;
        averages[9] = 41_000;
        let store = store_with(&averages);
        assert_eq!(highest_overall(&store), 9);
    }

    #[test]
    fn threshold_is_strict() {
        let mut averages = [0u16; N_CELLS];
        averages[..4].copy_from_slice(&[37_000, 37_120, 37_121, 37_500]);
        averages[12..].copy_from_slice(&[37_000; 4]);
        let store = store_with(&averages);

        let masks = compute_masks(&store, &config_with_threshold(120));
        assert_eq!(masks.get(GroupId::Lower).bits(), 0b1100);
        assert_eq!(masks.get(GroupId::Upper), DischargeMask::CLEAR);
    }

    #[test]
    fn minimum_cell_is_never_discharged() {
        let mut averages = [0u16; N_CELLS];
        averages[12..].copy_from_slice(&[39_000, 36_000, 39_500, 40_000]);
        let store = store_with(&averages);
        let config = config_with_threshold(0);

        let masks = compute_masks(&store, &config);
        let min = lowest_in_group(&store, config.group(GroupId::Upper)).unwrap();
        let bit = store.cell(min).discharge_bit().unwrap();
        assert!(!masks.get(GroupId::Upper).is_set(bit));
        assert_eq!(masks.get(GroupId::Upper).bits(), 0b1101);
    }

    #[test]
    fn single_high_cell_in_lower_group() {
        let mut averages = [130u16; N_CELLS];
        averages[..4].copy_from_slice(&[100, 150, 120, 140]);
        let store = store_with(&averages);

        let masks = compute_masks(&store, &config_with_threshold(45));
        assert_eq!(masks.get(GroupId::Lower).bits(), 0b0010);
        assert_eq!(masks.get(GroupId::Upper).bits(), 0b0000);
        assert_eq!(masks.packed(), 0x02);
    }

    #[test]
    fn packing_puts_upper_in_high_nibble() {
        let masks = GroupMasks([DischargeMask::from_bits(0b0101), DischargeMask::from_bits(0b1010)]);
        assert_eq!(masks.packed(), 0xA5);
    }

    #[test]
    fn mask_ignores_bits_past_the_group_width() {
        let mut mask = DischargeMask::from_bits(0xFF);
        assert_eq!(mask.bits(), 0x0F);
        mask.set(1, false);
        assert_eq!(mask.bits(), 0x0D);

        mask.set(9, true);
        mask.set(200, false);
        assert_eq!(mask.bits(), 0x0D);
        assert!(!mask.is_set(12));
    }

    #[test]
    fn unvalidated_groups_do_not_panic() {
        let mut config = config_with_threshold(0);
        config.groups = [
            BalancingGroup::new(GroupId::Lower, 0, 10),
            BalancingGroup::new(GroupId::Upper, 20, 4),
        ];
        let mut averages = [36_000u16; N_CELLS];
        averages[9] = 40_000;
        averages[3] = 39_000;
        averages[0] = 35_000;
        let mut store = CellStore::new(&config.groups);
        for _ in 0..N_SAMPLES {
            for (i, &v) in averages.iter().enumerate() {
                store.update_cell(i, v);
            }
        }

        assert_eq!(lowest_in_group(&store, &config.groups[1]), None);
        assert!(store.cell(9).discharge_bit().is_none());

        let masks = compute_masks(&store, &config);
        assert_eq!(masks.get(GroupId::Lower).bits(), 0b1110);
        assert_eq!(masks.get(GroupId::Upper), DischargeMask::CLEAR);
    }
}
