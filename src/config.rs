//! Runtime configuration of the control core.
//!
//! Everything here is fixed at start-up and validated once. The defaults reproduce
//! the prototype pack: two LTC6804 chips, each balancing four cells.
use core::ops::Range;

use crate::temperature::ThermistorModel;
use crate::types::{GroupId, Voltages, GROUP_CELLS, N_CELLS};

/// Control cycle period in ms.
pub const CYCLE_PERIOD_MS: u64 = 200;
/// Millisecond tick period in us.
pub const TICK_PERIOD_US: u64 = 1_000;
/// Default balancing threshold: 12 mV in 100 uV units.
pub const BALANCE_THRESHOLD: u16 = 120;

/// A contiguous run of cells served by one monitoring chip.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BalancingGroup {
    pub id: GroupId,
    pub first: usize,
    pub len: usize,
}

impl BalancingGroup {
    pub const fn new(id: GroupId, first: usize, len: usize) -> Self {
        BalancingGroup { id, first, len }
    }

    /// Cell indices of the group, clipped to the store.
    pub fn cells(&self) -> Range<usize> {
        let end = self.first.saturating_add(self.len).min(N_CELLS);
        self.first.min(end)..end
    }

    pub fn contains(&self, cell: usize) -> bool {
        self.cells().contains(&cell)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    EmptyGroup,
    MisplacedGroup,
    GroupTooLarge,
    GroupOutOfBounds,
    GroupsOverlap,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BmsConfig {
    /// A cell bleeds when its average exceeds the group minimum by more than this.
    pub balance_threshold: u16,
    /// Indexed by `GroupId::index()`.
    pub groups: [BalancingGroup; 2],
    pub thermistor: ThermistorModel,
    pub under_voltage: u16,
    pub over_voltage: u16,
}

impl Default for BmsConfig {
    fn default() -> Self {
        BmsConfig {
            balance_threshold: BALANCE_THRESHOLD,
            // Cells 4..12 are wired to the store but not to a balancing chip yet.
            groups: [
                BalancingGroup::new(GroupId::Lower, 0, GROUP_CELLS),
                BalancingGroup::new(GroupId::Upper, 12, GROUP_CELLS),
            ],
            thermistor: ThermistorModel::default(),
            under_voltage: Voltages::MinVoltage.as_raw(),
            over_voltage: Voltages::MaxVoltage.as_raw(),
        }
    }
}

impl BmsConfig {
    pub fn group(&self, id: GroupId) -> &BalancingGroup {
        &self.groups[id.index()]
    }

    /// Group a cell belongs to, if any.
    pub fn group_of(&self, cell: usize) -> Option<&BalancingGroup> {
        self.groups.iter().find(|g| g.contains(cell))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (slot, group) in self.groups.iter().enumerate() {
            if group.id.index() != slot {
                return Err(ConfigError::MisplacedGroup);
            }
            if group.len == 0 {
                return Err(ConfigError::EmptyGroup);
            }
            if group.len > GROUP_CELLS {
                return Err(ConfigError::GroupTooLarge);
            }
            if group.first.saturating_add(group.len) > N_CELLS {
                return Err(ConfigError::GroupOutOfBounds);
            }
        }

        let [lower, upper] = &self.groups;
        if lower.first < upper.first + upper.len && upper.first < lower.first + lower.len {
            return Err(ConfigError::GroupsOverlap);
        }
        Ok(())
    }
}
