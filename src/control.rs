//! One control cycle: acquire, filter, balance, drive the switches, convert
//! temperatures and rebuild the telemetry snapshot.
//!
//! No step is fatal. A group that cannot be read keeps its previous averages, a
//! group whose discharge write fails keeps its last applied mask until the next
//! cycle retries, and an unreadable thermistor keeps its last valid value.
use crate::adc::{AdcError, TemperatureFrontEnd};
use crate::balance::{compute_masks, highest_overall, DischargeMask, GroupMasks};
use crate::can_management::{BmsPage, TelemetryBuffers};
use crate::config::{BmsConfig, ConfigError};
use crate::ltc_management::{CellMonitor, LtcError};
use crate::types::{CellStore, GroupId, GROUP_CELLS, N_ADC_CHANNELS};

/// What happened during one cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    pub started_ms: u32,
    pub read: [Result<(), LtcError>; 2],
    pub discharge: [Result<(), LtcError>; 2],
    pub adc: Result<(), AdcError>,
    /// Bit n set when channel n held its previous temperature.
    pub invalid_channels: u16,
    pub masks: GroupMasks,
}

impl CycleReport {
    fn new(started_ms: u32) -> Self {
        CycleReport {
            started_ms,
            read: [Ok(()); 2],
            discharge: [Ok(()); 2],
            adc: Ok(()),
            invalid_channels: 0,
            masks: GroupMasks::default(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.read.iter().chain(self.discharge.iter()).all(|r| r.is_ok())
            && self.adc.is_ok()
            && self.invalid_channels == 0
    }
}

pub struct Controller {
    config: BmsConfig,
    store: CellStore,
    temperatures: [f32; N_ADC_CHANNELS],
    masks: GroupMasks,
    applied: GroupMasks,
    balancing: bool,
    page: BmsPage,
    telemetry: TelemetryBuffers,
}

impl Controller {
    pub fn new(config: BmsConfig) -> Result<Self, ConfigError> {
        if let Err(err) = config.validate() {
            error!("Invalid BMS configuration: {}", err);
            return Err(err);
        }
        Ok(Controller {
            store: CellStore::new(&config.groups),
            config,
            temperatures: [0.0; N_ADC_CHANNELS],
            masks: GroupMasks::default(),
            applied: GroupMasks::default(),
            balancing: true,
            page: BmsPage::default(),
            telemetry: TelemetryBuffers::default(),
        })
    }

    pub fn run_cycle<M, T>(&mut self, monitor: &mut M, adc: &mut T, now_ms: u32) -> CycleReport
    where
        M: CellMonitor,
        T: TemperatureFrontEnd,
    {
        let mut report = CycleReport::new(now_ms);

        for group in GroupId::ALL {
            report.read[group.index()] = self.acquire(monitor, group);
        }

        self.masks = compute_masks(&self.store, &self.config);
        report.masks = self.masks;

        report.discharge = self.apply_discharge(monitor);

        let mut codes = [0u16; N_ADC_CHANNELS];
        match adc.read_channels(&mut codes) {
            Ok(()) => report.invalid_channels = self.update_temperatures(&codes),
            Err(err) => {
                warn!("Thermistor scan failed: {}", err);
                report.adc = Err(err);
            }
        }

        self.rebuild_page();

        debug!(
            "cycle at {} ms: lower {=u8:b} upper {=u8:b}",
            now_ms,
            self.masks.get(GroupId::Lower).bits(),
            self.masks.get(GroupId::Upper).bits()
        );
        report
    }

    fn acquire<M: CellMonitor>(&mut self, monitor: &mut M, group: GroupId) -> Result<(), LtcError> {
        let cells = self.config.group(group).cells();
        let mut raw = [0u16; GROUP_CELLS];
        let raw = &mut raw[..cells.len()];

        if let Err(err) = monitor.read_cells(group, raw) {
            warn!("Failed to read {} cells: {}", group, err);
            return Err(err);
        }
        for (i, &value) in cells.zip(raw.iter()) {
            self.store.update_cell(i, value);
        }
        Ok(())
    }

    /// Writes each group's own mask to that group's chip.
    fn apply_discharge<M: CellMonitor>(&mut self, monitor: &mut M) -> [Result<(), LtcError>; 2] {
        let mut results = [Ok(()); 2];
        for group in GroupId::ALL {
            let mask = if self.balancing {
                self.masks.get(group)
            } else {
                DischargeMask::CLEAR
            };
            match monitor.write_discharge(group, mask) {
                Ok(()) => self.applied.set(group, mask),
                Err(err) => {
                    warn!("Discharge update for {} skipped: {}", group, err);
                    results[group.index()] = Err(err);
                }
            }
        }
        results
    }

    /// Converts raw codes, keeping the previous value of any channel out of range.
    pub fn update_temperatures(&mut self, codes: &[u16; N_ADC_CHANNELS]) -> u16 {
        let mut invalid = 0u16;
        for (channel, (&code, slot)) in codes.iter().zip(self.temperatures.iter_mut()).enumerate() {
            match self.config.thermistor.convert(code) {
                Ok(t) => *slot = t,
                Err(err) => {
                    warn!("Thermistor {} reading {} rejected: {}", channel, code, err);
                    invalid |= 1 << channel;
                }
            }
        }
        invalid
    }

    fn rebuild_page(&mut self) {
        self.page.rebuild(&self.store, &self.temperatures, &self.applied);
        self.telemetry.pack(
            &self.page,
            &self.temperatures,
            self.balancing,
            self.store.fault_summary(),
        );
    }

    pub fn set_balancing_enabled(&mut self, enabled: bool) {
        if self.balancing != enabled {
            info!("Balancing {}", if enabled { "enabled" } else { "disabled" });
        }
        self.balancing = enabled;
    }

    pub fn balancing_enabled(&self) -> bool {
        self.balancing
    }

    pub fn config(&self) -> &BmsConfig {
        &self.config
    }

    pub fn cells(&self) -> &CellStore {
        &self.store
    }

    pub fn temperatures(&self) -> &[f32; N_ADC_CHANNELS] {
        &self.temperatures
    }

    /// Masks computed this cycle, whether or not balancing is enabled.
    pub fn masks(&self) -> GroupMasks {
        self.masks
    }

    /// Masks the chips last acknowledged.
    pub fn applied_masks(&self) -> GroupMasks {
        self.applied
    }

    pub fn highest_overall(&self) -> usize {
        highest_overall(&self.store)
    }

    pub fn page(&self) -> &BmsPage {
        &self.page
    }

    pub fn telemetry(&self) -> &TelemetryBuffers {
        &self.telemetry
    }
}
