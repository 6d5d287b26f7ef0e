//! Control core of a battery-pack monitoring and active-balancing unit.
//!
//! Cell voltages arrive from LTC6804 monitoring chips, thermistor codes from an
//! ADS7952 ADC. Every control cycle the voltages are smoothed, the balancing
//! groups are compared against their weakest cell, discharge masks go back to
//! the chips and a fixed-layout telemetry snapshot is rebuilt for the CAN bus.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod adc;
pub mod balance;
pub mod can_management;
pub mod config;
pub mod control;
pub mod filter;
pub mod ltc_management;
pub mod scheduler;
pub mod spi_device;
pub mod temperature;
pub mod types;

pub use config::{BmsConfig, ConfigError};
pub use control::{Controller, CycleReport};
pub use types::{GroupId, N_ADC_CHANNELS, N_CELLS, N_CELLS_FINAL, N_SAMPLES};
