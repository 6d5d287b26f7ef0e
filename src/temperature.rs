//! Thermistor ADC code to temperature, simplified Steinhart-Hart (B-parameter) model.
use libm::logf;

const KELVIN_2_CELSIUS: f32 = 273.15;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TemperatureError {
    /// Code 0: thermistor shorted to ground.
    ShortCircuit,
    /// Code at or above full scale: divider open, no denominator left.
    OpenCircuit,
    /// The model produced a non-finite result.
    OutOfRange,
}

/// NTC thermistor on the low side of a series-resistor divider.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ThermistorModel {
    pub series_ohm: f32,
    pub nominal_ohm: f32,
    pub nominal_celsius: f32,
    pub b_coeff: f32,
    /// ADC codes per volt.
    pub lsbs_per_volt: f32,
    /// Divider supply in volts.
    pub supply: f32,
}

impl Default for ThermistorModel {
    fn default() -> Self {
        ThermistorModel {
            series_ohm: 10_000.0,
            nominal_ohm: 10_000.0,
            nominal_celsius: 25.0,
            b_coeff: 3950.0,
            lsbs_per_volt: 4096.0 / 5.0,
            supply: 5.0,
        }
    }
}

impl ThermistorModel {
    /// Code that would put the whole supply across the thermistor.
    pub fn full_scale(&self) -> f32 {
        self.lsbs_per_volt * self.supply
    }

    pub fn resistance(&self, code: u16) -> Result<f32, TemperatureError> {
        if code == 0 {
            return Err(TemperatureError::ShortCircuit);
        }
        let code = code as f32;
        let denom = self.full_scale() - code;
        if denom <= 0.0 {
            return Err(TemperatureError::OpenCircuit);
        }
        Ok(self.series_ohm * code / denom)
    }

    /// Temperature in degrees Celsius.
    pub fn convert(&self, code: u16) -> Result<f32, TemperatureError> {
        let resistance = self.resistance(code)?;

        let mut inv_kelvin = logf(resistance / self.nominal_ohm) / self.b_coeff;
        inv_kelvin += 1.0 / (self.nominal_celsius + KELVIN_2_CELSIUS);
        let celsius = 1.0 / inv_kelvin - KELVIN_2_CELSIUS;

        if !celsius.is_finite() {
            return Err(TemperatureError::OutOfRange);
        }
        Ok(celsius)
    }
}
