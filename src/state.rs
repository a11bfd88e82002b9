use crate::{
    codec::{Centi, WordBytes},
    field::{lookup_code, ChargeState, Field, FieldParseError},
    line::fields,
};

/// Latest decoded value of every field that is republished on the bus.
///
/// Fields start at zero and afterwards always hold the last value decoded for their key;
/// decoding the same line again leaves the state unchanged.
///
/// The state is `Copy` so a consumer running in another context can take a consistent
/// snapshot under its own lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryState {
    pub panel_voltage: Centi,
    pub battery_voltage: Centi,
    pub panel_power: WordBytes,
    pub panel_current: Centi,
    /// Raw `CS` code, see [`ChargeState`]
    pub charge_status: i32,
}

impl TelemetryState {
    pub const fn new() -> Self {
        Self {
            panel_voltage: Centi::from_milli(0),
            battery_voltage: Centi::from_milli(0),
            panel_power: WordBytes::split(0),
            panel_current: Centi::from_milli(0),
            charge_status: 0,
        }
    }

    pub fn charge_state(&self) -> Option<ChargeState> {
        lookup_code(self.charge_status)
    }

    /// Stores `field` if it is republished on the bus. Returns whether the state took it.
    pub fn apply(&mut self, field: &Field<'_>) -> bool {
        match *field {
            Field::BatteryVoltage(volts) => self.battery_voltage = volts,
            Field::PanelVoltage(volts) => self.panel_voltage = volts,
            Field::PanelPower(watts) => self.panel_power = WordBytes::split(watts),
            Field::Current(amps) => self.panel_current = amps,
            Field::ChargeState(code) => self.charge_status = code,
            _ => return false,
        }

        true
    }

    /// Decodes every `(key, value)` pair of one telemetry line into the state.
    ///
    /// Unknown keys are skipped, informational fields go to the diagnostic channel. Returns
    /// the number of pairs found on the line, recognized or not.
    pub fn decode_line(&mut self, line: &[u8]) -> usize {
        trace!("{=[u8]:a}", line);

        let mut pairs = 0;

        for (key, value) in fields(line) {
            pairs += 1;

            match Field::parse(key, value) {
                Ok(field) => {
                    if !self.apply(&field) {
                        field.report();
                    }
                }
                Err(FieldParseError::UnrecognizedKey) => {}
                Err(error) => debug!("Skipping {=[u8]:a}: {}", key, error),
            }
        }

        pairs
    }
}
