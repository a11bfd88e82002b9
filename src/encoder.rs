use embedded_can::{Frame, StandardId};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::state::TelemetryState;

pub const SOLAR_A_DATA_LENGTH: usize = 7;
pub const SOLAR_B_DATA_LENGTH: usize = 3;

/// The two frames published every period. The discriminant is the standard CAN ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum FrameKind {
    /// Panel voltage, panel power, battery voltage and charge state
    SolarA = 0x2C,
    /// Signed current
    SolarB = 0x2D,
}

impl FrameKind {
    pub const ALL: [Self; 2] = [Self::SolarA, Self::SolarB];

    pub const fn id(self) -> StandardId {
        match StandardId::new(self as u16) {
            Some(id) => id,
            None => panic!("frame kinds use 11-bit identifiers"),
        }
    }

    pub const fn data_len(self) -> usize {
        match self {
            Self::SolarA => SOLAR_A_DATA_LENGTH,
            Self::SolarB => SOLAR_B_DATA_LENGTH,
        }
    }
}

/// Layout: panel volts, panel hundredths, power MSB, power LSB, battery volts, battery
/// hundredths, charge state.
///
/// Every byte is the low 8 bits of its field, so whole volts above 255 wrap. Consumers
/// of 0x2C rely on that layout and it is not clamped. The frame has no sign byte: a
/// negative voltage goes out as its magnitude, not as two's-complement bytes.
pub fn solar_a_payload(state: &TelemetryState) -> [u8; SOLAR_A_DATA_LENGTH] {
    [
        state.panel_voltage.whole_byte(),
        state.panel_voltage.frac,
        state.panel_power.msb,
        state.panel_power.lsb,
        state.battery_voltage.whole_byte(),
        state.battery_voltage.frac,
        state.charge_status as u8,
    ]
}

/// Layout: sign flag (1 when negative), whole amps, hundredths.
pub fn solar_b_payload(state: &TelemetryState) -> [u8; SOLAR_B_DATA_LENGTH] {
    [
        state.panel_current.sign_flag(),
        state.panel_current.whole_byte(),
        state.panel_current.frac,
    ]
}

/// Builds a standard-ID data frame of `kind` from the current state. `None` only when the
/// driver's frame type rejects the payload.
pub fn build_frame<F: Frame>(kind: FrameKind, state: &TelemetryState) -> Option<F> {
    match kind {
        FrameKind::SolarA => F::new(kind.id(), &solar_a_payload(state)),
        FrameKind::SolarB => F::new(kind.id(), &solar_b_payload(state)),
    }
}
