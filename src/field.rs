use core::str::Utf8Error;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::codec::{parse_int, Centi};

/// Every VE.Direct text-mode label the bridge understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
    /// Main (battery) voltage in mV
    BatteryVoltage,
    /// Panel voltage in mV
    PanelVoltage,
    /// Panel power in W
    PanelPower,
    /// Main (battery) current in mA
    Current,
    /// Load output state (ON/OFF)
    Load,
    /// Yield total (user resettable counter) in 0.01 kWh
    YieldTotal,
    /// Yield today in 0.01 kWh
    YieldToday,
    /// Maximum power today in W
    MaxPowerToday,
    /// Yield yesterday in 0.01 kWh
    YieldYesterday,
    /// Maximum power yesterday in W
    MaxPowerYesterday,
    ChargerError,
    ChargeState,
    FirmwareVersion,
    ProductId,
    SerialNumber,
    /// Day sequence number (0..364)
    DaySequence,
    TrackerMode,
}

impl Key {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BatteryVoltage => "V",
            Self::PanelVoltage => "VPV",
            Self::PanelPower => "PPV",
            Self::Current => "I",
            Self::Load => "LOAD",
            Self::YieldTotal => "H19",
            Self::YieldToday => "H20",
            Self::MaxPowerToday => "H21",
            Self::YieldYesterday => "H22",
            Self::MaxPowerYesterday => "H23",
            Self::ChargerError => "ERR",
            Self::ChargeState => "CS",
            Self::FirmwareVersion => "FW",
            Self::ProductId => "PID",
            Self::SerialNumber => "SER#",
            Self::DaySequence => "HSDS",
            Self::TrackerMode => "MPPT",
        }
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = FieldParseError;

    fn try_from(label: &[u8]) -> Result<Self, Self::Error> {
        Ok(match label {
            b"V" => Self::BatteryVoltage,
            b"VPV" => Self::PanelVoltage,
            b"PPV" => Self::PanelPower,
            b"I" => Self::Current,
            b"LOAD" => Self::Load,
            b"H19" => Self::YieldTotal,
            b"H20" => Self::YieldToday,
            b"H21" => Self::MaxPowerToday,
            b"H22" => Self::YieldYesterday,
            b"H23" => Self::MaxPowerYesterday,
            b"ERR" => Self::ChargerError,
            b"CS" => Self::ChargeState,
            b"FW" => Self::FirmwareVersion,
            b"PID" => Self::ProductId,
            b"SER#" => Self::SerialNumber,
            b"HSDS" => Self::DaySequence,
            b"MPPT" => Self::TrackerMode,
            _ => return Err(FieldParseError::UnrecognizedKey),
        })
    }
}

/// State of operation reported under `CS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ChargeState {
    Off = 0,
    LowPower = 1,
    Fault = 2,
    Bulk = 3,
    Absorption = 4,
    Float = 5,
    Storage = 6,
    /// Manual equalize
    Equalize = 7,
    Inverting = 9,
    PowerSupply = 11,
    StartingUp = 245,
    RepeatedAbsorption = 246,
    AutoEqualize = 247,
    BatterySafe = 248,
    ExternalControl = 252,
}

/// Tracker operation mode reported under `MPPT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TrackerMode {
    Off = 0,
    /// Voltage or current limited
    Limited = 1,
    MppTracking = 2,
}

/// Charger error reported under `ERR`
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCode {
    NoError = 0,
    BatteryVoltageTooHigh = 2,
    ChargerTemperatureTooHigh = 17,
    ChargerOverCurrent = 18,
    ChargerCurrentReversed = 19,
    BulkTimeLimitExceeded = 20,
    CurrentSensorIssue = 21,
    TerminalsOverheated = 26,
    ConverterIssue = 28,
    InputVoltageTooHigh = 33,
    InputCurrentTooHigh = 34,
    InputShutdownBatteryVoltage = 38,
    InputShutdownCurrentFlow = 39,
    LostCommunication = 65,
    SynchronisedChargingConfig = 66,
    BmsConnectionLost = 67,
    NetworkMisconfigured = 68,
    FactoryCalibrationLost = 116,
    InvalidFirmware = 117,
    UserSettingsInvalid = 119,
}

/// Looks a raw code up in one of the code enums; codes outside `u8` are never known.
pub fn lookup_code<T: TryFromPrimitive<Primitive = u8>>(code: i32) -> Option<T> {
    u8::try_from(code).ok().and_then(|code| T::try_from_primitive(code).ok())
}

/// One decoded telemetry pair.
///
/// Numeric values follow the best-effort rule of [`parse_int`]: a malformed number is `0`,
/// never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Field<'a> {
    BatteryVoltage(Centi),
    PanelVoltage(Centi),
    /// Watts, still the full parsed integer
    PanelPower(i32),
    Current(Centi),
    ChargeState(i32),
    Load(&'a str),
    /// kWh
    YieldTotal(Centi),
    /// kWh
    YieldToday(Centi),
    /// W
    MaxPowerToday(i32),
    /// kWh
    YieldYesterday(Centi),
    /// W
    MaxPowerYesterday(i32),
    ChargerError(i32),
    FirmwareVersion(&'a str),
    ProductId(&'a str),
    SerialNumber(&'a str),
    DaySequence(i32),
    TrackerMode(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldParseError {
    #[error("Received a field with a label the bridge does not decode")]
    UnrecognizedKey,
    #[error("Tried to decode a text value as UTF-8 but it was invalid ({0:?})")]
    InvalidUtf8(
        #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
        #[from]
        Utf8Error,
    ),
}

impl<'a> Field<'a> {
    pub fn parse(key: &[u8], value: &'a [u8]) -> Result<Self, FieldParseError> {
        let key = Key::try_from(key)?;

        Ok(match key {
            Key::BatteryVoltage => Self::BatteryVoltage(Centi::from_milli(parse_int(value))),
            Key::PanelVoltage => Self::PanelVoltage(Centi::from_milli(parse_int(value))),
            Key::PanelPower => Self::PanelPower(parse_int(value)),
            Key::Current => Self::Current(Centi::from_milli(parse_int(value))),
            Key::ChargeState => Self::ChargeState(parse_int(value)),
            Key::Load => Self::Load(core::str::from_utf8(value)?),
            Key::YieldTotal => Self::YieldTotal(Centi::from_centi(parse_int(value))),
            Key::YieldToday => Self::YieldToday(Centi::from_centi(parse_int(value))),
            Key::MaxPowerToday => Self::MaxPowerToday(parse_int(value)),
            Key::YieldYesterday => Self::YieldYesterday(Centi::from_centi(parse_int(value))),
            Key::MaxPowerYesterday => Self::MaxPowerYesterday(parse_int(value)),
            Key::ChargerError => Self::ChargerError(parse_int(value)),
            Key::FirmwareVersion => Self::FirmwareVersion(core::str::from_utf8(value)?),
            Key::ProductId => Self::ProductId(core::str::from_utf8(value)?),
            Key::SerialNumber => Self::SerialNumber(core::str::from_utf8(value)?),
            Key::DaySequence => Self::DaySequence(parse_int(value)),
            Key::TrackerMode => Self::TrackerMode(parse_int(value)),
        })
    }

    pub fn key(&self) -> Key {
        match self {
            Self::BatteryVoltage(_) => Key::BatteryVoltage,
            Self::PanelVoltage(_) => Key::PanelVoltage,
            Self::PanelPower(_) => Key::PanelPower,
            Self::Current(_) => Key::Current,
            Self::ChargeState(_) => Key::ChargeState,
            Self::Load(_) => Key::Load,
            Self::YieldTotal(_) => Key::YieldTotal,
            Self::YieldToday(_) => Key::YieldToday,
            Self::MaxPowerToday(_) => Key::MaxPowerToday,
            Self::YieldYesterday(_) => Key::YieldYesterday,
            Self::MaxPowerYesterday(_) => Key::MaxPowerYesterday,
            Self::ChargerError(_) => Key::ChargerError,
            Self::FirmwareVersion(_) => Key::FirmwareVersion,
            Self::ProductId(_) => Key::ProductId,
            Self::SerialNumber(_) => Key::SerialNumber,
            Self::DaySequence(_) => Key::DaySequence,
            Self::TrackerMode(_) => Key::TrackerMode,
        }
    }

    /// Fields that are only shown on the diagnostic channel and never reach the bus
    pub fn is_informational(&self) -> bool {
        !matches!(
            self,
            Self::BatteryVoltage(_)
                | Self::PanelVoltage(_)
                | Self::PanelPower(_)
                | Self::Current(_)
                | Self::ChargeState(_)
        )
    }

    /// Writes an informational field to the diagnostic channel
    pub(crate) fn report(&self) {
        match self {
            Self::Load(state) => info!("Panel Load: {}", state),
            Self::YieldTotal(kwh) => info!("Yield Total: {} kWh", kwh),
            Self::YieldToday(kwh) => info!("Yield Today: {} kWh", kwh),
            Self::MaxPowerToday(watts) => info!("Maximum Power Today: {} W", watts),
            Self::YieldYesterday(kwh) => info!("Yield Yesterday: {} kWh", kwh),
            Self::MaxPowerYesterday(watts) => info!("Maximum Power Yesterday: {} W", watts),
            Self::ChargerError(code) => {
                info!("Error: {} ({})", code, lookup_code::<ErrorCode>(*code))
            }
            Self::FirmwareVersion(version) => info!("Firmware Version: {}", version),
            Self::ProductId(id) => info!("Product ID: {}", id),
            Self::SerialNumber(serial) => info!("Serial Number: {}", serial),
            Self::DaySequence(day) => info!("Day Number: {}", day),
            Self::TrackerMode(mode) => {
                info!("Tracker Mode: {} ({})", mode, lookup_code::<TrackerMode>(*mode))
            }
            Self::BatteryVoltage(_)
            | Self::PanelVoltage(_)
            | Self::PanelPower(_)
            | Self::Current(_)
            | Self::ChargeState(_) => {}
        }
    }
}
