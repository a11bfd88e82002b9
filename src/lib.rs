//! Bridges the VE.Direct text protocol of a solar charge controller onto a CAN bus.
//!
//! Lines of `LABEL<TAB>VALUE` pairs arrive on a serial port and are decoded into a
//! [`TelemetryState`]. Every [`PERIOD_MS`] the state is published as two standard-ID
//! frames: [`FrameKind::SolarA`] (0x2C, 7 bytes) and [`FrameKind::SolarB`] (0x2D, 3 bytes).
//!
//! Enable the `defmt` feature to get the diagnostic channel. Without it, logging compiles
//! to nothing.

#![no_std]

#[macro_use]
mod fmt;

pub mod bridge;
pub mod codec;
pub mod encoder;
pub mod field;
pub mod frame;
pub mod line;
pub mod state;
pub mod transmit;

/// Publishing period of the bridge
pub const PERIOD_MS: u32 = 33;
/// How long a frame may wait for the transmit queue before it is dropped
pub const TRANSMIT_TIMEOUT_MS: u32 = 10;

pub const MAX_LINE_LENGTH: usize = 128;
pub const MAX_DATA_LENGTH: usize = 8;

pub use bridge::{Bridge, Config, Cycle};
pub use codec::{Centi, WordBytes};
pub use encoder::FrameKind;
pub use field::{Field, FieldParseError, Key};
pub use frame::CanFrame;
pub use state::TelemetryState;
pub use transmit::{Monotonic, TransmitError};

pub use embedded_can::{Id, StandardId};
