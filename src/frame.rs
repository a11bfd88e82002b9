use embedded_can::{Frame, Id};

use crate::MAX_DATA_LENGTH;

/// A classic CAN 2.0 frame which supports RTR (Remote Transmission Request).
///
/// The DLC can be up to 8 bytes, and the data if absent means that it is an
/// RTR frame. Any driver frame type works with the bridge through
/// [`embedded_can::Frame`]; this one serves hosts and tests that have none.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    id: Id,
    dlc: usize,
    data: Option<[u8; MAX_DATA_LENGTH]>,
}

impl CanFrame {
    /// Creates a new data frame. `data` must have a length in the range 0..=8
    /// or else `None` will be returned instead.
    pub fn new_data(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DATA_LENGTH {
            return None;
        }

        let mut copy = [0u8; MAX_DATA_LENGTH];
        copy[..data.len()].copy_from_slice(data);

        Some(Self {
            id: id.into(),
            dlc: data.len(),
            data: Some(copy),
        })
    }

    /// Creates a new remote frame. `dlc` must be in the range 0..=8 or else
    /// `None` will be returned instead.
    pub fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > MAX_DATA_LENGTH {
            return None;
        }

        Some(Self {
            id: id.into(),
            dlc,
            data: None,
        })
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Self::new_data(id, data)
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        Self::new_remote(id, dlc)
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.data.is_none()
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc
    }

    /// Empty for remote frames
    fn data(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..self.dlc],
            None => &[],
        }
    }
}
