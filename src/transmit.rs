use embedded_can::{nb::Can, Error as _, ErrorKind};

/// Free-running millisecond counter. Wraps at `u32::MAX`; users compare with
/// `wrapping_sub`.
pub trait Monotonic {
    fn now_ms(&self) -> u32;
}

impl<T: Monotonic + ?Sized> Monotonic for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError {
    /// The transmit queue stayed full for the whole timeout
    #[error("Transmit queue stayed full for {0:?} ms")]
    Timeout(u32),
    #[error("CAN peripheral reported an error ({0:?})")]
    Bus(#[cfg_attr(feature = "defmt", defmt(Debug2Format))] ErrorKind),
    /// The driver's frame type rejected the payload
    #[error("Failed to build a frame for the payload")]
    InvalidFrame,
}

/// Makes one attempt to queue `frame`, polling the peripheral until it accepts the frame
/// or `timeout_ms` elapse.
///
/// There is no retry after a failure. A lower priority frame the peripheral evicts to make
/// room is dropped.
pub fn transmit<C, M>(
    can: &mut C,
    clock: &M,
    frame: &C::Frame,
    timeout_ms: u32,
) -> Result<(), TransmitError>
where
    C: Can,
    M: Monotonic,
{
    let start = clock.now_ms();

    loop {
        match can.transmit(frame) {
            Ok(None) => return Ok(()),
            Ok(Some(_displaced)) => {
                debug!("Dropped a lower priority frame to queue ours");
                return Ok(());
            }
            Err(nb::Error::Other(error)) => return Err(TransmitError::Bus(error.kind())),
            Err(nb::Error::WouldBlock) => {
                if clock.now_ms().wrapping_sub(start) >= timeout_ms {
                    return Err(TransmitError::Timeout(timeout_ms));
                }
            }
        }
    }
}
