use embedded_hal_nb::serial::{Error as _, Read};

use crate::{
    encoder::{build_frame, FrameKind},
    fmt::Debug2Format,
    line::LineBuffer,
    state::TelemetryState,
    transmit::{transmit, Monotonic, TransmitError},
    PERIOD_MS, TRANSMIT_TIMEOUT_MS,
};

/// Bridge timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// Time between two publishing cycles
    pub period_ms: u32,
    /// How long one frame may wait for room in the transmit queue
    pub transmit_timeout_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period_ms: PERIOD_MS,
            transmit_timeout_ms: TRANSMIT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Waiting for the period to elapse
    Idle,
    /// The period elapsed, a cycle should run
    Due,
}

/// Fixed-interval trigger over a wrapping millisecond clock. The first period is measured
/// from time zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeriodGate {
    period_ms: u32,
    anchor_ms: u32,
}

impl PeriodGate {
    pub const fn new(period_ms: u32) -> Self {
        Self {
            period_ms,
            anchor_ms: 0,
        }
    }

    pub fn phase(&self, now_ms: u32) -> Phase {
        if now_ms.wrapping_sub(self.anchor_ms) >= self.period_ms {
            Phase::Due
        } else {
            Phase::Idle
        }
    }

    /// Starts the next period at `now_ms`
    pub fn fire(&mut self, now_ms: u32) {
        self.anchor_ms = now_ms;
    }
}

/// Outcome of one publishing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cycle {
    /// Complete lines decoded before encoding
    pub lines: usize,
    pub frame_a: Result<(), TransmitError>,
    pub frame_b: Result<(), TransmitError>,
}

/// Serial telemetry in, CAN frames out.
///
/// Each due period drains every complete line the serial port has buffered, then sends
/// frame A and frame B built from the resulting state, strictly in that order.
/// Decoding and encoding never overlap.
pub struct Bridge<S, C, M> {
    serial: S,
    can: C,
    clock: M,
    config: Config,
    gate: PeriodGate,
    lines: LineBuffer,
    state: TelemetryState,
    cycles: u32,
}

impl<S, C, M> Bridge<S, C, M>
where
    S: Read<u8>,
    C: embedded_can::nb::Can,
    M: Monotonic,
{
    pub fn new(serial: S, can: C, clock: M, config: Config) -> Self {
        Self {
            serial,
            can,
            clock,
            config,
            gate: PeriodGate::new(config.period_ms),
            lines: LineBuffer::new(),
            state: TelemetryState::new(),
            cycles: 0,
        }
    }

    /// Runs one cycle if the period has elapsed, otherwise returns `None` right away.
    pub fn poll(&mut self) -> Option<Cycle> {
        let now = self.clock.now_ms();

        if self.gate.phase(now) == Phase::Idle {
            return None;
        }

        debug!("Running");

        let lines = self.drain();
        let frame_a = self.send(FrameKind::SolarA);
        let frame_b = self.send(FrameKind::SolarB);

        self.gate.fire(now);
        self.cycles = self.cycles.wrapping_add(1);

        Some(Cycle {
            lines,
            frame_a,
            frame_b,
        })
    }

    /// Polls forever. Nothing in the telemetry stream can stop the loop.
    pub fn run(&mut self) -> ! {
        loop {
            self.poll();
        }
    }

    /// Decodes every complete line currently available. A partial line stays buffered
    /// for the next cycle.
    fn drain(&mut self) -> usize {
        let mut lines = 0;

        loop {
            match self.serial.read() {
                Ok(byte) => match self.lines.push(byte) {
                    Ok(Some(line)) => {
                        self.state.decode_line(line);
                        lines += 1;
                    }
                    Ok(None) => {}
                    Err(error) => warn!("{}", error),
                },
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(error)) => {
                    warn!("Serial read failed: {}", Debug2Format(&error.kind()));
                    break;
                }
            }
        }

        lines
    }

    fn send(&mut self, kind: FrameKind) -> Result<(), TransmitError> {
        let result = match build_frame::<C::Frame>(kind, &self.state) {
            Some(frame) => transmit(
                &mut self.can,
                &self.clock,
                &frame,
                self.config.transmit_timeout_ms,
            ),
            None => Err(TransmitError::InvalidFrame),
        };

        match &result {
            Ok(()) => debug!("{} queued for transmission", kind),
            Err(error) => warn!("Failed to queue {} for transmission: {}", kind, error),
        }

        result
    }

    pub fn state(&self) -> &TelemetryState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of cycles run so far (wrapping)
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn can(&self) -> &C {
        &self.can
    }

    pub fn can_mut(&mut self) -> &mut C {
        &mut self.can
    }

    /// Gives the peripherals back
    pub fn release(self) -> (S, C, M) {
        (self.serial, self.can, self.clock)
    }
}

#[cfg(test)]
mod tests {
    use embedded_can::{ErrorKind, Frame, Id};
    use embedded_hal_nb::serial::{self, ErrorType, Read};
    use heapless::Deque;

    use super::{Bridge, Config, Cycle, PeriodGate, Phase};
    use crate::{
        codec::Centi,
        encoder::FrameKind,
        state::TelemetryState,
        transmit::{
            mock::{MockCan, MockClock},
            TransmitError,
        },
        MAX_LINE_LENGTH, PERIOD_MS,
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct MockSerialError;

    impl serial::Error for MockSerialError {
        fn kind(&self) -> serial::ErrorKind {
            serial::ErrorKind::Overrun
        }
    }

    #[derive(Default)]
    struct MockSerial {
        rx: Deque<u8, 1024>,
        fault: bool,
    }

    impl MockSerial {
        fn feed(&mut self, bytes: &[u8]) {
            for byte in bytes {
                self.rx.push_back(*byte).unwrap();
            }
        }
    }

    impl ErrorType for MockSerial {
        type Error = MockSerialError;
    }

    impl Read<u8> for MockSerial {
        fn read(&mut self) -> nb::Result<u8, MockSerialError> {
            if self.fault {
                return Err(nb::Error::Other(MockSerialError));
            }

            self.rx.pop_front().ok_or(nb::Error::WouldBlock)
        }
    }

    fn bridge(clock: &MockClock) -> Bridge<MockSerial, MockCan, &MockClock> {
        Bridge::new(
            MockSerial::default(),
            MockCan::default(),
            clock,
            Config::default(),
        )
    }

    #[test]
    fn gate_phases() {
        let mut gate = PeriodGate::new(33);

        assert_eq!(gate.phase(0), Phase::Idle);
        assert_eq!(gate.phase(32), Phase::Idle);
        assert_eq!(gate.phase(33), Phase::Due);

        gate.fire(40);

        assert_eq!(gate.phase(72), Phase::Idle);
        assert_eq!(gate.phase(73), Phase::Due);

        gate.fire(u32::MAX - 10);

        assert_eq!(gate.phase(21), Phase::Idle);
        assert_eq!(gate.phase(22), Phase::Due);
    }

    #[test]
    fn default_config() {
        let config = Config::default();

        assert_eq!(config.period_ms, 33);
        assert_eq!(config.transmit_timeout_ms, 10);
    }

    #[test]
    fn idle_until_period_elapses() {
        let clock = MockClock::default();
        let mut bridge = bridge(&clock);

        clock.set(32);
        assert_eq!(bridge.poll(), None);
        assert!(bridge.can().sent.is_empty());

        clock.set(33);
        assert_eq!(
            bridge.poll(),
            Some(Cycle {
                lines: 0,
                frame_a: Ok(()),
                frame_b: Ok(()),
            })
        );
        assert_eq!(bridge.poll(), None);
    }

    #[test]
    fn cycles_follow_elapsed_time() {
        let clock = MockClock::default();
        let mut bridge = bridge(&clock);

        for now in 0..=1000 {
            clock.set(now);
            bridge.poll();
        }

        assert_eq!(bridge.cycles(), 1000 / PERIOD_MS);
        assert_eq!(bridge.can().sent.len(), 2 * (1000 / PERIOD_MS) as usize);

        for (index, frame) in bridge.can().sent.iter().enumerate() {
            let kind = FrameKind::ALL[index % 2];

            assert_eq!(frame.id(), Id::Standard(kind.id()));
            assert_eq!(frame.dlc(), kind.data_len());
        }
    }

    #[test]
    fn drains_before_encoding() {
        let clock = MockClock::default();
        let mut bridge = bridge(&clock);

        bridge
            .serial_mut()
            .feed(b"\r\nPID\t0xA053\r\nV\t12340\r\nVPV\t18050\r\nPPV\t1000\r\nI\t-2500\r\nCS\t3\r\nH2");

        clock.set(33);
        let cycle = bridge.poll().unwrap();

        assert_eq!(cycle.lines, 7);
        assert_eq!(bridge.state().battery_voltage, Centi::from_milli(12340));

        let sent = &bridge.can().sent;

        assert_eq!(sent[0].data(), &[18, 5, 3, 232, 12, 34, 3]);
        assert_eq!(sent[1].data(), &[1, 2, 50]);
    }

    #[test]
    fn partial_line_finishes_next_cycle() {
        let clock = MockClock::default();
        let mut bridge = bridge(&clock);

        bridge.serial_mut().feed(b"V\t123");

        clock.set(33);
        assert_eq!(bridge.poll().unwrap().lines, 0);
        assert_eq!(bridge.state().battery_voltage, Centi::default());

        bridge.serial_mut().feed(b"40\r\n");

        clock.set(66);
        assert_eq!(bridge.poll().unwrap().lines, 1);
        assert_eq!(bridge.state().battery_voltage, Centi::from_milli(12340));
    }

    #[test]
    fn unseen_fields_are_zero_on_the_bus() {
        let clock = MockClock::default();
        let mut bridge = bridge(&clock);

        bridge.serial_mut().feed(b"VPV\t18000\r\n");

        clock.set(33);
        bridge.poll();

        let data = bridge.can().sent[0].data();

        assert_eq!(&data[..2], &[18, 0]);
        assert_eq!(&data[4..6], &[0, 0]);
    }

    #[test]
    fn failed_transmit_is_not_retried() {
        let clock = MockClock::stepping(1);
        let mut bridge = Bridge::new(
            MockSerial::default(),
            MockCan {
                always_busy: true,
                ..Default::default()
            },
            &clock,
            Config::default(),
        );

        clock.set(33);
        assert_eq!(
            bridge.poll(),
            Some(Cycle {
                lines: 0,
                frame_a: Err(TransmitError::Timeout(10)),
                frame_b: Err(TransmitError::Timeout(10)),
            })
        );

        // Both attempts took their full timeout, the gate was anchored at 33
        assert_eq!(clock.now.get(), 56);
        assert_eq!(bridge.poll(), None);
        assert!(bridge.can().sent.is_empty());

        bridge.can_mut().always_busy = false;

        clock.set(66);
        assert_eq!(
            bridge.poll(),
            Some(Cycle {
                lines: 0,
                frame_a: Ok(()),
                frame_b: Ok(()),
            })
        );
        assert_eq!(bridge.can().sent.len(), 2);
    }

    #[test]
    fn bus_errors_are_reported() {
        let clock = MockClock::default();
        let mut bridge = bridge(&clock);

        bridge.can_mut().fault = Some(ErrorKind::Acknowledge);

        clock.set(33);
        let cycle = bridge.poll().unwrap();

        assert_eq!(cycle.frame_a, Err(TransmitError::Bus(ErrorKind::Acknowledge)));
        assert_eq!(cycle.frame_b, Err(TransmitError::Bus(ErrorKind::Acknowledge)));
    }

    #[test]
    fn serial_fault_still_publishes() {
        let clock = MockClock::default();
        let mut bridge = bridge(&clock);

        bridge.serial_mut().feed(b"V\t12340\r\n");
        bridge.serial_mut().fault = true;

        clock.set(33);
        assert_eq!(
            bridge.poll(),
            Some(Cycle {
                lines: 0,
                frame_a: Ok(()),
                frame_b: Ok(()),
            })
        );

        bridge.serial_mut().fault = false;

        clock.set(66);
        assert_eq!(bridge.poll().unwrap().lines, 1);
        assert_eq!(bridge.state().battery_voltage.whole, 12);
    }

    #[test]
    fn garbage_never_stops_the_bridge() {
        let clock = MockClock::default();
        let mut bridge = bridge(&clock);

        let mut noise = [b'#'; MAX_LINE_LENGTH + 20];
        noise[3] = b'\t';
        noise[40] = 0xFF;

        bridge.serial_mut().feed(&noise);
        bridge.serial_mut().feed(b"\n\t\t\t\nV\tnope\n\xFF\xFE\tx\nI\t-0\n");

        clock.set(33);
        let cycle = bridge.poll().unwrap();

        assert_eq!(cycle.lines, 4);
        assert_eq!(cycle.frame_a, Ok(()));
        assert_eq!(*bridge.state(), TelemetryState::default());

        let (serial, can, _) = bridge.release();

        assert!(serial.rx.is_empty());
        assert_eq!(can.sent.len(), 2);
    }
}
