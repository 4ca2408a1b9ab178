//! STOP2 sleep manager.
//!
//! # States
//!
//! ```text
//!            gate ok                  enter_stop2() == true
//! Running ─────────────► EnteringStop ─────────────────────► Stopped
//!    ▲                        │ fell through                   │ wake
//!    │                        ▼                                ▼
//!    └──────────────────── Resuming ◄──────────────────────────┘
//! ```
//!
//! # Gate
//!
//! STOP2 is refused while a debugger is attached, the application vetoes
//! it, USB is present or cannot be sensed, or any active peripheral is
//! outside [`RETAINED`] ∪ [`POWER_OFF_OK`].
//!
//! # Time
//!
//! The tick stops in STOP2. On wake the RTC delta minus one millisecond (the
//! waking tick counts itself) is stepped into the [`MonotonicClock`]. No
//! step happens when the core did not actually stop.

use platform::{IsrNotify, LowPowerHal, PeripheralId, PeripheralSet, RtcClock};

use super::ActivePeripherals;
use crate::error::Fatal;
use crate::sync::IDLE_FOREVER_MS;
use crate::time_base::MonotonicClock;

/// Left initialised through STOP2. Its start bit wakes the core.
pub const RETAINED: PeripheralSet = PeripheralSet::of(&[PeripheralId::Lpuart1]);

/// Torn down before STOP2 and brought back after.
pub const POWER_OFF_OK: PeripheralSet =
    PeripheralSet::of(&[PeripheralId::Rng, PeripheralId::Usart1, PeripheralId::Usart2]);

/// Shortest idle period worth a STOP2 round trip.
pub const MIN_SLEEP_MS: u32 = 2;

/// Sleep manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepState {
    /// Normal operation
    Running,
    /// Peripherals being torn down
    EnteringStop,
    /// Core stopped
    Stopped,
    /// Clocks and peripherals being restored
    Resuming,
}

impl SleepState {
    /// Lowercase name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::EnteringStop => "entering-stop",
            Self::Stopped => "stopped",
            Self::Resuming => "resuming",
        }
    }
}

/// Why the gate refused STOP2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StayAwake {
    /// A debug probe is attached
    Debugger,
    /// The application vetoed sleep
    AppVeto,
    /// VBUS is present
    UsbPresent,
    /// VBUS cannot be sensed
    UsbUnknown,
    /// A peripheral that cannot be torn down is active
    BusyPeripheral(PeripheralId),
}

impl StayAwake {
    /// Lowercase name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Debugger => "debugger",
            Self::AppVeto => "app-veto",
            Self::UsbPresent => "usb-present",
            Self::UsbUnknown => "usb-unknown",
            Self::BusyPeripheral(_) => "busy-peripheral",
        }
    }
}

/// Result of one [`SleepManager::sleep_cycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The gate refused
    Awake(StayAwake),
    /// Teardown ran but WFI fell through; nothing was lost
    NotEntered,
    /// The core stopped for `ms` of RTC time
    Slept {
        /// RTC time spent in STOP2
        ms: u64,
    },
}

/// Sequences STOP2 entry and exit around a [`LowPowerHal`].
pub struct SleepManager<H, R> {
    hal: H,
    rtc: R,
    state: SleepState,
    stops: u32,
}

impl<H: LowPowerHal, R: RtcClock> SleepManager<H, R> {
    /// Manager over `hal`, timing sleep with `rtc`.
    pub const fn new(hal: H, rtc: R) -> Self {
        Self {
            hal,
            rtc,
            state: SleepState::Running,
            stops: 0,
        }
    }

    /// Current state.
    pub const fn state(&self) -> SleepState {
        self.state
    }

    /// Times the core actually stopped.
    pub const fn stops(&self) -> u32 {
        self.stops
    }

    /// The hardware layer.
    pub const fn hal(&self) -> &H {
        &self.hal
    }

    /// The hardware layer, mutably.
    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Check every stay-awake condition, in order.
    pub fn gate(&self, app_allows: bool, active: PeripheralSet) -> Result<(), StayAwake> {
        if self.hal.debugger_attached() {
            return Err(StayAwake::Debugger);
        }
        if !app_allows {
            return Err(StayAwake::AppVeto);
        }
        match self.hal.usb_presence() {
            platform::UsbPresence::Absent => {}
            platform::UsbPresence::Present => return Err(StayAwake::UsbPresent),
            platform::UsbPresence::Unknown => return Err(StayAwake::UsbUnknown),
        }
        let blocking = active.difference(RETAINED).difference(POWER_OFF_OK);
        match blocking.iter().next() {
            Some(id) => Err(StayAwake::BusyPeripheral(id)),
            None => Ok(()),
        }
    }

    /// Try to spend up to `idle_ms` in STOP2.
    ///
    /// When LPUART1 is active it is armed as a wake source, and after a real
    /// stop `wake_uart` is notified once it resumes so the byte that woke the
    /// core is read before the node considers sleeping again.
    /// A peripheral or clock that fails to come back is [`Fatal`].
    pub fn sleep_cycle<N: IsrNotify>(
        &mut self,
        clock: &MonotonicClock,
        active: &ActivePeripherals,
        app_allows: bool,
        idle_ms: u32,
        wake_uart: &N,
    ) -> Result<SleepOutcome, Fatal> {
        if self.state != SleepState::Running {
            return Err(Fatal::Corrupt("sleep state"));
        }
        if let Err(reason) = self.gate(app_allows, active.snapshot()) {
            return Ok(SleepOutcome::Awake(reason));
        }

        self.state = SleepState::EnteringStop;
        let began = self.rtc.now_ms();
        let snapshot = active.snapshot();
        let wake_armed = snapshot.contains(PeripheralId::Lpuart1);
        let resume = snapshot.intersection(POWER_OFF_OK);
        for id in resume.iter() {
            self.hal.deinit_peripheral(id);
            active.remove(id);
        }
        self.hal.disable_dma();
        self.hal.suspend_tick();
        if wake_armed {
            self.hal.arm_wake_uart();
        }
        self.hal.gpio_low_power();

        let max_ms = if idle_ms == IDLE_FOREVER_MS { 0 } else { idle_ms };
        let stopped = self.hal.enter_stop2(max_ms);
        if stopped {
            self.state = SleepState::Stopped;
            self.stops = self.stops.saturating_add(1);
        }

        self.state = SleepState::Resuming;
        if stopped {
            self.hal.restore_clocks()?;
        }
        self.hal.resume_tick();
        if stopped && wake_armed {
            self.hal.resume_wake_uart();
        }
        self.hal.enable_dma()?;
        for id in resume.iter() {
            self.hal.reinit_peripheral(id)?;
            active.insert(id);
        }
        self.state = SleepState::Running;

        if !stopped {
            trace!("sleep: stop2 fell through");
            return Ok(SleepOutcome::NotEntered);
        }
        let slept = self.rtc.now_ms().saturating_sub(began);
        if slept > 1 {
            clock.step(slept.saturating_sub(1));
        }
        if wake_armed {
            // The waking start bit may have cost a byte.
            wake_uart.notify_from_isr(true);
        }
        debug!("sleep: slept {} ms", slept);
        Ok(SleepOutcome::Slept { ms: slept })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};
    use platform::mocks::{MockLowPower, MockRtc, PowerOp};
    use platform::{IsrSafe, PowerError, UsbPresence};

    #[derive(Default)]
    struct CountingWake(AtomicU32);
    impl IsrSafe for CountingWake {}
    impl IsrNotify for CountingWake {
        fn notify_from_isr(&self, _error: bool) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn manager(stop_ms: u64) -> (SleepManager<MockLowPower, MockRtc>, MockRtc) {
        let rtc = MockRtc::new(10_000);
        let hal = MockLowPower::new().with_rtc(rtc.clone(), stop_ms);
        (SleepManager::new(hal, rtc.clone()), rtc)
    }

    #[test]
    fn gate_reasons_in_order() {
        let (mut m, _) = manager(0);
        let idle = PeripheralSet::EMPTY;
        m.hal_mut().debugger = true;
        assert_eq!(m.gate(false, idle), Err(StayAwake::Debugger));
        m.hal_mut().debugger = false;
        assert_eq!(m.gate(false, idle), Err(StayAwake::AppVeto));
        m.hal_mut().usb = UsbPresence::Present;
        assert_eq!(m.gate(true, idle), Err(StayAwake::UsbPresent));
        m.hal_mut().usb = UsbPresence::Unknown;
        assert_eq!(m.gate(true, idle), Err(StayAwake::UsbUnknown));
        m.hal_mut().usb = UsbPresence::Absent;
        let busy = PeripheralSet::of(&[PeripheralId::Lpuart1, PeripheralId::Sai1]);
        assert_eq!(
            m.gate(true, busy),
            Err(StayAwake::BusyPeripheral(PeripheralId::Sai1))
        );
        let ok = PeripheralSet::of(&[PeripheralId::Lpuart1, PeripheralId::Usart1, PeripheralId::Rng]);
        assert_eq!(m.gate(true, ok), Ok(()));
    }

    #[test]
    fn refused_gate_touches_nothing() {
        let (mut m, _) = manager(500);
        let clock = MonotonicClock::new();
        let active = ActivePeripherals::new();
        active.insert(PeripheralId::Adc1);
        let wake = CountingWake::default();
        let out = m.sleep_cycle(&clock, &active, true, 1_000, &wake).unwrap();
        assert_eq!(out, SleepOutcome::Awake(StayAwake::BusyPeripheral(PeripheralId::Adc1)));
        assert!(m.hal().ops().is_empty());
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(m.state(), SleepState::Running);
    }

    #[test]
    fn full_cycle_order_and_time_step() {
        let (mut m, _) = manager(500);
        let clock = MonotonicClock::new();
        let active = ActivePeripherals::new();
        active.insert(PeripheralId::Lpuart1);
        active.insert(PeripheralId::Usart1);
        active.insert(PeripheralId::Rng);
        let wake = CountingWake::default();

        let out = m.sleep_cycle(&clock, &active, true, 1_000, &wake).unwrap();
        assert_eq!(out, SleepOutcome::Slept { ms: 500 });
        assert_eq!(clock.now_ms(), 499);
        assert_eq!(m.stops(), 1);
        assert_eq!(wake.0.load(Ordering::Relaxed), 1);
        assert_eq!(
            m.hal().ops(),
            &[
                PowerOp::Deinit(PeripheralId::Rng),
                PowerOp::Deinit(PeripheralId::Usart1),
                PowerOp::DisableDma,
                PowerOp::SuspendTick,
                PowerOp::ArmWakeUart,
                PowerOp::GpioLowPower,
                PowerOp::EnterStop2,
                PowerOp::RestoreClocks,
                PowerOp::ResumeTick,
                PowerOp::ResumeWakeUart,
                PowerOp::EnableDma,
                PowerOp::Reinit(PeripheralId::Rng),
                PowerOp::Reinit(PeripheralId::Usart1),
            ]
        );
        assert_eq!(active.snapshot(), PeripheralSet::of(&[
            PeripheralId::Rng,
            PeripheralId::Lpuart1,
            PeripheralId::Usart1,
        ]));
    }

    #[test]
    fn wakeup_timer_bounds_the_sleep() {
        let (mut m, rtc) = manager(10_000);
        let clock = MonotonicClock::new();
        let active = ActivePeripherals::new();
        let wake = CountingWake::default();
        let out = m.sleep_cycle(&clock, &active, true, 250, &wake).unwrap();
        assert_eq!(out, SleepOutcome::Slept { ms: 250 });
        assert_eq!(rtc.now_ms(), 10_250);
    }

    #[test]
    fn fall_through_restores_peripherals_without_stepping_time() {
        let (mut m, _) = manager(500);
        m.hal_mut().stop_enters = false;
        let clock = MonotonicClock::new();
        let active = ActivePeripherals::new();
        active.insert(PeripheralId::Usart2);
        let wake = CountingWake::default();
        let out = m.sleep_cycle(&clock, &active, true, 1_000, &wake).unwrap();
        assert_eq!(out, SleepOutcome::NotEntered);
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(m.stops(), 0);
        assert!(!m.hal().ops().contains(&PowerOp::RestoreClocks));
        assert!(active.contains(PeripheralId::Usart2));
    }

    #[test]
    fn wake_uart_is_left_alone_unless_active_and_stopped() {
        let (mut m, _) = manager(500);
        let clock = MonotonicClock::new();
        let active = ActivePeripherals::new();
        active.insert(PeripheralId::Usart1);
        let wake = CountingWake::default();
        m.sleep_cycle(&clock, &active, true, 1_000, &wake).unwrap();
        assert!(!m.hal().ops().contains(&PowerOp::ArmWakeUart));
        assert!(!m.hal().ops().contains(&PowerOp::ResumeWakeUart));
        assert_eq!(wake.0.load(Ordering::Relaxed), 0);

        // Armed, but STOP2 fell through: nothing to resume.
        let (mut m, _) = manager(500);
        m.hal_mut().stop_enters = false;
        active.insert(PeripheralId::Lpuart1);
        let out = m.sleep_cycle(&clock, &active, true, 1_000, &wake).unwrap();
        assert_eq!(out, SleepOutcome::NotEntered);
        assert!(m.hal().ops().contains(&PowerOp::ArmWakeUart));
        assert!(!m.hal().ops().contains(&PowerOp::ResumeWakeUart));
        assert_eq!(wake.0.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn one_millisecond_sleep_is_not_stepped() {
        let (mut m, _) = manager(1);
        let clock = MonotonicClock::new();
        let active = ActivePeripherals::new();
        let wake = CountingWake::default();
        m.sleep_cycle(&clock, &active, true, 1_000, &wake).unwrap();
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn reinit_failure_is_fatal() {
        let (mut m, _) = manager(100);
        m.hal_mut().failing_reinit = Some(PeripheralId::Usart1);
        let clock = MonotonicClock::new();
        let active = ActivePeripherals::new();
        active.insert(PeripheralId::Usart1);
        let wake = CountingWake::default();
        let err = m.sleep_cycle(&clock, &active, true, 1_000, &wake).unwrap_err();
        assert_eq!(
            err,
            Fatal::Power(PowerError::PeripheralInit(PeripheralId::Usart1))
        );
        assert_eq!(m.state(), SleepState::Resuming);
        let again = m.sleep_cycle(&clock, &active, true, 1_000, &wake).unwrap_err();
        assert_eq!(again, Fatal::Corrupt("sleep state"));
    }
}
