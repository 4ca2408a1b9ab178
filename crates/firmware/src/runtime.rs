//! The node's shared state and the two system loops.
//!
//! One [`Runtime`] is built at boot and handed by reference to every task.
//! It owns everything tasks share; interrupt handlers reach it only through
//! the `*_from_isr` methods and [`SerialWake`](crate::serial::SerialWake).
//!
//! - [`Runtime::serve`] is the serial poller (task `U`)
//! - [`Runtime::power`] is the idle loop that puts the node into STOP2
//!   (task `M`, after boot)

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_io_async::Write;
use platform::{LowPowerHal, PortId, RtcClock, UsbPresence};

use crate::audio::{PdmPool, SplMeter};
use crate::board::{ButtonPress, UsbMonitor, UsbTransition};
use crate::config::NodeConfig;
use crate::debug::DebugOutput;
use crate::error::Fatal;
use crate::power::sleep::MIN_SLEEP_MS;
use crate::power::{app_sleep_allowed, ActivePeripherals, SleepManager, SleepOutcome, StayAwake};
use crate::serial::SerialMux;
use crate::supervisor::Supervisor;
use crate::sync::{TaskContext, TaskId, TaskSet, Timeout};
use crate::time_base::MonotonicClock;

/// Longest the idle loop waits before re-checking the sleep gate.
pub const POWER_RECHECK_MS: u32 = 1_000;

/// Shared node state.
pub struct Runtime<'a, W> {
    /// Build-time configuration
    pub config: NodeConfig,
    /// Millisecond time base
    pub clock: &'a MonotonicClock,
    /// Task notifications
    pub tasks: &'a TaskSet<'a>,
    /// Audio capture blocks
    pub pool: &'a PdmPool,
    /// Serial ports
    pub serial: SerialMux<W>,
    /// Operator trace channel
    pub debug: DebugOutput,
    /// Initialised peripherals
    pub peripherals: ActivePeripherals,
    /// USB presence
    pub usb: UsbMonitor,
    /// Latched button press
    pub button: ButtonPress,
    /// Audio level and counters
    pub spl: SplMeter,
    /// Fatal error handling
    pub supervisor: Supervisor,
    last_refusal: Mutex<CriticalSectionRawMutex, Cell<Option<StayAwake>>>,
}

impl<'a, W> Runtime<'a, W> {
    /// Assemble the runtime. `writers` are in [`PortId::ALL`] order.
    pub fn new(
        config: NodeConfig,
        clock: &'a MonotonicClock,
        tasks: &'a TaskSet<'a>,
        pool: &'a PdmPool,
        writers: [W; PortId::COUNT],
        usb: UsbPresence,
    ) -> Self {
        let peripherals = ActivePeripherals::new();
        for port in PortId::ALL {
            if let Some(id) = port.peripheral() {
                if config.port_enabled(port) {
                    peripherals.insert(id);
                }
            }
        }
        Self {
            serial: SerialMux::new(&config, writers),
            config,
            clock,
            tasks,
            pool,
            debug: DebugOutput::new(false),
            peripherals,
            usb: UsbMonitor::new(usb),
            button: ButtonPress::new(),
            spl: SplMeter::new(),
            supervisor: Supervisor::new(),
            last_refusal: Mutex::new(Cell::new(None)),
        }
    }

    /// Receive interrupt: `bytes` arrived on `port`.
    pub fn receive_from_isr(&self, port: PortId, bytes: &[u8]) {
        let wake = self.serial.wake(self.clock, self.tasks);
        if !self.serial.feed(port, &wake).received(bytes) {
            self.debug
                .stage_fmt_from_isr(format_args!("{}: rx overrun\r\n", port.name()), self.tasks.isr());
        }
    }

    /// Receive interrupt: `port` reported a framing, noise or DMA error.
    pub fn receive_error_from_isr(&self, port: PortId) {
        let wake = self.serial.wake(self.clock, self.tasks);
        self.serial.feed(port, &wake).receive_error();
        self.debug
            .stage_fmt_from_isr(format_args!("{}: rx error\r\n", port.name()), self.tasks.isr());
    }

    /// Record the gate's answer. Returns whether it differs from the last one.
    fn note_refusal(&self, refusal: Option<StayAwake>) -> bool {
        self.last_refusal.lock(|c| c.replace(refusal) != refusal)
    }
}

impl<W: Write> Runtime<'_, W> {
    /// One poller pass. Returns how long to wait before the next one.
    pub async fn serve_pass(&self, ctx: &TaskContext) -> Result<u32, Fatal> {
        if self.usb.sync(&self.peripherals) == UsbTransition::Attached {
            self.debug.print(ctx, &self.serial, true, "usb: attached").await?;
        }
        self.serial.backoff().begin_pass();
        let did_work = self.serial.poll_all(ctx, self.tasks).await?;
        self.debug
            .flush_staged(ctx, &self.serial, self.usb.is_present())
            .await?;
        Ok(self
            .serial
            .backoff()
            .next_wait_ms(did_work, self.clock.now_ms()))
    }

    /// The serial poller. Returns only on a fatal error.
    pub async fn serve(&self, ctx: &TaskContext) -> Fatal {
        self.tasks.register(TaskId::Serial, false);
        loop {
            match self.serve_pass(ctx).await {
                Ok(wait) => {
                    self.tasks.take(ctx, Timeout::Ms(wait)).await;
                }
                Err(f) => return f,
            }
        }
    }

    /// One idle-loop pass: sleep if every task is idle and the gate allows.
    pub async fn power_pass<H: LowPowerHal, R: RtcClock>(
        &self,
        ctx: &TaskContext,
        sleep: &mut SleepManager<H, R>,
    ) -> Result<SleepOutcome, Fatal> {
        let (idle, line) = self.tasks.idle_trace(ctx.id());
        trace!("power: {}", line.as_str());
        if idle < MIN_SLEEP_MS {
            self.tasks.take(ctx, Timeout::Ms(MIN_SLEEP_MS)).await;
            return Ok(SleepOutcome::NotEntered);
        }
        let allowed = app_sleep_allowed(self.serial.is_active(), self.usb.presence(), &self.config);
        let wake = self.serial.wake(self.clock, self.tasks);
        let outcome = sleep.sleep_cycle(self.clock, &self.peripherals, allowed, idle, &wake)?;
        match outcome {
            SleepOutcome::Awake(reason) => {
                trace!("power: awake: {}", reason.name());
                if self.note_refusal(Some(reason)) {
                    self.debug
                        .print_fmt(
                            ctx,
                            &self.serial,
                            self.usb.is_present(),
                            format_args!("power: awake: {} {}", reason.name(), line.as_str()),
                        )
                        .await?;
                }
                self.tasks
                    .take(ctx, Timeout::Ms(idle.min(POWER_RECHECK_MS)))
                    .await;
            }
            SleepOutcome::Slept { ms } => {
                self.note_refusal(None);
                // Timed waits were paced on a timer that was frozen in STOP2.
                self.tasks.clock_stepped();
                self.debug
                    .print_fmt(
                        ctx,
                        &self.serial,
                        self.usb.is_present(),
                        format_args!("power: slept {ms} ms"),
                    )
                    .await?;
                embassy_futures::yield_now().await;
            }
            SleepOutcome::NotEntered => {}
        }
        Ok(outcome)
    }

    /// The idle loop. Returns only on a fatal error.
    pub async fn power<H: LowPowerHal, R: RtcClock>(
        &self,
        ctx: &TaskContext,
        sleep: &mut SleepManager<H, R>,
    ) -> Fatal {
        loop {
            if let Err(f) = self.power_pass(ctx, sleep).await {
                return f;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::NODE_CONFIG;
    use platform::mocks::{MockLowPower, MockRtc, MockSerialWriter};
    use platform::PeripheralId;

    fn runtime<'a>(
        clock: &'a MonotonicClock,
        tasks: &'a TaskSet<'a>,
        pool: &'a PdmPool,
    ) -> Runtime<'a, MockSerialWriter> {
        Runtime::new(
            NODE_CONFIG,
            clock,
            tasks,
            pool,
            core::array::from_fn(|_| MockSerialWriter::new()),
            UsbPresence::Absent,
        )
    }

    #[test]
    fn enabled_uarts_start_active() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        let pool = PdmPool::new();
        let rt = runtime(&clock, &tasks, &pool);
        assert!(rt.peripherals.contains(PeripheralId::Lpuart1));
        assert!(rt.peripherals.contains(PeripheralId::Usart1));
        assert!(!rt.peripherals.contains(PeripheralId::Usart2));
        assert!(!rt.peripherals.contains(PeripheralId::Usb));
    }

    #[tokio::test]
    async fn serve_pass_parks_when_quiet_and_spins_on_traffic() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        let pool = PdmPool::new();
        let rt = runtime(&clock, &tasks, &pool);
        let ctx = TaskContext::new(TaskId::Serial);
        assert_eq!(
            rt.serve_pass(&ctx).await.unwrap(),
            NODE_CONFIG.backoff.park_ms
        );

        clock.step(10_000);
        let wake = rt.serial.wake(&clock, &tasks);
        rt.serial.feed(PortId::Usart1, &wake).received(b"mem");
        assert_eq!(
            rt.serve_pass(&ctx).await.unwrap(),
            NODE_CONFIG.backoff.busy_ms
        );
        assert_eq!(
            rt.serve_pass(&ctx).await.unwrap(),
            NODE_CONFIG.backoff.idle_ms
        );
    }

    #[tokio::test]
    async fn serve_pass_brings_usb_up() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        let pool = PdmPool::new();
        let rt = runtime(&clock, &tasks, &pool);
        let ctx = TaskContext::new(TaskId::Serial);
        rt.usb.on_edge_from_isr(UsbPresence::Present, tasks.isr());
        rt.serve_pass(&ctx).await.unwrap();
        assert!(rt.peripherals.contains(PeripheralId::Usb));
    }

    #[tokio::test]
    async fn power_pass_sleeps_when_everything_is_parked() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        let pool = PdmPool::new();
        let rt = runtime(&clock, &tasks, &pool);
        let main = TaskContext::new(TaskId::Main);
        let rtc = MockRtc::new(0);
        let mut sleep = SleepManager::new(MockLowPower::new().with_rtc(rtc.clone(), 5_000), rtc);

        // No other task registered: idle forever, STOP2 with no wakeup timer.
        let out = rt.power_pass(&main, &mut sleep).await.unwrap();
        assert_eq!(out, SleepOutcome::Slept { ms: 5_000 });
        assert_eq!(clock.now_ms(), 4_999);
        assert!(rt.peripherals.contains(PeripheralId::Usart1));
    }

    async fn usb_text(rt: &Runtime<'_, MockSerialWriter>) -> String {
        let ctx = TaskContext::new(TaskId::Main);
        let w = rt.serial.port(PortId::Usb).tx.lock(&ctx).await.unwrap();
        w.text()
    }

    #[tokio::test]
    async fn attach_and_refusal_changes_are_traced() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        let pool = PdmPool::new();
        let rt = runtime(&clock, &tasks, &pool);
        let serial = TaskContext::new(TaskId::Serial);
        let main = TaskContext::new(TaskId::Main);
        let rtc = MockRtc::new(0);
        let mut sleep = SleepManager::new(MockLowPower::new().with_rtc(rtc.clone(), 5_000), rtc);
        rt.debug.set_enabled(true);

        rt.usb.on_edge_from_isr(UsbPresence::Present, tasks.isr());
        rt.serve_pass(&serial).await.unwrap();
        assert_eq!(usb_text(&rt).await, "usb: attached\r\n");

        // Same refusal twice: traced once.
        for _ in 0..2 {
            tasks.isr().give_from_isr(TaskId::Main);
            let out = rt.power_pass(&main, &mut sleep).await.unwrap();
            assert_eq!(out, SleepOutcome::Awake(StayAwake::AppVeto));
        }
        let text = usb_text(&rt).await;
        assert!(text.starts_with("usb: attached\r\npower: awake: app-veto "), "{text}");
        assert_eq!(text.matches("power: awake").count(), 1);
    }

    #[tokio::test]
    async fn power_pass_stays_awake_while_a_task_runs() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        tasks.register(TaskId::Request, false);
        let pool = PdmPool::new();
        let rt = runtime(&clock, &tasks, &pool);
        let main = TaskContext::new(TaskId::Main);
        let rtc = MockRtc::new(0);
        let mut sleep = SleepManager::new(MockLowPower::new().with_rtc(rtc.clone(), 5_000), rtc);

        let out = rt.power_pass(&main, &mut sleep).await.unwrap();
        assert_eq!(out, SleepOutcome::NotEntered);
        assert!(!sleep.hal().stop_attempted());
    }
}
