//! Desktop simulator for the sensor node.
//!
//! Runs the same runtime, dispatcher, audio pipeline and sleep manager as
//! the board, with host stand-ins for the hardware:
//!
//! - stdin/stdout are USART1, a diagnostic port, so `mem`, `power`, `trace`
//!   and friends work from a terminal
//! - the microphone is a first-order sigma-delta modulator fed with a sine
//! - STOP2 is a thread sleep that the next byte on stdin cuts short
//!
//! Logs go to stderr through `tracing`; set `RUST_LOG` to change the level.
//!
//! ```bash
//! cargo run --bin node_sim --features emulator -- --no-audio
//! ```

#![allow(missing_docs)]
// Desktop-only binary: float tone synthesis and wall-clock maths.
#![allow(clippy::arithmetic_side_effects)]

use std::f32::consts::TAU;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use embassy_time::Timer;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_io_async::{ErrorType, Write};
use tokio::io::AsyncWriteExt;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use firmware::audio::PdmPool;
use firmware::board::StatusLed;
use firmware::boot;
use firmware::power::SleepManager;
use firmware::sync::{TaskContext, TaskId, TaskSet};
use firmware::{dispatch, MonotonicClock, Runtime, NODE_CONFIG};
use platform::{
    CaptureError, LowPowerHal, PdmSource, PeripheralId, PortId, PowerError, RtcClock,
    SelfTestReport, SystemControl, UsbPresence,
};

#[derive(Parser)]
#[command(name = "node_sim", about = "Sensor node simulator", version)]
struct Cli {
    /// Leave the microphone path off so the node can reach STOP2
    #[arg(long)]
    no_audio: bool,

    /// Never enter STOP2
    #[arg(long)]
    no_stop: bool,

    /// Start with the wire trace channel on
    #[arg(long)]
    trace: bool,

    /// Tone amplitude as a fraction of full scale
    #[arg(long, default_value_t = 0.05)]
    tone_level: f32,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 1_000.0)]
    tone_hz: f32,

    /// Longest single simulated STOP2, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    max_stop_ms: u32,
}

static CLOCK: MonotonicClock = MonotonicClock::new();
static TASKS: TaskSet<'static> = TaskSet::new(&CLOCK);
static POOL: PdmPool = PdmPool::new();

/// SysTick enable, cleared while "stopped".
static TICK_ON: AtomicBool = AtomicBool::new(true);
/// Set by the stdin thread; the simulated STOP2 polls it.
static RX_PENDING: AtomicBool = AtomicBool::new(false);

/// Granularity of the simulated STOP2.
const STOP_SLICE_MS: u64 = 10;
/// Bytes read from stdin per interrupt.
const STDIN_CHUNK: usize = 64;

type SimRuntime = Runtime<'static, SimWriter>;

// ── Serial ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SimIoError;

impl embedded_io::Error for SimIoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

/// Port transmitter: stdout for USART1, a sink for the rest.
enum SimWriter {
    Stdout(tokio::io::Stdout),
    Sink,
}

impl ErrorType for SimWriter {
    type Error = SimIoError;
}

impl Write for SimWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self {
            Self::Stdout(out) => {
                out.write_all(buf).await.map_err(|_| SimIoError)?;
                out.flush().await.map_err(|_| SimIoError)?;
                Ok(buf.len())
            }
            Self::Sink => Ok(buf.len()),
        }
    }
}

/// Feed stdin into USART1 from a plain thread, the way the receive
/// interrupt would.
fn spawn_stdin(rt: &'static SimRuntime) {
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut buf = [0u8; STDIN_CHUNK];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => {
                    tracing::info!("stdin closed");
                    break;
                }
                Ok(n) => {
                    RX_PENDING.store(true, Ordering::Release);
                    rt.receive_from_isr(PortId::Usart1, buf.get(..n).unwrap_or_default());
                }
            }
        }
    });
}

// ── Power ───────────────────────────────────────────────────────────────────

struct SimLowPower {
    max_stop_ms: u32,
}

impl LowPowerHal for SimLowPower {
    fn debugger_attached(&self) -> bool {
        false
    }

    fn usb_presence(&self) -> UsbPresence {
        UsbPresence::Absent
    }

    fn deinit_peripheral(&mut self, id: PeripheralId) {
        tracing::trace!(peripheral = id.name(), "deinit");
    }

    fn reinit_peripheral(&mut self, id: PeripheralId) -> Result<(), PowerError> {
        tracing::trace!(peripheral = id.name(), "reinit");
        Ok(())
    }

    fn disable_dma(&mut self) {}

    fn enable_dma(&mut self) -> Result<(), PowerError> {
        Ok(())
    }

    fn suspend_tick(&mut self) {
        TICK_ON.store(false, Ordering::Release);
    }

    fn resume_tick(&mut self) {
        TICK_ON.store(true, Ordering::Release);
    }

    fn arm_wake_uart(&mut self) {}

    fn resume_wake_uart(&mut self) {}

    fn gpio_low_power(&mut self) {}

    fn enter_stop2(&mut self, max_ms: u32) -> bool {
        // A byte already waiting means WFI would fall straight through.
        if RX_PENDING.swap(false, Ordering::AcqRel) {
            return false;
        }
        let cap = if max_ms == 0 {
            self.max_stop_ms
        } else {
            max_ms.min(self.max_stop_ms)
        };
        let deadline = Instant::now() + Duration::from_millis(u64::from(cap));
        while Instant::now() < deadline {
            if RX_PENDING.swap(false, Ordering::AcqRel) {
                break;
            }
            std::thread::sleep(Duration::from_millis(STOP_SLICE_MS));
        }
        tracing::debug!(cap_ms = cap, "left simulated STOP2");
        true
    }

    fn restore_clocks(&mut self) -> Result<(), PowerError> {
        Ok(())
    }
}

/// Wall clock standing in for the RTC.
struct SimRtc {
    start: Instant,
}

impl RtcClock for SimRtc {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

// ── System ──────────────────────────────────────────────────────────────────

struct SimSystem;

impl SystemControl for SimSystem {
    fn restart(&mut self) {
        tracing::warn!("restart requested, exiting");
        std::process::exit(0);
    }

    fn enter_bootloader(&mut self) {
        tracing::warn!("bootloader requested, exiting");
        std::process::exit(0);
    }

    fn self_test(&mut self) -> SelfTestReport {
        SelfTestReport {
            checks: 2,
            failures: 0,
        }
    }
}

/// Status LED that logs its level.
struct SimLed;

impl PinErrorType for SimLed {
    type Error = core::convert::Infallible;
}

impl OutputPin for SimLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        tracing::trace!("led off");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        tracing::trace!("led on");
        Ok(())
    }
}

// ── Microphone ──────────────────────────────────────────────────────────────

/// First-order sigma-delta modulator over a sine tone, paced at the real
/// PDM bit rate.
struct SimPdm {
    level: f32,
    step: f32,
    phase: f32,
    integrator: f32,
    block_us: u64,
}

impl SimPdm {
    fn new(level: f32, tone_hz: f32, bit_rate_hz: u32, block_bits: u32) -> Self {
        let bit_rate = bit_rate_hz.max(1) as f32;
        Self {
            level: level.clamp(0.0, 1.0),
            step: TAU * tone_hz / bit_rate,
            phase: 0.0,
            integrator: 0.0,
            block_us: u64::from(block_bits) * 1_000_000 / u64::from(bit_rate_hz.max(1)),
        }
    }

    fn next_bit(&mut self) -> bool {
        let x = self.level * self.phase.sin();
        self.phase = (self.phase + self.step) % TAU;
        let high = self.integrator >= 0.0;
        self.integrator += x - if high { 1.0 } else { -1.0 };
        high
    }
}

impl PdmSource for SimPdm {
    async fn read_block(&mut self, block: &mut [u8]) -> Result<(), CaptureError> {
        Timer::after_micros(self.block_us).await;
        for byte in block.iter_mut() {
            let mut bits = 0u8;
            for _ in 0..8 {
                bits = (bits << 1) | u8::from(self.next_bit());
            }
            *byte = bits;
        }
        Ok(())
    }
}

// ── Entry ───────────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    for line in boot::banner_lines() {
        tracing::info!("{line}");
    }

    let mut config = NODE_CONFIG;
    config.audio.enabled = !cli.no_audio;
    config.allow_stop2 = !cli.no_stop;

    let mut led = StatusLed::new(SimLed);
    led.restart_signal().await;

    let writers = [
        SimWriter::Sink,
        SimWriter::Sink,
        SimWriter::Stdout(tokio::io::stdout()),
        SimWriter::Sink,
    ];
    let power = SimLowPower {
        max_stop_ms: cli.max_stop_ms,
    };
    let rt: &'static SimRuntime = Box::leak(Box::new(Runtime::new(
        config,
        &CLOCK,
        &TASKS,
        &POOL,
        writers,
        power.usb_presence(),
    )));
    rt.debug.set_enabled(cli.trace);
    spawn_stdin(rt);

    let block_bits = u32::try_from(firmware::config::PDM_BLOCK_BYTES * 8).unwrap_or(u32::MAX);
    let pdm = SimPdm::new(
        cli.tone_level,
        cli.tone_hz,
        config.audio.pdm_clock.get(),
        block_bits,
    );

    let ticker = async {
        let mut interval = tokio::time::interval(Duration::from_millis(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if TICK_ON.load(Ordering::Acquire) {
                CLOCK.on_tick();
            }
        }
    };
    let serial = async {
        let ctx = TaskContext::new(TaskId::Serial);
        rt.serve(&ctx).await
    };
    let request = async {
        let ctx = TaskContext::new(TaskId::Request);
        dispatch::run(rt, &ctx, SimSystem, led).await
    };
    let audio = async {
        let ctx = TaskContext::new(TaskId::Audio);
        firmware::audio::run(rt, &ctx, pdm).await;
    };
    let idle = async {
        let ctx = TaskContext::new(TaskId::Main);
        rt.tasks.register(TaskId::Main, false);
        let mut sleep = SleepManager::new(
            power,
            SimRtc {
                start: Instant::now(),
            },
        );
        rt.power(&ctx, &mut sleep).await
    };

    let fatal = tokio::select! {
        f = serial => f,
        f = request => f,
        f = idle => f,
        _ = audio => return Ok(()),
        _ = ticker => return Ok(()),
    };
    tracing::error!(fatal = fatal.name(), "fatal error");
    rt.supervisor.fail(fatal, &mut SimSystem);
    Ok(())
}
