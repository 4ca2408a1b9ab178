//! Embassy task wrappers and static wiring for the hardware build.
//!
//! Embassy tasks cannot be generic, so each one pins the board types and
//! forwards to the generic loop in the module that owns the behaviour.
//!
//! | Task            | Id  | Body                              |
//! |-----------------|-----|-----------------------------------|
//! | `main`          | `M` | boot, then [`Runtime::power`]     |
//! | `serial_task`   | `U` | [`Runtime::serve`]                |
//! | `request_task`  | `R` | [`dispatch::run`]                 |
//! | `audio_task`    | `A` | [`audio::run`]                    |
//!
//! The receive, button and VBUS tasks stand in for interrupt handlers and
//! only use the `*_from_isr` side of the runtime.

use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::peripherals::{DMA1_CH5, DMA2_CH7, LPUART1, USART1};
use embassy_stm32::usart::{Error as UartError, UartRx};
use platform::{PortId, UsbPresence};
use static_cell::StaticCell;

use crate::audio::{self, PdmPool};
use crate::board::stm32::{BoardWriter, SaiPdm, Stm32System};
use crate::board::{Button, StatusLed};
use crate::dispatch;
use crate::error::Fatal;
use crate::runtime::Runtime;
use crate::sync::{TaskContext, TaskId, TaskSet};
use crate::time_base::MonotonicClock;

/// The runtime as the board instantiates it.
pub type BoardRuntime = Runtime<'static, BoardWriter>;

/// Time base, ticked from the SysTick exception.
pub static CLOCK: MonotonicClock = MonotonicClock::new();

/// Task notifications.
pub static TASKS: TaskSet<'static> = TaskSet::new(&CLOCK);

/// PDM capture blocks.
pub static POOL: PdmPool = PdmPool::new();

static RUNTIME: StaticCell<BoardRuntime> = StaticCell::new();

/// Bytes read per receive DMA transfer.
const RX_CHUNK: usize = 32;

/// Build the runtime once.
pub fn runtime(
    writers: [BoardWriter; PortId::COUNT],
    usb: UsbPresence,
) -> &'static BoardRuntime {
    RUNTIME.init(Runtime::new(
        crate::config::NODE_CONFIG,
        &CLOCK,
        &TASKS,
        &POOL,
        writers,
        usb,
    ))
}

fn fail(rt: &BoardRuntime, fatal: Fatal) {
    rt.supervisor.fail(fatal, &mut Stm32System);
}

/// Serial poller.
#[embassy_executor::task]
pub async fn serial_task(rt: &'static BoardRuntime) {
    let ctx = TaskContext::new(TaskId::Serial);
    let fatal = rt.serve(&ctx).await;
    fail(rt, fatal);
}

/// Request processing.
#[embassy_executor::task]
pub async fn request_task(rt: &'static BoardRuntime, led: Output<'static, AnyPin>) {
    let ctx = TaskContext::new(TaskId::Request);
    let fatal = dispatch::run(rt, &ctx, Stm32System, StatusLed::new(led)).await;
    fail(rt, fatal);
}

/// Microphone capture and SPL.
#[embassy_executor::task]
pub async fn audio_task(rt: &'static BoardRuntime, pdm: SaiPdm) {
    let ctx = TaskContext::new(TaskId::Audio);
    audio::run(rt, &ctx, pdm).await;
}

fn deliver(rt: &BoardRuntime, port: PortId, buf: &[u8], read: Result<usize, UartError>) {
    match read {
        Ok(n) => rt.receive_from_isr(port, buf.get(..n).unwrap_or_default()),
        Err(_) => rt.receive_error_from_isr(port),
    }
}

/// LPUART1 receive path.
#[embassy_executor::task]
pub async fn lpuart1_rx_task(rt: &'static BoardRuntime, mut rx: UartRx<'static, LPUART1, DMA2_CH7>) {
    let mut buf = [0u8; RX_CHUNK];
    loop {
        let read = rx.read_until_idle(&mut buf).await;
        deliver(rt, PortId::Lpuart1, &buf, read);
    }
}

/// USART1 receive path.
#[embassy_executor::task]
pub async fn usart1_rx_task(rt: &'static BoardRuntime, mut rx: UartRx<'static, USART1, DMA1_CH5>) {
    let mut buf = [0u8; RX_CHUNK];
    loop {
        let read = rx.read_until_idle(&mut buf).await;
        deliver(rt, PortId::Usart1, &buf, read);
    }
}

/// Debounced button.
#[embassy_executor::task]
pub async fn button_task(rt: &'static BoardRuntime, pin: ExtiInput<'static, AnyPin>) {
    let mut button = Button::new(pin, rt.config.debounce_ms);
    button.run(rt.clock, &rt.button, rt.tasks.isr()).await;
}

/// VBUS edges.
#[embassy_executor::task]
pub async fn vbus_task(rt: &'static BoardRuntime, mut pin: ExtiInput<'static, AnyPin>) {
    loop {
        pin.wait_for_any_edge().await;
        let presence = if pin.is_high() {
            UsbPresence::Present
        } else {
            UsbPresence::Absent
        };
        rt.usb.on_edge_from_isr(presence, rt.tasks.isr());
    }
}
