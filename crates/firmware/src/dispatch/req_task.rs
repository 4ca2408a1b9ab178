//! The request task.
//!
//! Woken by the serial poller whenever a port has a complete line, and by
//! the button interrupt. Each pass visits every enabled port once, replies,
//! and then carries out any restart or bootloader request after the reply
//! has had time to drain.

use core::fmt::Write as _;

use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;
use embedded_io_async::Write;
use platform::{PortId, SystemControl};

use super::{request, Command};
use crate::board::StatusLed;
use crate::error::{Error, Fatal};
use crate::runtime::Runtime;
use crate::supervisor::DeferredWork;
use crate::sync::{TaskContext, TaskId, Timeout};

/// Ports in the order a pass serves them.
pub const REQUEST_PORTS: [PortId; PortId::COUNT] =
    [PortId::Lpuart1, PortId::Usart1, PortId::Usart2, PortId::Usb];

/// Longest the task parks with nothing to do.
pub const REQUEST_IDLE_MS: u32 = 3_600_000;

/// Serve one line from `port`, if one is waiting.
///
/// Returns `None` when the port had no complete line, otherwise the work
/// the request left behind. The port is released before the reply is
/// written so the poller can start on the next line.
pub async fn process_port<W: Write, S: SystemControl, L: OutputPin>(
    rt: &Runtime<'_, W>,
    ctx: &TaskContext,
    system: &mut S,
    led: &mut StatusLed<L>,
    port: PortId,
) -> Result<Option<DeferredWork>, Fatal> {
    let Some(line) = rt.serial.lock(ctx, port)? else {
        return Ok(None);
    };
    if line.is_empty() {
        line.unlock(true);
        rt.serial.output_ln(ctx, port, b"").await?;
        return Ok(Some(DeferredWork::None));
    }

    led.busy(true);
    let result = if line.overflowed() {
        Err(Error::Memory)
    } else {
        request::process(rt, system, port, line.line())
    };
    line.unlock(true);

    let usb_present = rt.usb.is_present();
    let (sent, deferred) = match result {
        Ok(reply) => {
            if reply.command == Command::Unrecognized && port != PortId::Usb {
                rt.debug
                    .print_fmt(
                        ctx,
                        &rt.serial,
                        usb_present,
                        format_args!("{}: {}", port.name(), reply.text),
                    )
                    .await?;
            }
            (
                rt.serial.output_ln(ctx, port, reply.text.as_bytes()).await,
                reply.deferred,
            )
        }
        Err(e) => {
            if let Some(fatal) = e.fatal() {
                led.busy(false);
                return Err(fatal);
            }
            debug!("request: {} on {}", e.name(), port.name());
            if port != PortId::Usb {
                rt.debug
                    .print_fmt(ctx, &rt.serial, usb_present, format_args!("{}: {e}", port.name()))
                    .await?;
            }
            let mut text: heapless::String<64> = heapless::String::new();
            let _ = write!(text, "{e}");
            (
                rt.serial.output_ln(ctx, port, text.as_bytes()).await,
                DeferredWork::None,
            )
        }
    };
    led.busy(false);
    sent?;
    Ok(Some(deferred))
}

/// One pass over every enabled port and the button latch.
///
/// Returns whether anything was served.
pub async fn pass<W: Write, S: SystemControl, L: OutputPin>(
    rt: &Runtime<'_, W>,
    ctx: &TaskContext,
    system: &mut S,
    led: &mut StatusLed<L>,
) -> Result<bool, Fatal> {
    let mut did_work = false;
    for port in REQUEST_PORTS {
        if !rt.config.port_enabled(port) {
            continue;
        }
        let Some(work) = process_port(rt, ctx, system, led, port).await? else {
            continue;
        };
        did_work = true;
        if work != DeferredWork::None {
            info!("request: {} in {}ms", work.name(), rt.config.settle_ms);
            Timer::after(Duration::from_millis(u64::from(rt.config.settle_ms))).await;
            rt.supervisor.perform(work, system);
        }
    }
    if rt.button.take() {
        debug!("request: button");
        led.alive_blink().await;
        did_work = true;
    }
    Ok(did_work)
}

/// The request task body. Returns only on a fatal error.
pub async fn run<W: Write, S: SystemControl, L: OutputPin>(
    rt: &Runtime<'_, W>,
    ctx: &TaskContext,
    mut system: S,
    mut led: StatusLed<L>,
) -> Fatal {
    rt.tasks.register(TaskId::Request, false);
    loop {
        match pass(rt, ctx, &mut system, &mut led).await {
            Ok(true) => {}
            Ok(false) => {
                rt.tasks.take(ctx, Timeout::Ms(REQUEST_IDLE_MS)).await;
            }
            Err(f) => return f,
        }
    }
}
