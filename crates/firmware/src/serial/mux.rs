//! The serial multiplexer.
//!
//! One poller task moves bytes from every port's receive ring into that
//! port's line accumulator. A completed line wakes the port's owner task,
//! which takes it with [`SerialMux::lock`], replies, and releases it with
//! [`LineGuard::unlock`]. While a line waits to be consumed, further bytes
//! stay in the ring.

use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use platform::{IsrNotify, IsrSafe, PortId};

use super::port::LineState;
use super::{transmit, PollBackoff, RxFeed, SerialPortDescriptor};
use crate::config::{NodeConfig, TransmitConfig};
use crate::error::Fatal;
use crate::sync::{OrderedGuard, TaskContext, TaskId, TaskSet};
use crate::time_base::MonotonicClock;

/// Back-pressure delay when a byte arrives for a port whose previous line
/// has not been consumed yet.
pub const UNCONSUMED_LINE_DELAY_MS: u64 = 50;

/// Reply terminator.
pub const CRLF: &[u8] = b"\r\n";

/// All four port descriptors plus the poll pacing state.
pub struct SerialMux<W> {
    usb: SerialPortDescriptor<W>,
    lpuart1: SerialPortDescriptor<W>,
    usart1: SerialPortDescriptor<W>,
    usart2: SerialPortDescriptor<W>,
    backoff: PollBackoff,
    transmit: TransmitConfig,
}

impl<W> SerialMux<W> {
    /// Build the multiplexer. `writers` are in [`PortId::ALL`] order.
    ///
    /// Every port delivers its lines to the request task.
    pub fn new(config: &NodeConfig, writers: [W; PortId::COUNT]) -> Self {
        let [usb, lpuart1, usart1, usart2] = writers;
        let desc = |port, w| {
            SerialPortDescriptor::new(port, TaskId::Request, config.port_enabled(port), w)
        };
        Self {
            usb: desc(PortId::Usb, usb),
            lpuart1: desc(PortId::Lpuart1, lpuart1),
            usart1: desc(PortId::Usart1, usart1),
            usart2: desc(PortId::Usart2, usart2),
            backoff: PollBackoff::new(config.backoff),
            transmit: config.transmit,
        }
    }

    /// A port's descriptor.
    pub const fn port(&self, id: PortId) -> &SerialPortDescriptor<W> {
        match id {
            PortId::Usb => &self.usb,
            PortId::Lpuart1 => &self.lpuart1,
            PortId::Usart1 => &self.usart1,
            PortId::Usart2 => &self.usart2,
        }
    }

    /// Poll pacing.
    pub const fn backoff(&self) -> &PollBackoff {
        &self.backoff
    }

    /// Whether the poller has seen traffic recently.
    pub fn is_active(&self) -> bool {
        self.backoff.is_active()
    }

    /// The notifier receive interrupts use for every port.
    pub const fn wake<'a, 'c>(
        &'a self,
        clock: &'a MonotonicClock,
        tasks: &'a TaskSet<'c>,
    ) -> SerialWake<'a, 'c> {
        SerialWake {
            backoff: &self.backoff,
            clock,
            tasks,
        }
    }

    /// Interrupt-side feed for one port.
    pub const fn feed<'a, 'c>(
        &'a self,
        port: PortId,
        wake: &'a SerialWake<'a, 'c>,
    ) -> RxFeed<'a, SerialWake<'a, 'c>> {
        self.port(port).channel.feed(wake)
    }

    /// Move at most one byte from `port`'s ring into its line.
    ///
    /// Returns `false` when there was nothing to do: the line is held by
    /// another task, the ring is empty, or the previous line is still
    /// waiting to be consumed.
    pub async fn poll_port(
        &self,
        ctx: &TaskContext,
        tasks: &TaskSet<'_>,
        port: PortId,
    ) -> Result<bool, Fatal> {
        let desc = self.port(port);
        if desc.rx.is_locked_by_other(ctx) || !desc.channel.available() {
            return Ok(false);
        }
        let Some(mut line) = desc.rx.try_lock(ctx)? else {
            return Ok(false);
        };
        if line.terminated() {
            drop(line);
            tasks.give(ctx, desc.owner());
            Timer::after(Duration::from_millis(UNCONSUMED_LINE_DELAY_MS)).await;
            return Ok(false);
        }
        let Some(byte) = desc.channel.pop() else {
            return Ok(false);
        };
        let overflowed = line.overflowed();
        if line.accept(byte) {
            drop(line);
            trace!("serial: line on {}", port.name());
            tasks.give(ctx, desc.owner());
        } else if !overflowed && line.overflowed() {
            warn!("serial: line overflow on {}", port.name());
        }
        Ok(true)
    }

    /// Poll every enabled port until none has work.
    ///
    /// Returns whether any byte moved.
    pub async fn poll_all(&self, ctx: &TaskContext, tasks: &TaskSet<'_>) -> Result<bool, Fatal> {
        let mut did_work = false;
        loop {
            let mut pass = false;
            for port in PortId::ALL {
                if self.port(port).enabled() && self.poll_port(ctx, tasks, port).await? {
                    pass = true;
                }
            }
            if !pass {
                return Ok(did_work);
            }
            did_work = true;
        }
    }

    /// Take `port`'s completed line, if there is one.
    ///
    /// Never blocks. The receive lock stays held until the guard is
    /// unlocked or dropped.
    pub fn lock<'a>(
        &'a self,
        ctx: &'a TaskContext,
        port: PortId,
    ) -> Result<Option<LineGuard<'a>>, Fatal> {
        let desc = self.port(port);
        if desc.rx.is_locked_by_other(ctx) {
            return Ok(None);
        }
        let Some(guard) = desc.rx.try_lock(ctx)? else {
            return Ok(None);
        };
        if !(guard.started() && guard.terminated()) {
            return Ok(None);
        }
        Ok(Some(LineGuard { port, guard }))
    }
}

impl<W: Write> SerialMux<W> {
    async fn send(&self, ctx: &TaskContext, port: PortId, parts: &[&[u8]]) -> Result<(), Fatal> {
        let desc = self.port(port);
        if !desc.enabled() {
            return Ok(());
        }
        let mut w = desc.tx.lock(ctx).await?;
        if let Err(e) = transmit::transmit(&mut *w, parts, &self.transmit).await {
            // Best effort: a host that stopped reading loses the reply.
            debug!("serial: tx on {} abandoned: {}", port.name(), e.name());
        }
        Ok(())
    }

    /// Write `data` to `port`. Empty data sends nothing.
    pub async fn output(&self, ctx: &TaskContext, port: PortId, data: &[u8]) -> Result<(), Fatal> {
        if data.is_empty() {
            return Ok(());
        }
        self.send(ctx, port, &[data]).await
    }

    /// Write `data` followed by CR LF as one transmit. Empty data sends a
    /// bare CR LF.
    pub async fn output_ln(
        &self,
        ctx: &TaskContext,
        port: PortId,
        data: &[u8],
    ) -> Result<(), Fatal> {
        self.send(ctx, port, &[data, CRLF]).await
    }
}

/// A completed line, held exclusively.
pub struct LineGuard<'a> {
    port: PortId,
    guard: OrderedGuard<'a, LineState>,
}

impl LineGuard<'_> {
    /// Port the line arrived on.
    pub const fn port(&self) -> PortId {
        self.port
    }

    /// Line text, without terminator or NUL.
    pub fn line(&self) -> &[u8] {
        self.guard.text()
    }

    /// Line length. Zero for a bare terminator.
    pub fn len(&self) -> usize {
        self.guard.text().len()
    }

    /// Whether the line is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether diagnostic commands are accepted from this port.
    pub const fn diag_allowed(&self) -> bool {
        self.port.is_diagnostic()
    }

    /// Whether bytes were dropped because the line was too long.
    pub fn overflowed(&self) -> bool {
        self.guard.overflowed()
    }

    /// Release the port. With `reset` the line is discarded and the next
    /// one can start; without it the line stays pending.
    pub fn unlock(mut self, reset: bool) {
        if reset {
            self.guard.reset();
        }
    }
}

/// Receive-interrupt notifier: records activity and wakes the poller.
pub struct SerialWake<'a, 'c> {
    backoff: &'a PollBackoff,
    clock: &'a MonotonicClock,
    tasks: &'a TaskSet<'c>,
}

impl IsrSafe for SerialWake<'_, '_> {}

impl IsrNotify for SerialWake<'_, '_> {
    fn notify_from_isr(&self, error: bool) {
        self.backoff.mark_work(self.clock.now_ms());
        if error {
            trace!("serial: receive error");
        }
        self.tasks.isr().give_from_isr(TaskId::Serial);
    }
}
