//! Operator trace channel.
//!
//! Separate from `defmt`/`tracing`: this is text a technician sees on the
//! USB port after typing `trace on`. Interrupt handlers cannot transmit, so
//! they stage text in a small buffer that the serial poller flushes.

use core::cell::RefCell;
use core::fmt::{self, Write as _};
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_io_async::Write;
use platform::PortId;

use crate::config::ISR_DEBUG_BYTES;
use crate::error::Fatal;
use crate::serial::SerialMux;
use crate::sync::{IsrTasks, TaskContext, TaskId};

/// Longest single trace line sent from task context.
pub const TRACE_LINE_BYTES: usize = 128;

/// Appends to a fixed buffer, dropping whatever does not fit.
struct Truncating<'a, const N: usize>(&'a mut heapless::Vec<u8, N>);

impl<const N: usize> fmt::Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N.saturating_sub(self.0.len());
        let bytes = s.as_bytes();
        let _ = self
            .0
            .extend_from_slice(bytes.get(..room.min(bytes.len())).unwrap_or_default());
        Ok(())
    }
}

/// Wire trace output.
pub struct DebugOutput {
    enabled: AtomicBool,
    staged: Mutex<CriticalSectionRawMutex, RefCell<heapless::Vec<u8, ISR_DEBUG_BYTES>>>,
}

impl DebugOutput {
    /// Trace channel, initially on or off.
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            staged: Mutex::new(RefCell::new(heapless::Vec::new())),
        }
    }

    /// Turn tracing on or off.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Release);
    }

    /// Whether tracing is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Queue text from interrupt context and wake the poller to send it.
    ///
    /// Text that does not fit is cut off.
    pub fn stage_from_isr(&self, text: &str, tasks: IsrTasks<'_, '_>) {
        self.stage_fmt_from_isr(format_args!("{text}"), tasks);
    }

    /// [`stage_from_isr`][Self::stage_from_isr] for formatted text.
    pub fn stage_fmt_from_isr(&self, args: fmt::Arguments<'_>, tasks: IsrTasks<'_, '_>) {
        if !self.is_enabled() {
            return;
        }
        self.staged.lock(|s| {
            let _ = Truncating(&mut *s.borrow_mut()).write_fmt(args);
        });
        tasks.give_from_isr(TaskId::Serial);
    }

    fn take_staged(&self) -> heapless::Vec<u8, ISR_DEBUG_BYTES> {
        self.staged.lock(|s| core::mem::take(&mut *s.borrow_mut()))
    }

    /// Send a trace line to USB, if tracing is on and USB is attached.
    pub async fn print<W: Write>(
        &self,
        ctx: &TaskContext,
        serial: &SerialMux<W>,
        usb_present: bool,
        text: &str,
    ) -> Result<(), Fatal> {
        if !self.is_enabled() || !usb_present {
            return Ok(());
        }
        serial.output_ln(ctx, PortId::Usb, text.as_bytes()).await
    }

    /// [`print`][Self::print] for formatted text, cut at
    /// [`TRACE_LINE_BYTES`].
    pub async fn print_fmt<W: Write>(
        &self,
        ctx: &TaskContext,
        serial: &SerialMux<W>,
        usb_present: bool,
        args: fmt::Arguments<'_>,
    ) -> Result<(), Fatal> {
        if !self.is_enabled() || !usb_present {
            return Ok(());
        }
        let mut line = heapless::Vec::<u8, TRACE_LINE_BYTES>::new();
        let _ = Truncating(&mut line).write_fmt(args);
        serial.output_ln(ctx, PortId::Usb, &line).await
    }

    /// Send whatever interrupt handlers staged. Called by the poller.
    pub async fn flush_staged<W: Write>(
        &self,
        ctx: &TaskContext,
        serial: &SerialMux<W>,
        usb_present: bool,
    ) -> Result<(), Fatal> {
        let staged = self.take_staged();
        if staged.is_empty() || !usb_present {
            return Ok(());
        }
        serial.output(ctx, PortId::Usb, &staged).await
    }
}

impl Default for DebugOutput {
    fn default() -> Self {
        Self::new(false)
    }
}
