//! UART receive ring.
//!
//! The receive interrupt (or the DMA idle-line callback) copies bytes in;
//! the serial poller drains them one at a time. `fill` is never advanced
//! onto `drain`: when the ring is full the newest byte is written into the
//! lookahead slot but not admitted, so the next byte overwrites it, and the
//! rest of that batch is dropped and reported as an overrun.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use platform::{IsrNotify, IsrSafe};

use crate::config::RX_RING_BYTES;

struct RxRing {
    buf: [u8; RX_RING_BYTES],
    fill: usize,
    drain: usize,
}

impl RxRing {
    const fn new() -> Self {
        Self {
            buf: [0; RX_RING_BYTES],
            fill: 0,
            drain: 0,
        }
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: i < RX_RING_BYTES - 1 in the else arm
    const fn next(i: usize) -> usize {
        if i >= RX_RING_BYTES - 1 {
            0
        } else {
            i + 1
        }
    }

    fn push(&mut self, byte: u8) -> bool {
        if let Some(slot) = self.buf.get_mut(self.fill) {
            *slot = byte;
        }
        let next = Self::next(self.fill);
        if next == self.drain {
            return false;
        }
        self.fill = next;
        true
    }

    fn pop(&mut self) -> Option<u8> {
        if self.fill == self.drain {
            return None;
        }
        let byte = self.buf.get(self.drain).copied();
        self.drain = Self::next(self.drain);
        byte
    }

    fn len(&self) -> usize {
        if self.fill >= self.drain {
            self.fill.saturating_sub(self.drain)
        } else {
            RX_RING_BYTES
                .saturating_sub(self.drain)
                .saturating_add(self.fill)
        }
    }
}

/// Receive ring for one port, plus its fault counters.
pub struct RxChannel {
    ring: Mutex<CriticalSectionRawMutex, RefCell<RxRing>>,
    errors: AtomicU32,
    overruns: AtomicU32,
}

impl RxChannel {
    /// Empty ring.
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(RxRing::new())),
            errors: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
        }
    }

    /// Copy a received batch in. Returns `false` if it overran the ring.
    pub fn push(&self, bytes: &[u8]) -> bool {
        let admitted = self.ring.lock(|r| {
            let mut r = r.borrow_mut();
            bytes.iter().all(|&b| r.push(b))
        });
        if !admitted {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        admitted
    }

    /// Discard everything after a line or DMA error.
    pub fn reset(&self) {
        self.ring.lock(|r| {
            let mut r = r.borrow_mut();
            r.fill = 0;
            r.drain = 0;
        });
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether a byte is waiting.
    pub fn available(&self) -> bool {
        self.ring.lock(|r| {
            let r = r.borrow();
            r.fill != r.drain
        })
    }

    /// Bytes waiting.
    pub fn len(&self) -> usize {
        self.ring.lock(|r| r.borrow().len())
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        !self.available()
    }

    /// Oldest waiting byte.
    pub fn pop(&self) -> Option<u8> {
        self.ring.lock(|r| r.borrow_mut().pop())
    }

    /// Receive errors since boot.
    pub fn errors(&self) -> u32 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Overrun batches since boot.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Interrupt-side handle that feeds this ring and notifies `notify`.
    pub const fn feed<'a, N: IsrNotify>(&'a self, notify: &'a N) -> RxFeed<'a, N> {
        RxFeed {
            channel: self,
            notify,
        }
    }
}

impl Default for RxChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// What a receive interrupt is allowed to do with a port.
pub struct RxFeed<'a, N> {
    channel: &'a RxChannel,
    notify: &'a N,
}

impl<N: IsrNotify> RxFeed<'_, N> {
    /// Bytes arrived. Returns `false` if the batch overran the ring.
    pub fn received(&self, bytes: &[u8]) -> bool {
        let ok = self.channel.push(bytes);
        self.notify.notify_from_isr(!ok);
        ok
    }

    /// The peripheral reported a framing, noise, or DMA error. The ring is
    /// reset; the caller re-arms reception.
    pub fn receive_error(&self) {
        self.channel.reset();
        self.notify.notify_from_isr(true);
    }
}

impl<N: IsrNotify> IsrSafe for RxFeed<'_, N> {}
