//! Per-port descriptor: receive ring, line accumulator, transmitter.

use platform::PortId;

use super::RxChannel;
use crate::config::LINE_BYTES;
use crate::sync::{LockLevel, OrderedMutex, TaskId};

/// Carriage return.
pub const CR: u8 = b'\r';
/// Line feed.
pub const LF: u8 = b'\n';

/// Line accumulator.
///
/// The stored bytes always end in a NUL, so the text can be handed to
/// anything expecting a C string. The terminator itself is never stored.
#[derive(Debug)]
pub struct LineState {
    bytes: heapless::Vec<u8, LINE_BYTES>,
    terminated: bool,
    swallow_lf: bool,
    overflow: bool,
}

impl LineState {
    /// No line in progress.
    pub const fn new() -> Self {
        Self {
            bytes: heapless::Vec::new(),
            terminated: false,
            swallow_lf: false,
            overflow: false,
        }
    }

    /// Whether a line has been started since the last reset.
    pub fn started(&self) -> bool {
        !self.bytes.is_empty()
    }

    /// Whether the current line has seen its terminator.
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    /// Whether bytes were dropped because the line outgrew the buffer.
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// Line text without the NUL.
    pub fn text(&self) -> &[u8] {
        self.bytes
            .split_last()
            .map_or(&[][..], |(_nul, text)| text)
    }

    /// Line text including the trailing NUL.
    pub fn as_c_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn start(&mut self) {
        if self.bytes.is_empty() {
            // Capacity is at least 1.
            let _ = self.bytes.push(0);
        }
    }

    /// Feed one received byte. Returns `true` if it completed a line.
    ///
    /// CR, LF, and CR LF each end exactly one line: a LF directly after a
    /// CR is swallowed. Must not be called while the line is terminated.
    pub fn accept(&mut self, byte: u8) -> bool {
        self.start();
        if byte == LF && self.swallow_lf {
            self.swallow_lf = false;
            return false;
        }
        if byte == CR || byte == LF {
            self.swallow_lf = byte == CR;
            self.terminated = true;
            return true;
        }
        self.swallow_lf = false;
        if self.bytes.is_full() {
            self.overflow = true;
            return false;
        }
        if let Some(nul) = self.bytes.last_mut() {
            *nul = byte;
        }
        let _ = self.bytes.push(0);
        false
    }

    /// Forget the consumed line. CRLF folding state carries over so a LF
    /// that arrives after the reset is still swallowed.
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.terminated = false;
        self.overflow = false;
    }
}

impl Default for LineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the firmware keeps for one serial transport.
pub struct SerialPortDescriptor<W> {
    port: PortId,
    owner: TaskId,
    enabled: bool,
    pub(crate) channel: RxChannel,
    pub(crate) rx: OrderedMutex<LineState>,
    pub(crate) tx: OrderedMutex<W>,
}

impl<W> SerialPortDescriptor<W> {
    /// Descriptor for `port`, delivering lines to `owner` and writing
    /// through `writer`.
    pub const fn new(port: PortId, owner: TaskId, enabled: bool, writer: W) -> Self {
        Self {
            port,
            owner,
            enabled,
            channel: RxChannel::new(),
            rx: OrderedMutex::new(LockLevel::SerialRx, LineState::new()),
            tx: OrderedMutex::new(LockLevel::SerialTx, writer),
        }
    }

    /// Which transport this is.
    pub const fn port(&self) -> PortId {
        self.port
    }

    /// Task woken when a line completes.
    pub const fn owner(&self) -> TaskId {
        self.owner
    }

    /// Whether the port is served.
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// The receive ring.
    pub const fn channel(&self) -> &RxChannel {
        &self.channel
    }
}
