//! Serial request transport.
//!
//! ```text
//! UART ISR / DMA ──► RxChannel (ring) ──poll──► LineState ──lock──► request task
//!                                                                      │
//!            port writer ◄── transmit (64-byte paced chunks) ◄── output_ln
//! ```

pub mod backoff;
pub mod mux;
pub mod port;
pub mod rx;
pub mod transmit;

pub use backoff::PollBackoff;
pub use mux::{LineGuard, SerialMux, SerialWake, CRLF};
pub use port::{LineState, SerialPortDescriptor};
pub use rx::{RxChannel, RxFeed};
