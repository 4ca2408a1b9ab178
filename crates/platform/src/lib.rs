//! Hardware Abstraction Layer (HAL) for the low-power sensor node
//!
//! This crate provides trait-based abstractions for every piece of hardware
//! the node firmware touches, so the serial, audio, and power cores can be
//! developed and tested without a board attached.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (firmware crate: tasks, dispatcher)
//!         ↓
//! Core Layers (serial mux, audio pipeline, sleep manager, time base)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (Embassy HAL + PAC)
//! ```
//!
//! # Abstraction Levels
//!
//! ## Power
//! - [`LowPowerHal`] - STOP2 entry/exit primitives and peripheral teardown
//! - [`RtcClock`] - millisecond clock that keeps counting through STOP2
//!
//! ## Transports and capture
//! - [`serial`] - port identities and UART line configuration
//! - [`dma`] - PDM microphone block capture
//! - [`isr`] - the narrow API allowed from interrupt context
//!
//! ## System
//! - [`SystemControl`] - reset, bootloader jump, power-on self test
//! - [`peripheral`] - the active-peripheral bitmask
//!
//! # Features
//!
//! - `std`: Enable standard library support (mocks for host tests)
//! - `hardware`: Physical hardware implementations
//! - `defmt`: Enable defmt logging derives

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // register and peripheral names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors - callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod audio_types;
pub mod config;
pub mod dma;
pub mod isr;
pub mod peripheral;
pub mod power;
pub mod serial;
pub mod system;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

// Re-export main high-level traits
pub use dma::{CaptureError, PdmSource};
pub use isr::{IsrNotify, IsrSafe};
pub use power::{LowPowerHal, PowerError, RtcClock, UsbPresence};
pub use system::{SelfTestReport, SystemControl};

// Re-export peripheral types
pub use peripheral::{PeripheralId, PeripheralSet};

// Re-export serial types
pub use serial::{DataBits, Parity, PortId, StopBits, UartConfig};

// Audio newtypes
pub use audio_types::{OutOfRangeError, OversamplingFactor, PdmClockHz};
