//! Low-power sensor node firmware
//!
//! Serial request handling, PDM microphone capture with an SPL estimate, and
//! STOP2 sleep management for an STM32L433 node.
//!
//! # Architecture
//!
//! ```text
//! Tasks (tasks.rs / bin/node_sim.rs)
//!         ↓
//! Runtime: serial mux, dispatch, audio pipeline, sleep manager
//!         ↓
//! Sync primitives and time base (ordered locks, task notifications)
//!         ↓
//! Platform HAL traits (crates/platform)
//! ```
//!
//! Everything above the HAL traits is host-testable; only `boot::hardware`,
//! `board::stm32`, `tasks` and `exception_handlers` touch the chip.
//!
//! # Features
//!
//! - `hardware` - Build for the STM32L433 target (embassy, defmt)
//! - `emulator` - Build the desktop simulator (tokio, tracing)
//! - `std` - Enable standard library (for emulator and testing)
//!
//! # Examples
//!
//! ## Hardware Target
//!
//! ```bash
//! cargo build --release --target thumbv7em-none-eabihf --features hardware
//! ```
//!
//! ## Simulator
//!
//! ```bash
//! cargo run --bin node_sim --features emulator
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Critical correctness: deny these
#![deny(clippy::await_holding_lock)] // holding a blocking Mutex across .await is a bug
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
// Logging discipline (allow println in tests via clippy.toml)
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)] // common in Rust crates; not a real issue
#![allow(clippy::missing_errors_doc)] // most errors are self-explanatory
// Pedantic lints too noisy for firmware application code:
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]
#![allow(clippy::unused_self)]
#![allow(clippy::unused_async)]
#![allow(async_fn_in_trait)]

// Must come first: the logging macros are textually scoped.
#[macro_use]
mod fmt;

pub mod audio;
pub mod board;
pub mod boot;
pub mod config;
pub mod debug;
pub mod dispatch;
pub mod error;
pub mod power;
pub mod runtime;
pub mod serial;
pub mod supervisor;
pub mod sync;
pub mod time_base;

#[cfg(feature = "hardware")]
pub mod exception_handlers;
#[cfg(feature = "hardware")]
pub mod tasks;

// Re-export key types
pub use config::{NodeConfig, NODE_CONFIG};
pub use error::{Error, Fatal};
pub use runtime::Runtime;
pub use supervisor::{DeferredWork, Supervisor};
pub use time_base::MonotonicClock;
