//! Microphone capture and loudness.
//!
//! # Structure
//!
//! - `pool` - lock-free block pool shared by the capture and processing sides
//! - `decimator` - PDM → PCM, FIR, and SPL
//! - `capture` - the two loops of the audio task and [`SplMeter`]
//!
//! # Dependency Injection
//!
//! The task targets the [`platform::PdmSource`] trait:
//!
//! ```rust,ignore
//! // Hardware:
//! audio::run(rt, &ctx, SaiPdm::new(sai)).await;
//! // Tests:
//! audio::run(rt, &ctx, MockPdm::new(0xAA)).await;
//! ```

pub mod capture;
pub mod decimator;
pub mod pool;

use crate::config::{PDM_BLOCK_BYTES, PDM_BUFFERS};

pub use capture::{run, Capture, Processor, SplMeter};
pub use decimator::Decimator;
pub use pool::{AudioConsumer, AudioProducer, BufferPool, CompletedBlock, PoolStats};

/// The node's capture pool.
pub type PdmPool = BufferPool<PDM_BUFFERS, PDM_BLOCK_BYTES>;
