//! PDM microphone capture
//!
//! The microphone streams a one-bit PDM signal that the hardware clocks into
//! memory with DMA. Each call fills one block; the firmware's buffer pool
//! decides which memory the next block lands in.

use core::fmt;

/// Capture failures reported by the PDM front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureError {
    /// The DMA engine could not keep up with the bit clock
    Overrun,
    /// Bus or transfer error
    Transfer,
}

impl CaptureError {
    /// Short lowercase name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Overrun => "overrun",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overrun => f.write_str("pdm overrun"),
            Self::Transfer => f.write_str("pdm transfer error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CaptureError {}

/// Source of raw PDM blocks.
pub trait PdmSource {
    /// Fill `block` completely with PDM bits, MSB first within each byte.
    ///
    /// After an error the source must be re-armed by calling `read_block`
    /// again; implementations restart the transfer on the next call.
    async fn read_block(&mut self, block: &mut [u8]) -> Result<(), CaptureError>;
}

/// DMA/CPU cache coherency note for the capture buffers.
///
/// The Cortex-M4 on the L433 has no data cache, so buffers handed to the DMA
/// engine need no cleaning or invalidation. They must still be `'static`
/// because the transfer outlives the borrow of a single await point.
pub const CAPTURE_BUFFERS_MUST_BE_STATIC: bool = true;
