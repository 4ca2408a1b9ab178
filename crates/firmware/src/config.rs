//! Compile-time node configuration.
//!
//! One `const` [`NodeConfig`] describes which transports are enabled and
//! every timing constant the serial, audio, and power paths use. Hardware
//! and simulator builds share it; tests construct variants directly.

use platform::{OversamplingFactor, PdmClockHz, PortId, UartConfig};

/// Serial poll backoff timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Requeue delay while bytes are moving
    pub busy_ms: u32,
    /// Requeue delay after work stops, until `idle_after_ms` has passed
    pub idle_ms: u32,
    /// Inactivity after which the poller parks
    pub idle_after_ms: u32,
    /// Park duration; only a notification wakes the poller sooner
    pub park_ms: u32,
}

/// Chunked transmit timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitConfig {
    /// Largest single write, matching the USB full-speed bulk packet
    pub chunk_bytes: usize,
    /// Budget for one chunk to be accepted before the transmit is abandoned
    pub chunk_timeout_ms: u32,
    /// Pause between chunks
    pub pacing_ms: u32,
}

/// Audio capture parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioConfig {
    /// Whether the microphone path runs at all
    pub enabled: bool,
    /// Microphone bit clock
    pub pdm_clock: PdmClockHz,
    /// PDM bits accumulated per PCM sample
    pub oversampling: OversamplingFactor,
    /// RMS of a full-scale reference tone at the microphone's rated dBFS
    pub reference_rms: f32,
    /// dB added to the RMS ratio to land on SPL
    pub sensitivity_offset_db: f32,
}

/// Node-wide configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeConfig {
    /// LPUART1 framing, `None` when the port is not fitted
    pub lpuart1: Option<UartConfig>,
    /// USART1 framing
    pub usart1: Option<UartConfig>,
    /// USART2 framing
    pub usart2: Option<UartConfig>,
    /// Whether the USB-CDC port is served
    pub usb: bool,
    /// Whether the application permits STOP2 at all
    pub allow_stop2: bool,
    /// Poll loop backoff
    pub backoff: BackoffConfig,
    /// Transmit chunking
    pub transmit: TransmitConfig,
    /// Audio capture
    pub audio: AudioConfig,
    /// Button debounce
    pub debounce_ms: u32,
    /// Delay between flushing a reply and a restart or bootloader jump
    pub settle_ms: u32,
}

impl NodeConfig {
    /// Whether a port is served by this build.
    pub const fn port_enabled(&self, port: PortId) -> bool {
        match port {
            PortId::Usb => self.usb,
            PortId::Lpuart1 => self.lpuart1.is_some(),
            PortId::Usart1 => self.usart1.is_some(),
            PortId::Usart2 => self.usart2.is_some(),
        }
    }
}

/// Bytes in one PDM block handed to the DMA engine.
pub const PDM_BLOCK_BYTES: usize = 2048;

/// Number of PDM blocks in the capture pool.
pub const PDM_BUFFERS: usize = 4;

/// Capacity of a serial receive ring.
pub const RX_RING_BYTES: usize = 600;

/// Capacity of a line accumulator, including its NUL terminator.
pub const LINE_BYTES: usize = 512;

/// Capacity of the interrupt-context debug staging buffer.
pub const ISR_DEBUG_BYTES: usize = 120;

/// The configuration this firmware ships with.
pub const NODE_CONFIG: NodeConfig = NodeConfig {
    lpuart1: Some(UartConfig::new_8n1(9600)),
    usart1: Some(UartConfig::new_8n1(9600)),
    usart2: None,
    usb: true,
    allow_stop2: true,
    backoff: BackoffConfig {
        busy_ms: 1,
        idle_ms: 100,
        idle_after_ms: 3_000,
        park_ms: 3_600_000,
    },
    transmit: TransmitConfig {
        chunk_bytes: 64,
        chunk_timeout_ms: 100,
        pacing_ms: 10,
    },
    audio: AudioConfig {
        enabled: true,
        pdm_clock: PdmClockHz::DEFAULT,
        oversampling: OversamplingFactor::DEFAULT,
        reference_rms: 1032.0,
        sensitivity_offset_db: 26.0,
    },
    debounce_ms: 100,
    settle_ms: 1_500,
};
