//! Audio capture newtypes.
//!
//! - `OversamplingFactor`: PDM bits per PCM sample, whole bytes only
//! - `PdmClockHz`: microphone bit clock, validated to the range MEMS mics accept

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

impl core::fmt::Display for OutOfRangeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} outside {}..={}", self.value, self.min, self.max)
    }
}

// ── OversamplingFactor ───────────────────────────────────────────────────────

/// Number of PDM bits accumulated into one PCM sample.
///
/// Restricted to multiples of 8 in `8..=256` so a sample never straddles a
/// byte boundary and the bit sum always fits a `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct OversamplingFactor(u16);

impl OversamplingFactor {
    /// Smallest supported factor.
    pub const MIN: u16 = 8;

    /// Largest supported factor.
    pub const MAX: u16 = 256;

    /// The factor the node ships with.
    pub const DEFAULT: Self = Self(64);

    /// Create an `OversamplingFactor`, rejecting values outside `8..=256` or
    /// not divisible by 8.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] for any unsupported factor.
    pub const fn try_new(bits: u16) -> Result<Self, OutOfRangeError> {
        if bits < Self::MIN || bits > Self::MAX || bits % 8 != 0 {
            Err(OutOfRangeError {
                value: bits as u32,
                min: Self::MIN as u32,
                max: Self::MAX as u32,
            })
        } else {
            Ok(Self(bits))
        }
    }

    /// Bits per PCM sample.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Bytes of PDM input per PCM sample.
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        (self.0 / 8) as usize
    }
}

impl Default for OversamplingFactor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ── PdmClockHz ───────────────────────────────────────────────────────────────

/// PDM bit clock in Hz.
///
/// Valid range: 400 kHz – 3.25 MHz, the envelope shared by common MEMS
/// microphones (low-power mode at the bottom, ultrasonic at the top).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PdmClockHz(u32);

impl PdmClockHz {
    /// Minimum supported bit clock.
    pub const MIN_HZ: u32 = 400_000;

    /// Maximum supported bit clock.
    pub const MAX_HZ: u32 = 3_250_000;

    /// 1.024 MHz: 16 kHz PCM at the default oversampling factor.
    pub const DEFAULT: Self = Self(1_024_000);

    /// Create a `PdmClockHz`, returning an error if out of range.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `hz` is outside `MIN_HZ..=MAX_HZ`.
    pub const fn new(hz: u32) -> Result<Self, OutOfRangeError> {
        if hz < Self::MIN_HZ || hz > Self::MAX_HZ {
            Err(OutOfRangeError {
                value: hz,
                min: Self::MIN_HZ,
                max: Self::MAX_HZ,
            })
        } else {
            Ok(Self(hz))
        }
    }

    /// Return the clock in Hz.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// PCM sample rate produced at the given oversampling factor.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: osf >= 8, never zero
    pub const fn pcm_rate_hz(self, osf: OversamplingFactor) -> u32 {
        self.0 / osf.0 as u32
    }
}
