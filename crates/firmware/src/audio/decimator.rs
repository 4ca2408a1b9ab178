//! PDM → PCM decimation and loudness.
//!
//! # Pipeline
//!
//! ```text
//! PDM block (1 bit/sample, MSB first)
//!   -> boxcar: count set bits per OSF bits, scale to 0..=32767
//!   -> 32-tap low-pass FIR, edges truncated
//!   -> RMS -> dB SPL relative to the microphone's reference RMS
//! ```
//!
//! The boxcar is an accumulate-and-dump decimator. It trades stop-band
//! rejection for almost no CPU. The kernel is applied per block with no
//! history from the previous block, so the first 31 samples of each block
//! see a shortened kernel.
//!
//! At OSF 64 a 2048-byte block gives 256 samples.

use platform::OversamplingFactor;

use crate::config::{AudioConfig, PDM_BLOCK_BYTES};

/// Largest PCM output for one block (at the smallest oversampling factor).
#[allow(clippy::cast_possible_truncation)] // Safety: MIN is 8
pub const PCM_SAMPLES_MAX: usize = PDM_BLOCK_BYTES * 8 / OversamplingFactor::MIN as usize;

/// PCM full scale.
const FULL_SCALE: u32 = 32_767;

/// Low-pass kernel. Tap `j` weights the sample `j` positions back.
pub const FIR_TAPS: [f32; 32] = [
    0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.250, //
    0.250, 0.200, 0.150, 0.100, 0.050, 0.025, 0.010, 0.005, //
    0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.250, //
    0.250, 0.200, 0.150, 0.100, 0.050, 0.025, 0.010, 0.005,
];

/// Accumulate-and-dump `pdm` into `pcm`.
///
/// Each group of `osf` bits becomes `(ones * 32767) / osf`. A trailing
/// partial group is dropped. Returns the number of samples written, which
/// is also capped by `pcm.len()`.
pub fn decimate(pdm: &[u8], osf: OversamplingFactor, pcm: &mut [i16]) -> usize {
    let per_sample = osf.bytes_per_sample();
    let bits = u32::from(osf.get());
    let mut written = 0usize;
    for (group, out) in pdm.chunks_exact(per_sample).zip(pcm.iter_mut()) {
        let ones: u32 = group.iter().map(|b| b.count_ones()).sum();
        let scaled = ones.saturating_mul(FULL_SCALE).checked_div(bits).unwrap_or(0);
        *out = i16::try_from(scaled).unwrap_or(i16::MAX);
        written = written.saturating_add(1);
    }
    written
}

/// Apply [`FIR_TAPS`] to `pcm` in place.
///
/// Runs from the last sample backwards so every output only reads inputs
/// that have not been overwritten yet. Results saturate to `i16`.
#[allow(clippy::cast_possible_truncation)] // Safety: `as` from f32 saturates
pub fn fir_in_place(pcm: &mut [i16]) {
    for i in (0..pcm.len()).rev() {
        let history = pcm.get(..=i).unwrap_or_default();
        let sum: f32 = history
            .iter()
            .rev()
            .zip(FIR_TAPS.iter())
            .map(|(&x, &c)| f32::from(x) * c)
            .sum();
        if let Some(out) = pcm.get_mut(i) {
            *out = sum as i16;
        }
    }
}

/// Root-mean-square of `pcm`. Zero for an empty slice.
#[allow(clippy::cast_precision_loss)] // Safety: energy and count only need f32 precision
pub fn rms(pcm: &[i16]) -> f32 {
    if pcm.is_empty() {
        return 0.0;
    }
    let energy: i64 = pcm
        .iter()
        .map(|&x| i64::from(x).saturating_mul(i64::from(x)))
        .fold(0i64, i64::saturating_add);
    libm::sqrtf(energy as f32 / pcm.len() as f32)
}

/// Sound pressure level in dB for a PCM block.
///
/// `None` for silence, where the logarithm is undefined.
pub fn spl_db(pcm: &[i16], audio: &AudioConfig) -> Option<f32> {
    let rms = rms(pcm);
    if rms <= 0.0 {
        return None;
    }
    Some(20.0 * libm::log10f(rms / audio.reference_rms) + audio.sensitivity_offset_db)
}

/// Decimation with its own output buffer.
pub struct Decimator {
    osf: OversamplingFactor,
    pcm: [i16; PCM_SAMPLES_MAX],
    len: usize,
}

impl Decimator {
    /// Decimator for `osf`.
    pub const fn new(osf: OversamplingFactor) -> Self {
        Self {
            osf,
            pcm: [0; PCM_SAMPLES_MAX],
            len: 0,
        }
    }

    /// Decimate and filter one PDM block. Returns the PCM samples.
    pub fn process(&mut self, pdm: &[u8]) -> &[i16] {
        self.len = decimate(pdm, self.osf, &mut self.pcm);
        let out = self.pcm.get_mut(..self.len).unwrap_or_default();
        fir_in_place(out);
        out
    }

    /// Samples from the last [`process`][Self::process].
    pub fn pcm(&self) -> &[i16] {
        self.pcm.get(..self.len).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::NODE_CONFIG;

    const OSF: OversamplingFactor = OversamplingFactor::DEFAULT;

    #[test]
    fn all_zero_decimates_to_zero() {
        let pdm = [0u8; 64];
        let mut pcm = [1i16; 8];
        assert_eq!(decimate(&pdm, OSF, &mut pcm), 8);
        assert_eq!(pcm, [0; 8]);
    }

    #[test]
    fn all_ones_decimates_to_full_scale() {
        let pdm = [0xFFu8; 64];
        let mut pcm = [0i16; 8];
        decimate(&pdm, OSF, &mut pcm);
        assert_eq!(pcm, [i16::MAX; 8]);
    }

    #[test]
    fn half_density_is_half_scale() {
        let pdm = [0b1010_1010u8; 8];
        let mut pcm = [0i16; 1];
        decimate(&pdm, OSF, &mut pcm);
        assert_eq!(pcm[0], 16_383);
    }

    #[test]
    fn partial_group_is_dropped_and_output_is_capped() {
        let mut pcm = [0i16; 4];
        assert_eq!(decimate(&[0xFF; 12], OSF, &mut pcm), 1);
        assert_eq!(decimate(&[0xFF; 64], OSF, &mut pcm), 4);
    }

    #[test]
    fn fir_edge_sees_shortened_kernel() {
        let mut pcm = [1000i16; 40];
        fir_in_place(&mut pcm);
        // First sample: only tap 0 applies.
        assert_eq!(pcm[0], 5);
        // Second: taps 0 and 1.
        assert_eq!(pcm[1], 15);
        // Past the kernel length every tap applies: 1000 * 3.16.
        assert_eq!(pcm[35], 3160);
    }

    #[test]
    fn fir_reads_unfiltered_history() {
        // An impulse must reproduce the kernel exactly, not a feedback tail.
        let mut pcm = [0i16; 32];
        pcm[0] = 10_000;
        fir_in_place(&mut pcm);
        for (j, c) in FIR_TAPS.iter().enumerate() {
            let expected = (10_000.0 * c) as i16;
            assert_eq!(pcm[j], expected, "tap {j}");
        }
    }

    #[test]
    fn fir_saturates() {
        let mut pcm = [i16::MAX; 40];
        fir_in_place(&mut pcm);
        assert_eq!(pcm[39], i16::MAX);
    }

    #[test]
    fn spl_of_reference_rms_is_the_sensitivity_offset() {
        let pcm = [1032i16; 16];
        let spl = spl_db(&pcm, &NODE_CONFIG.audio).unwrap();
        assert!((spl - 26.0).abs() < 0.01);
        let louder = [10_320i16; 16];
        let spl = spl_db(&louder, &NODE_CONFIG.audio).unwrap();
        assert!((spl - 46.0).abs() < 0.01);
    }

    #[test]
    fn silence_has_no_spl() {
        assert_eq!(spl_db(&[0; 16], &NODE_CONFIG.audio), None);
        assert_eq!(spl_db(&[], &NODE_CONFIG.audio), None);
    }

    #[test]
    fn decimator_block_at_default_osf() {
        let mut d = Decimator::new(OSF);
        let pdm = [0u8; PDM_BLOCK_BYTES];
        assert_eq!(d.process(&pdm).len(), 256);
        assert!(d.pcm().iter().all(|&s| s == 0));
    }
}
