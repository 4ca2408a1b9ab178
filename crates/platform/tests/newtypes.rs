//! Type system enforcement tests for capture newtypes and peripheral sets.
//! These types keep decimation and power bookkeeping from drifting out of range.
#![allow(clippy::unwrap_used)]

// ── OversamplingFactor ───────────────────────────────────────────────────────

#[test]
fn oversampling_default_is_64() {
    use platform::audio_types::OversamplingFactor;
    assert_eq!(OversamplingFactor::default().get(), 64);
    assert_eq!(OversamplingFactor::DEFAULT.bytes_per_sample(), 8);
}

#[test]
fn oversampling_try_new_rejects_partial_bytes() {
    use platform::audio_types::OversamplingFactor;
    assert!(OversamplingFactor::try_new(12).is_err());
    assert!(OversamplingFactor::try_new(63).is_err());
}

#[test]
fn oversampling_try_new_rejects_out_of_range() {
    use platform::audio_types::OversamplingFactor;
    assert!(OversamplingFactor::try_new(0).is_err());
    assert!(OversamplingFactor::try_new(264).is_err());
}

#[test]
fn oversampling_try_new_accepts_valid_range() {
    use platform::audio_types::OversamplingFactor;
    assert!(OversamplingFactor::try_new(8).is_ok());
    assert!(OversamplingFactor::try_new(64).is_ok());
    assert!(OversamplingFactor::try_new(256).is_ok());
}

#[test]
fn oversampling_is_two_bytes() {
    use platform::audio_types::OversamplingFactor;
    assert_eq!(core::mem::size_of::<OversamplingFactor>(), 2);
}

// ── PdmClockHz ───────────────────────────────────────────────────────────────

#[test]
fn pdm_clock_pcm_rate_at_default_osf() {
    use platform::audio_types::{OversamplingFactor, PdmClockHz};
    let clk = PdmClockHz::new(1_024_000).unwrap();
    assert_eq!(clk.pcm_rate_hz(OversamplingFactor::DEFAULT), 16_000);
}

#[test]
fn pdm_clock_error_reports_bounds() {
    use platform::audio_types::PdmClockHz;
    let err = PdmClockHz::new(100).unwrap_err();
    assert_eq!(err.value, 100);
    assert_eq!(err.min, PdmClockHz::MIN_HZ);
    assert_eq!(err.max, PdmClockHz::MAX_HZ);
}

// ── PeripheralSet ────────────────────────────────────────────────────────────

#[test]
fn peripheral_set_is_two_bytes() {
    use platform::PeripheralSet;
    assert_eq!(core::mem::size_of::<PeripheralSet>(), 2);
}

#[test]
fn peripheral_set_collects_from_iterator() {
    use platform::{PeripheralId, PeripheralSet};
    let set: PeripheralSet = [PeripheralId::Spi2, PeripheralId::Rng].into_iter().collect();
    assert_eq!(set.to_string(), "RNG SPI2 ");
}

#[test]
fn empty_peripheral_set_prints_nothing() {
    use platform::PeripheralSet;
    assert_eq!(PeripheralSet::EMPTY.to_string(), "");
    assert!(PeripheralSet::EMPTY.is_empty());
}

// ── UartConfig ───────────────────────────────────────────────────────────────

#[test]
fn uart_config_8n1_defaults() {
    use platform::{DataBits, Parity, StopBits, UartConfig};
    let cfg = UartConfig::new_8n1(9600);
    assert_eq!(cfg.baud_rate, 9600);
    assert_eq!(cfg.data_bits, DataBits::Eight);
    assert_eq!(cfg.parity, Parity::None);
    assert_eq!(cfg.stop_bits, StopBits::One);
    assert!(!cfg.rs485);
    assert!(cfg.with_rs485().rs485);
}
