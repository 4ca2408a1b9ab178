//! Hardware boot sequence for the sensor node.
//!
//! Initialization order:
//!   1. RCC: HSI16 into PLL for an 80 MHz system clock, LSE for the RTC
//!   2. IWDG armed (the option bytes freeze it in STOP2)
//!   3. SysTick at 1 kHz drives the bookkeeping time base
//!   4. Banner and build-config line on RTT
//!   5. Restart signal on the status LED
//!   6. Serial, request and audio tasks spawned; main enters the idle loop
//!
//! The clock arithmetic here is pure and host-tested; the embassy config
//! built from it is hardware only.

use platform::config::{boot_banner, BUILD_INFO, FIRMWARE_VERSION};

/// Ordered list of boot steps, for documentation and tests.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. RCC: HSI16 -> PLL (M=1, N=10, R=2) = 80 MHz SYSCLK, LSE on for the RTC",
    "2. IWDG: armed with an 8 s timeout, frozen in STOP2 by option byte",
    "3. SysTick: 1 kHz tick into the time base",
    "4. Banner: product, version, firmware::info build-config line",
    "5. LED: restart signal sweep",
    "6. Tasks: spawn serial, request, audio; main runs the idle loop",
];

/// HSI16 oscillator frequency.
pub const HSI16_HZ: u32 = 16_000_000;

/// PLL input divider (M).
pub const PLL_M: u32 = 1;
/// PLL multiplier (N).
pub const PLL_N: u32 = 10;
/// PLL system clock divider (R).
pub const PLL_R: u32 = 2;

/// Target system clock.
pub const SYSCLK_HZ: u32 = 80_000_000;

/// Highest VCO frequency the L4 PLL allows.
pub const PLL_VCO_MAX_HZ: u32 = 344_000_000;

/// SysTick rate feeding [`MonotonicClock::on_tick`](crate::time_base::MonotonicClock::on_tick).
pub const SYSTICK_HZ: u32 = 1_000;

/// Independent watchdog timeout.
pub const WATCHDOG_TIMEOUT_MS: u32 = 8_000;

/// PLL output for the given dividers, or `None` if a divider is zero or
/// the VCO leaves its range.
pub const fn pll_output_hz(input_hz: u32, m: u32, n: u32, r: u32) -> Option<u32> {
    let Some(vco_in) = input_hz.checked_div(m) else {
        return None;
    };
    let Some(vco) = vco_in.checked_mul(n) else {
        return None;
    };
    if vco > PLL_VCO_MAX_HZ {
        return None;
    }
    vco.checked_div(r)
}

/// SysTick reload value for `tick_hz` at `sysclk_hz`. SysTick's counter is
/// 24 bits wide.
pub const fn systick_reload(sysclk_hz: u32, tick_hz: u32) -> Option<u32> {
    let Some(cycles) = sysclk_hz.checked_div(tick_hz) else {
        return None;
    };
    if cycles > 0x0100_0000 {
        return None;
    }
    cycles.checked_sub(1)
}

/// Lines printed at boot: banner with version, then the build-config
/// string host tooling scans for.
pub fn banner_lines() -> [&'static str; 3] {
    [boot_banner(), FIRMWARE_VERSION, BUILD_INFO]
}

/// Build the `embassy_stm32::Config` for the node.
///
/// HSI16 / M(1) x N(10) = 160 MHz VCO, / R(2) = 80 MHz SYSCLK. LSE feeds
/// the RTC so the wakeup timer and [`RtcClock`](platform::RtcClock) keep
/// running through STOP2.
#[cfg(feature = "hardware")]
pub fn build_embassy_config() -> embassy_stm32::Config {
    use embassy_stm32::rcc::*;

    let mut config = embassy_stm32::Config::default();
    config.rcc.hsi = true;
    config.rcc.pll = Some(Pll {
        source: PllSource::HSI,
        prediv: PllPreDiv::DIV1,
        mul: PllMul::MUL10,
        divp: None,
        divq: None,
        divr: Some(PllRDiv::DIV2),
    });
    config.rcc.sys = Sysclk::PLL1_R;
    config.rcc.ls = LsConfig::default_lse();
    config
}

#[cfg(feature = "hardware")]
pub mod hardware {
    //! Register writes that only make sense on the target.

    use super::{systick_reload, SYSCLK_HZ, SYSTICK_HZ};

    /// Start SysTick at [`SYSTICK_HZ`] with its interrupt enabled.
    ///
    /// The embassy time driver runs on a general-purpose timer, so SysTick
    /// is free for the time base.
    pub fn start_systick(mut syst: cortex_m::peripheral::SYST) {
        use cortex_m::peripheral::syst::SystClkSource;

        let reload = systick_reload(SYSCLK_HZ, SYSTICK_HZ).unwrap_or(0x00FF_FFFF);
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(reload);
        syst.clear_current();
        syst.enable_interrupt();
        syst.enable_counter();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_pll_reaches_80mhz() {
        assert_eq!(pll_output_hz(HSI16_HZ, PLL_M, PLL_N, PLL_R), Some(SYSCLK_HZ));
    }

    #[test]
    fn test_boot_pll_rejects_bad_dividers() {
        assert_eq!(pll_output_hz(HSI16_HZ, 0, PLL_N, PLL_R), None);
        assert_eq!(pll_output_hz(HSI16_HZ, PLL_M, PLL_N, 0), None);
        // 16 MHz x 40 = 640 MHz VCO is out of range
        assert_eq!(pll_output_hz(HSI16_HZ, 1, 40, 2), None);
    }

    #[test]
    fn test_boot_systick_reload() {
        assert_eq!(systick_reload(SYSCLK_HZ, SYSTICK_HZ), Some(79_999));
        assert_eq!(systick_reload(SYSCLK_HZ, 0), None);
        assert_eq!(systick_reload(SYSCLK_HZ, 1), None);
    }

    #[test]
    fn test_boot_sequence_order_is_documented() {
        let steps = BOOT_SEQUENCE_STEPS;
        let pos = |needle: &str| {
            steps
                .iter()
                .position(|s| s.contains(needle))
                .expect("step required")
        };
        assert!(pos("RCC") < pos("SysTick"), "clock tree before the tick");
        assert!(pos("SysTick") < pos("Tasks"), "time base before any task");
        assert!(pos("Banner") < pos("Tasks"));
    }

    #[test]
    fn test_boot_banner_carries_build_info() {
        let lines = banner_lines();
        assert!(lines[2].starts_with("firmware::info:{"));
        assert_eq!(lines[1], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_boot_watchdog_outlasts_power_recheck() {
        assert!(WATCHDOG_TIMEOUT_MS > crate::runtime::POWER_RECHECK_MS * 2);
    }
}
