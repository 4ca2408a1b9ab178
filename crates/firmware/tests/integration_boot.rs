//! Integration test: the host-visible half of the boot sequence.
//!
//! Tests that:
//!   1. Clock and watchdog constants agree with each other
//!   2. The LED restart signal ends lit and hands the pin back
//!   3. A freshly built runtime has the configured ports active
//!   4. Shared state fits the L433's SRAM with room for stacks
//!
//! Does NOT require physical hardware.
//!
//! Run with: cargo test -p firmware --test integration_boot

// Integration test file -- intentional test patterns permitted.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::assertions_on_constants,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
)]

use firmware::audio::PdmPool;
use firmware::board::StatusLed;
use firmware::boot::{
    self, banner_lines, pll_output_hz, systick_reload, HSI16_HZ, PLL_M, PLL_N, PLL_R, SYSCLK_HZ,
    SYSTICK_HZ, WATCHDOG_TIMEOUT_MS,
};
use firmware::runtime::POWER_RECHECK_MS;
use firmware::sync::{TaskId, TaskSet};
use firmware::{MonotonicClock, Runtime, NODE_CONFIG};
use platform::mocks::MockLed;
use platform::{PeripheralId, PortId, UsbPresence};

/// SRAM1 on the STM32L433CC.
const SRAM_BYTES: usize = 64 * 1024;

#[test]
fn clock_tree_and_tick_agree() {
    assert_eq!(pll_output_hz(HSI16_HZ, PLL_M, PLL_N, PLL_R), Some(SYSCLK_HZ));
    let reload = systick_reload(SYSCLK_HZ, SYSTICK_HZ).unwrap();
    assert_eq!((reload + 1) * SYSTICK_HZ, SYSCLK_HZ);
}

#[test]
fn watchdog_survives_the_longest_awake_wait() {
    assert!(WATCHDOG_TIMEOUT_MS > POWER_RECHECK_MS * 2);
    // The LED sweep runs before the idle loop starts petting.
    assert!(WATCHDOG_TIMEOUT_MS > 5_000);
}

#[test]
fn banner_leads_with_the_product_line() {
    let lines = banner_lines();
    assert!(!lines[0].is_empty());
    assert!(lines.iter().all(|l| !l.contains('\n')));
    assert!(boot::BOOT_SEQUENCE_STEPS[0].starts_with("1. RCC"));
    assert!(boot::BOOT_SEQUENCE_STEPS.last().unwrap().contains("idle loop"));
}

#[tokio::test]
async fn restart_signal_then_runtime_comes_up() {
    let mut led = StatusLed::new(MockLed::new());
    led.restart_signal().await;
    let pin = led.release();
    assert!(pin.is_lit());
    // 20 flashes plus the final on.
    assert_eq!(pin.levels().len(), 41);

    let clock = MonotonicClock::new();
    let tasks = TaskSet::new(&clock);
    let pool = PdmPool::new();
    let rt: Runtime<'_, ()> = Runtime::new(
        NODE_CONFIG,
        &clock,
        &tasks,
        &pool,
        [(); PortId::COUNT],
        UsbPresence::Absent,
    );
    tasks.register(TaskId::Main, false);

    for port in PortId::ALL {
        let Some(id) = port.peripheral() else { continue };
        assert_eq!(
            rt.peripherals.contains(id),
            NODE_CONFIG.port_enabled(port),
            "{}",
            port.name()
        );
    }
    assert!(!rt.peripherals.contains(PeripheralId::Sai1));
    assert_eq!(rt.supervisor.last_fatal(), None);
    assert_eq!(rt.spl.last(), None);
}

#[test]
fn shared_state_fits_in_sram() {
    let shared = core::mem::size_of::<PdmPool>()
        + core::mem::size_of::<Runtime<'static, ()>>()
        + core::mem::size_of::<TaskSet<'static>>()
        + core::mem::size_of::<MonotonicClock>();
    // Leave at least a quarter of SRAM1 for task futures and the stack.
    assert!(
        shared < SRAM_BYTES * 3 / 4,
        "shared state is {shared} bytes"
    );
}
