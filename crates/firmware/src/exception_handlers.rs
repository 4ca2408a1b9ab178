//! Cortex-M exception handlers.
//!
//! - **SysTick**: advances the millisecond time base. Suspended around
//!   STOP2 by the sleep manager.
//! - **HardFault**: logs the stacked frame address over RTT and resets.
//!   A node in the field is better off restarting than halting.
//!
//! # Hardware-only handlers
//!
//! The `#[cortex_m_rt::exception]` attribute requires ARM target intrinsics
//! and is therefore gated behind `#[cfg(feature = "hardware")]`.

#![allow(clippy::doc_markdown)]

/// SysTick: one tick into the time base.
#[cfg(feature = "hardware")]
#[cortex_m_rt::exception]
fn SysTick() {
    crate::tasks::CLOCK.on_tick();
}

/// HardFault: log and reset.
///
/// # Safety
///
/// This function must never return; returning from a HardFault handler is
/// undefined behavior on Cortex-M.
#[cfg(feature = "hardware")]
#[cortex_m_rt::exception]
#[allow(unsafe_code)]
unsafe fn HardFault(ef: &cortex_m_rt::ExceptionFrame) -> ! {
    defmt::error!(
        "HardFault: frame at 0x{:08X}, pc 0x{:08X}",
        ef as *const _ as u32,
        ef.pc()
    );
    cortex_m::peripheral::SCB::sys_reset();
}
