//! STM32L433 implementations of the platform traits.
//!
//! Register-level where embassy-stm32 0.1.0 has no API: STOP2 entry, the
//! RTC wakeup timer, LPUART wake-from-STOP, and RCC clock gating around
//! sleep. Everything else goes through the HAL drivers.
//!
//! # Pins
//!
//! | Pin  | Function                 |
//! |------|--------------------------|
//! | PA2  | LPUART1_TX               |
//! | PA3  | LPUART1_RX (STOP2 wake)  |
//! | PB6  | USART1_TX (service port) |
//! | PB7  | USART1_RX                |
//! | PA9  | VBUS sense               |
//! | PC13 | Button, active low       |
//! | PB3  | Status LED               |
//! | PA8  | SAI1_SCK_A (PDM clock)   |
//! | PA10 | SAI1_SD_A (PDM data)     |
//! | PB9  | SAI1_FS_A (unused by PDM)|

#![allow(unsafe_code)]

use embassy_stm32::pac;
use embassy_stm32::peripherals::{DMA1_CH4, DMA2_CH1, DMA2_CH6, LPUART1, SAI1, USART1};
use embassy_stm32::sai::Sai;
use embassy_stm32::usart::UartTx;
use embedded_io_async::{ErrorType, Write};
use platform::{
    CaptureError, LowPowerHal, PdmSource, PeripheralId, PowerError, RtcClock, SelfTestReport,
    SystemControl, UsbPresence,
};

/// RTC wakeup clock: RTCCLK (32.768 kHz LSE) / 16.
const WAKEUP_TIMER_HZ: u64 = 2_048;

/// Longest sleep the 16-bit wakeup counter can express at [`WAKEUP_TIMER_HZ`].
pub const WAKEUP_MAX_MS: u32 = 31_999;

/// Synchronous RTC prescaler (PREDIV_S) for 1 Hz from the LSE.
const RTC_PREDIV_S: u64 = 255;

/// Spins allowed for a ready flag (PLL lock, RTC write access).
const READY_SPINS: u32 = 100_000;

/// ROM bootloader base on the L4.
const SYSTEM_MEMORY: u32 = 0x1FFF_0000;

/// RTC unlock key sequence.
const RTC_KEY_1: u8 = 0xCA;
const RTC_KEY_2: u8 = 0x53;

fn rtc_unlocked(f: impl FnOnce()) {
    pac::RTC.wpr().write(|w| w.set_key(RTC_KEY_1));
    pac::RTC.wpr().write(|w| w.set_key(RTC_KEY_2));
    f();
    pac::RTC.wpr().write(|w| w.set_key(0xFF));
}

/// Wakeup counter value for `ms`, capped at the 16-bit range.
pub fn wakeup_ticks(ms: u32) -> u16 {
    let ticks = u64::from(ms.min(WAKEUP_MAX_MS))
        .saturating_mul(WAKEUP_TIMER_HZ)
        .checked_div(1_000)
        .unwrap_or(0);
    u16::try_from(ticks).unwrap_or(u16::MAX)
}

/// VBUS sense input, PA9. The pin itself belongs to the VBUS edge task.
const VBUS_PIN: usize = 9;

/// STOP2 primitives for the L433.
pub struct Stm32Power;

impl Stm32Power {

    fn clock_gate(id: PeripheralId, on: bool) {
        match id {
            PeripheralId::Rng => pac::RCC.ahb2enr().modify(|w| w.set_rngen(on)),
            PeripheralId::Adc1 => pac::RCC.ahb2enr().modify(|w| w.set_adcen(on)),
            PeripheralId::Usb => pac::RCC.apb1enr1().modify(|w| w.set_usbfsen(on)),
            PeripheralId::Can1 => pac::RCC.apb1enr1().modify(|w| w.set_can1en(on)),
            PeripheralId::Usart2 => pac::RCC.apb1enr1().modify(|w| w.set_usart2en(on)),
            PeripheralId::I2c1 => pac::RCC.apb1enr1().modify(|w| w.set_i2c1en(on)),
            PeripheralId::I2c3 => pac::RCC.apb1enr1().modify(|w| w.set_i2c3en(on)),
            PeripheralId::Spi2 => pac::RCC.apb1enr1().modify(|w| w.set_spi2en(on)),
            PeripheralId::Lpuart1 => pac::RCC.apb1enr2().modify(|w| w.set_lpuart1en(on)),
            PeripheralId::Usart1 => pac::RCC.apb2enr().modify(|w| w.set_usart1en(on)),
            PeripheralId::Spi1 => pac::RCC.apb2enr().modify(|w| w.set_spi1en(on)),
            PeripheralId::Sai1 => pac::RCC.apb2enr().modify(|w| w.set_sai1en(on)),
        }
    }

    fn arm_wakeup_timer(max_ms: u32) {
        rtc_unlocked(|| {
            pac::RTC.cr().modify(|w| w.set_wute(false));
            let mut spins = 0u32;
            while !pac::RTC.isr().read().wutwf() && spins < READY_SPINS {
                spins = spins.saturating_add(1);
            }
            pac::RTC.wutr().write(|w| w.set_wut(wakeup_ticks(max_ms)));
            pac::RTC.cr().modify(|w| {
                w.set_wucksel(pac::rtc::vals::Wucksel::DIV16);
                w.set_wutie(true);
                w.set_wute(true);
            });
        });
        // EXTI line 20 carries the RTC wakeup event.
        pac::EXTI.rtsr(0).modify(|w| w.set_line(20, true));
        pac::EXTI.imr(0).modify(|w| w.set_line(20, true));
    }

    fn disarm_wakeup_timer() {
        rtc_unlocked(|| {
            pac::RTC.cr().modify(|w| {
                w.set_wute(false);
                w.set_wutie(false);
            });
        });
        pac::RTC.isr().modify(|w| w.set_wutf(false));
        pac::EXTI.pr(0).write(|w| w.set_line(20, true));
    }
}

impl LowPowerHal for Stm32Power {
    fn debugger_attached(&self) -> bool {
        cortex_m::peripheral::DCB::is_debugger_attached()
    }

    fn usb_presence(&self) -> UsbPresence {
        if pac::GPIOA.idr().read().idr(VBUS_PIN) == pac::gpio::vals::Idr::HIGH {
            UsbPresence::Present
        } else {
            UsbPresence::Absent
        }
    }

    fn deinit_peripheral(&mut self, id: PeripheralId) {
        Self::clock_gate(id, false);
    }

    fn reinit_peripheral(&mut self, id: PeripheralId) -> Result<(), PowerError> {
        Self::clock_gate(id, true);
        Ok(())
    }

    fn disable_dma(&mut self) {
        pac::RCC.ahb1enr().modify(|w| {
            w.set_dma1en(false);
            w.set_dma2en(false);
        });
    }

    fn enable_dma(&mut self) -> Result<(), PowerError> {
        pac::RCC.ahb1enr().modify(|w| {
            w.set_dma1en(true);
            w.set_dma2en(true);
        });
        if pac::RCC.ahb1enr().read().dma1en() {
            Ok(())
        } else {
            Err(PowerError::DmaInit)
        }
    }

    fn suspend_tick(&mut self) {
        // SAFETY: single read-modify-write of SYST_CSR from task context;
        // the SysTick handler never touches CSR.
        unsafe {
            let syst = &*cortex_m::peripheral::SYST::PTR;
            syst.csr.modify(|v| v & !0b10);
        }
        cortex_m::peripheral::SCB::clear_pendst();
    }

    fn resume_tick(&mut self) {
        // SAFETY: as in `suspend_tick`.
        unsafe {
            let syst = &*cortex_m::peripheral::SYST::PTR;
            syst.csr.modify(|v| v | 0b10);
        }
    }

    fn arm_wake_uart(&mut self) {
        pac::LPUART1.cr3().modify(|w| {
            w.set_wus(pac::usart::vals::Wus::STARTBIT);
            w.set_wufie(true);
        });
        pac::LPUART1.cr1().modify(|w| w.set_uesm(true));
    }

    fn resume_wake_uart(&mut self) {
        pac::LPUART1.cr1().modify(|w| w.set_uesm(false));
        pac::LPUART1.cr3().modify(|w| w.set_wufie(false));
        pac::LPUART1.icr().write(|w| w.set_wucf(true));
    }

    fn gpio_low_power(&mut self) {
        // Pulls from PWR_PUCRx/PDCRx hold the button and VBUS lines.
        pac::PWR.cr3().modify(|w| w.set_apc(true));
    }

    fn enter_stop2(&mut self, max_ms: u32) -> bool {
        if max_ms > 0 {
            Self::arm_wakeup_timer(max_ms);
        }
        pac::PWR.cr1().modify(|w| w.set_lpms(pac::pwr::vals::Lpms::STOP2));
        // SAFETY: stealing the core peripherals only to flip SLEEPDEEP in
        // SCB_SCR; nothing else holds the SCB at this point.
        let mut core = unsafe { cortex_m::Peripherals::steal() };
        core.SCB.set_sleepdeep();
        cortex_m::asm::dsb();
        cortex_m::asm::wfi();
        core.SCB.clear_sleepdeep();
        if max_ms > 0 {
            Self::disarm_wakeup_timer();
        }
        // Leaving STOP2 hands SYSCLK back to HSI16.
        pac::RCC.cfgr().read().sws() != pac::rcc::vals::Sw::PLL1_R
    }

    fn restore_clocks(&mut self) -> Result<(), PowerError> {
        pac::RCC.cr().modify(|w| w.set_pllon(true));
        let mut spins = 0u32;
        while !pac::RCC.cr().read().pllrdy() {
            spins = spins.saturating_add(1);
            if spins >= READY_SPINS {
                return Err(PowerError::ClockRestore);
            }
        }
        pac::RCC.cfgr().modify(|w| w.set_sw(pac::rcc::vals::Sw::PLL1_R));
        Ok(())
    }
}

fn bcd(tens: u8, units: u8) -> u64 {
    u64::from(tens)
        .saturating_mul(10)
        .saturating_add(u64::from(units))
}

/// Millisecond clock read from the calendar RTC.
///
/// Days come from the day-of-month field, so the reading jumps back at a
/// month boundary. The sleep manager saturates negative intervals to zero.
pub struct Stm32Rtc;

impl RtcClock for Stm32Rtc {
    fn now_ms(&self) -> u64 {
        // Reading SSR locks TR and DR until DR is read.
        let ssr = u64::from(pac::RTC.ssr().read().ss());
        let tr = pac::RTC.tr().read();
        let dr = pac::RTC.dr().read();
        let days = bcd(dr.dt(), dr.du());
        let secs = bcd(tr.ht(), tr.hu())
            .saturating_mul(3_600)
            .saturating_add(bcd(tr.mnt(), tr.mnu()).saturating_mul(60))
            .saturating_add(bcd(tr.st(), tr.su()));
        let sub_ms = RTC_PREDIV_S
            .saturating_sub(ssr)
            .saturating_mul(1_000)
            .checked_div(RTC_PREDIV_S.saturating_add(1))
            .unwrap_or(0);
        days.saturating_mul(86_400)
            .saturating_add(secs)
            .saturating_mul(1_000)
            .saturating_add(sub_ms)
    }
}

/// Reset, ROM bootloader and the board self test.
pub struct Stm32System;

impl SystemControl for Stm32System {
    fn restart(&mut self) {
        cortex_m::peripheral::SCB::sys_reset();
    }

    fn enter_bootloader(&mut self) {
        // SAFETY: system memory holds the ST ROM bootloader's vector table;
        // bootload sets MSP from it and jumps to its reset vector.
        unsafe { cortex_m::asm::bootload(SYSTEM_MEMORY as *const u32) }
    }

    fn self_test(&mut self) -> SelfTestReport {
        let checks = [
            pac::RCC.cfgr().read().sws() == pac::rcc::vals::Sw::PLL1_R,
            pac::RCC.bdcr().read().lserdy(),
            pac::RTC.isr().read().inits(),
            pac::RCC.ahb1enr().read().dma1en(),
        ];
        let failures = checks.iter().filter(|ok| !**ok).count();
        SelfTestReport {
            checks: checks.len() as u16,
            failures: failures as u16,
        }
    }
}

/// PDM microphone on SAI1 block A in PDM mode.
pub struct SaiPdm {
    sai: Sai<'static, SAI1, DMA2_CH1, u8>,
}

impl SaiPdm {
    /// Wrap a configured SAI receiver.
    pub fn new(sai: Sai<'static, SAI1, DMA2_CH1, u8>) -> Self {
        Self { sai }
    }
}

impl PdmSource for SaiPdm {
    async fn read_block(&mut self, block: &mut [u8]) -> Result<(), CaptureError> {
        self.sai.read(block).await.map_err(|e| match e {
            embassy_stm32::sai::Error::Overrun => CaptureError::Overrun,
            _ => CaptureError::Transfer,
        })
    }
}

/// One writer type for every port slot.
pub enum BoardWriter {
    /// LPUART1 transmitter
    Lpuart1(UartTx<'static, LPUART1, DMA2_CH6>),
    /// USART1 transmitter
    Usart1(UartTx<'static, USART1, DMA1_CH4>),
    /// A port with no transmitter on this board; writes are discarded
    Absent,
}

/// Transmit errors from any board writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteError;

impl embedded_io::Error for WriteError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

impl ErrorType for BoardWriter {
    type Error = WriteError;
}

impl Write for BoardWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self {
            Self::Lpuart1(tx) => tx.write(buf).await.map_err(|_| WriteError)?,
            Self::Usart1(tx) => tx.write(buf).await.map_err(|_| WriteError)?,
            Self::Absent => {}
        }
        Ok(buf.len())
    }
}
