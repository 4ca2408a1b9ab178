//! Sensor node firmware - main entry point
//!
//! Hardware-only entry point for the STM32L433. Runs the boot sequence from
//! [`firmware::boot`], spawns the tasks, and becomes the idle loop.

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::sai::{self, Sai};
use embassy_stm32::usart::{self, Uart};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_stm32::{bind_interrupts, pac, peripherals};
use static_cell::StaticCell;

use firmware::board::stm32::{BoardWriter, SaiPdm, Stm32Power, Stm32Rtc, Stm32System};
use firmware::board::StatusLed;
use firmware::boot::{self, WATCHDOG_TIMEOUT_MS};
use firmware::config::{NODE_CONFIG, PDM_BLOCK_BYTES};
use firmware::power::SleepManager;
use firmware::sync::{TaskContext, TaskId};
use firmware::tasks;
use platform::{LowPowerHal, UartConfig};

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
    LPUART1 => usart::InterruptHandler<peripherals::LPUART1>;
});

/// SAI DMA ring: two PDM blocks.
static PDM_DMA: StaticCell<[u8; PDM_BLOCK_BYTES * 2]> = StaticCell::new();

fn uart_config(cfg: Option<UartConfig>) -> usart::Config {
    let mut out = usart::Config::default();
    if let Some(cfg) = cfg {
        out.baudrate = cfg.baud_rate;
    }
    out
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_stm32::init(boot::build_embassy_config());
    if let Some(core) = cortex_m::Peripherals::take() {
        boot::hardware::start_systick(core.SYST);
    }

    let mut watchdog = IndependentWatchdog::new(p.IWDG, WATCHDOG_TIMEOUT_MS * 1_000);
    watchdog.unleash();

    for line in boot::banner_lines() {
        defmt::info!("{=str}", line);
    }

    let mut led = StatusLed::new(Output::new(p.PB3, Level::Low, Speed::Low).degrade());
    led.restart_signal().await;

    let mut writers = [
        BoardWriter::Absent,
        BoardWriter::Absent,
        BoardWriter::Absent,
        BoardWriter::Absent,
    ];
    let mut lp_rx = None;
    match Uart::new(
        p.LPUART1,
        p.PA3,
        p.PA2,
        Irqs,
        p.DMA2_CH6,
        p.DMA2_CH7,
        uart_config(NODE_CONFIG.lpuart1),
    ) {
        Ok(uart) => {
            let (tx, rx) = uart.split();
            writers[1] = BoardWriter::Lpuart1(tx);
            lp_rx = Some(rx);
        }
        Err(_) => defmt::error!("LPUART1 config rejected"),
    }
    let mut u1_rx = None;
    match Uart::new(
        p.USART1,
        p.PB7,
        p.PB6,
        Irqs,
        p.DMA1_CH4,
        p.DMA1_CH5,
        uart_config(NODE_CONFIG.usart1),
    ) {
        Ok(uart) => {
            let (tx, rx) = uart.split();
            writers[2] = BoardWriter::Usart1(tx);
            u1_rx = Some(rx);
        }
        Err(_) => defmt::error!("USART1 config rejected"),
    }

    let power = Stm32Power;
    let rt = tasks::runtime(writers, power.usb_presence());

    spawner.must_spawn(tasks::serial_task(rt));
    spawner.must_spawn(tasks::request_task(rt, led.release()));
    if let Some(rx) = lp_rx {
        spawner.must_spawn(tasks::lpuart1_rx_task(rt, rx));
    }
    if let Some(rx) = u1_rx {
        spawner.must_spawn(tasks::usart1_rx_task(rt, rx));
    }
    let button = ExtiInput::new(Input::new(p.PC13, Pull::Up).degrade(), p.EXTI13.degrade());
    spawner.must_spawn(tasks::button_task(rt, button));
    let vbus = ExtiInput::new(Input::new(p.PA9, Pull::Down).degrade(), p.EXTI9.degrade());
    spawner.must_spawn(tasks::vbus_task(rt, vbus));

    if NODE_CONFIG.audio.enabled {
        let (sub_block_a, _) = sai::split_subblocks(p.SAI1);
        let mut sai_cfg = sai::Config::default();
        sai_cfg.tx_rx = sai::TxRx::Receiver;
        sai_cfg.data_size = sai::DataSize::Data8;
        let sai = Sai::new_asynchronous(
            sub_block_a,
            p.PA8,
            p.PA10,
            p.PB9,
            p.DMA2_CH1,
            PDM_DMA.init([0; PDM_BLOCK_BYTES * 2]),
            sai_cfg,
        );
        // One microphone on D1, clock on CK1.
        pac::SAI1.pdmcr().modify(|w| {
            w.set_micnbr(0);
            w.set_cken(0, true);
            w.set_pdmen(true);
        });
        spawner.must_spawn(tasks::audio_task(rt, SaiPdm::new(sai)));
    }

    let ctx = TaskContext::new(TaskId::Main);
    rt.tasks.register(TaskId::Main, false);
    let mut sleep = SleepManager::new(power, Stm32Rtc);
    loop {
        match rt.power_pass(&ctx, &mut sleep).await {
            Ok(_) => watchdog.pet(),
            Err(fatal) => rt.supervisor.fail(fatal, &mut Stm32System),
        }
    }
}
