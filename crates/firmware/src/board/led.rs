//! Status LED.
//!
//! Lit while a request is processed, blinked on a button press, and swept
//! fast-to-slow at boot so a restart is visible from across the room.
//!
//! The LED is best effort: pin errors are ignored.

use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;

/// Steps in the boot sweep.
pub const RESTART_STEPS: i32 = 20;

/// Sweep step lengths are `(max(i, 0) + 4)` units, for `i` from 10 down.
const SWEEP_ON_UNIT_MS: u64 = 4;
const SWEEP_OFF_UNIT_MS: u64 = 3;
const SWEEP_MIN_UNITS: u64 = 4;

/// Alive blink on a button press.
pub const BLINK_COUNT: u32 = 2;
/// On and off time of each alive blink.
pub const BLINK_MS: u64 = 100;

/// The board LED.
pub struct StatusLed<P> {
    pin: P,
}

impl<P: OutputPin> StatusLed<P> {
    /// Wrap the LED pin. The LED state is not changed.
    pub const fn new(pin: P) -> Self {
        Self { pin }
    }

    /// Light the LED for the duration of a request.
    pub fn busy(&mut self, on: bool) {
        let _ = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
    }

    /// Boot signal: 20 flashes getting shorter, then left on.
    pub async fn restart_signal(&mut self) {
        for step in 0..RESTART_STEPS {
            let i = 10i32.saturating_sub(step);
            let units = u64::try_from(i.max(0))
                .unwrap_or(0)
                .saturating_add(SWEEP_MIN_UNITS);
            self.busy(true);
            Timer::after(Duration::from_millis(units.saturating_mul(SWEEP_ON_UNIT_MS))).await;
            self.busy(false);
            Timer::after(Duration::from_millis(units.saturating_mul(SWEEP_OFF_UNIT_MS))).await;
        }
        self.busy(true);
    }

    /// Show that the node is alive: two 100 ms flashes.
    pub async fn alive_blink(&mut self) {
        for n in 0..BLINK_COUNT {
            self.busy(true);
            Timer::after(Duration::from_millis(BLINK_MS)).await;
            self.busy(false);
            if n.saturating_add(1) != BLINK_COUNT {
                Timer::after(Duration::from_millis(BLINK_MS)).await;
            }
        }
    }

    /// Give the pin back.
    pub fn release(self) -> P {
        self.pin
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    #[test]
    fn busy_drives_the_pin() {
        let pin = PinMock::new(&[
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let mut led = StatusLed::new(pin);
        led.busy(true);
        led.busy(false);
        led.release().done();
    }

    #[tokio::test]
    async fn alive_blink_is_two_flashes() {
        let pin = PinMock::new(&[
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let mut led = StatusLed::new(pin);
        let started = std::time::Instant::now();
        led.alive_blink().await;
        assert!(started.elapsed() >= std::time::Duration::from_millis(300));
        led.release().done();
    }

    #[tokio::test]
    async fn restart_signal_ends_lit() {
        let mut led = StatusLed::new(platform::mocks::MockLed::new());
        led.restart_signal().await;
        let pin = led.release();
        let levels = pin.levels();
        assert_eq!(levels.len(), 41);
        assert!(pin.is_lit());
        assert_eq!(levels.iter().filter(|&&l| l).count(), 21);
    }
}
