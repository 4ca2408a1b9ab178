//! User button.
//!
//! Active-low with an internal pull-up. Both edges interrupt; an edge within
//! the debounce window of the previous one is contact bounce and ignored.
//! A clean press wakes the request task, which answers with the alive blink.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::digital::InputPin;
use embedded_hal_async::digital::Wait;
use platform::IsrSafe;

use crate::sync::{IsrTasks, TaskId};
use crate::time_base::MonotonicClock;

/// Edge filter.
pub struct Debouncer {
    window_ms: u32,
    last_edge_ms: Mutex<CriticalSectionRawMutex, Cell<Option<u64>>>,
}

impl Debouncer {
    /// Ignore edges closer than `window_ms` to the previous one.
    pub const fn new(window_ms: u32) -> Self {
        Self {
            window_ms,
            last_edge_ms: Mutex::new(Cell::new(None)),
        }
    }

    /// Record an edge. Returns `true` for a press that survived debouncing.
    pub fn on_edge(&self, now_ms: u64, pressed: bool) -> bool {
        let last = self.last_edge_ms.lock(|c| c.replace(Some(now_ms)));
        let settled = match last {
            Some(t) => now_ms.saturating_sub(t) >= u64::from(self.window_ms),
            None => true,
        };
        settled && pressed
    }
}

/// Latched press, consumed by the request task.
pub struct ButtonPress {
    pending: AtomicBool,
}

impl ButtonPress {
    /// No press pending.
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Latch a press and wake the request task.
    pub fn press_from_isr(&self, tasks: IsrTasks<'_, '_>) {
        self.pending.store(true, Ordering::Release);
        tasks.give_from_isr(TaskId::Request);
    }

    /// Consume the latched press.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for ButtonPress {
    fn default() -> Self {
        Self::new()
    }
}

impl IsrSafe for ButtonPress {}

/// The button pin plus its debouncer.
pub struct Button<P> {
    pin: P,
    debounce: Debouncer,
}

impl<P: InputPin + Wait> Button<P> {
    /// Button on `pin` with a `debounce_ms` window.
    pub const fn new(pin: P, debounce_ms: u32) -> Self {
        Self {
            pin,
            debounce: Debouncer::new(debounce_ms),
        }
    }

    /// Wait for the next edge. Returns `true` if it was an accepted press.
    pub async fn next_edge(&mut self, clock: &MonotonicClock) -> Result<bool, P::Error> {
        self.pin.wait_for_any_edge().await?;
        let pressed = self.pin.is_low()?;
        Ok(self.debounce.on_edge(clock.now_ms(), pressed))
    }

    /// Forward accepted presses to `press` forever.
    pub async fn run(
        &mut self,
        clock: &MonotonicClock,
        press: &ButtonPress,
        tasks: IsrTasks<'_, '_>,
    ) {
        loop {
            match self.next_edge(clock).await {
                Ok(true) => {
                    debug!("button: press");
                    press.press_from_isr(tasks);
                }
                Ok(false) => {}
                Err(_) => warn!("button: pin read failed"),
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
    use crate::sync::{TaskContext, TaskSet, Timeout};
    use embedded_hal_mock::eh1::digital::{
        Edge, Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    #[test]
    fn first_press_is_accepted_and_bounce_ignored() {
        let d = Debouncer::new(100);
        assert!(d.on_edge(1_000, true));
        assert!(!d.on_edge(1_005, false));
        assert!(!d.on_edge(1_010, true));
        // Release long after the last bounce.
        assert!(!d.on_edge(1_500, false));
        assert!(d.on_edge(2_000, true));
    }

    #[test]
    fn bounce_extends_the_window() {
        let d = Debouncer::new(100);
        assert!(d.on_edge(0, true));
        assert!(!d.on_edge(90, true));
        assert!(!d.on_edge(180, true));
        assert!(d.on_edge(280, true));
    }

    #[tokio::test]
    async fn press_wakes_request_task() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        tasks.register(TaskId::Request, false);
        let press = ButtonPress::new();
        press.press_from_isr(tasks.isr());
        let ctx = TaskContext::new(TaskId::Request);
        assert!(tasks.take(&ctx, Timeout::Ms(1)).await);
        assert!(press.take());
        assert!(!press.take());
    }

    #[tokio::test]
    async fn active_low_pin_edges() {
        let clock = MonotonicClock::new();
        let pin = PinMock::new(&[
            PinTransaction::wait_for_edge(Edge::Any),
            PinTransaction::get(PinState::Low),
            PinTransaction::wait_for_edge(Edge::Any),
            PinTransaction::get(PinState::High),
        ]);
        let mut button = Button::new(pin, 100);
        clock.step(1_000);
        assert!(button.next_edge(&clock).await.unwrap());
        clock.step(400);
        assert!(!button.next_edge(&clock).await.unwrap());
        button.release().done();
    }
}
