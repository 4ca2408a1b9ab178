//! Board-level inputs and outputs: button, status LED, USB presence.
//!
//! Everything here is generic over `embedded-hal` traits. Hardware builds
//! hand in embassy-stm32 pins; tests use `embedded-hal-mock`.

pub mod button;
pub mod led;
#[cfg(feature = "hardware")]
pub mod stm32;
pub mod usb;

pub use button::{Button, ButtonPress, Debouncer};
pub use led::StatusLed;
pub use usb::{UsbMonitor, UsbTransition};
