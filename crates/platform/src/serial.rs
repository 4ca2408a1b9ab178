//! Serial transport identities and line configuration
//!
//! The node listens on up to four byte-stream transports. Byte movement is
//! expressed with `embedded_io_async::{Read, Write}`; this module only names
//! the ports and describes how the hardware UARTs are framed.

use crate::peripheral::PeripheralId;

/// One of the serial transports the request multiplexer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortId {
    /// USB-CDC virtual serial port
    Usb,
    /// Low-power UART (retained through STOP2, wakes on start bit)
    Lpuart1,
    /// USART1
    Usart1,
    /// USART2 (optionally RS-485 with driver-enable)
    Usart2,
}

impl PortId {
    /// Number of ports.
    pub const COUNT: usize = 4;

    /// All ports in poll order.
    pub const ALL: [PortId; Self::COUNT] = [
        PortId::Usb,
        PortId::Lpuart1,
        PortId::Usart1,
        PortId::Usart2,
    ];

    /// Dense index for per-port tables.
    pub const fn index(self) -> usize {
        match self {
            Self::Usb => 0,
            Self::Lpuart1 => 1,
            Self::Usart1 => 2,
            Self::Usart2 => 3,
        }
    }

    /// Whether diagnostic commands are accepted on this port.
    ///
    /// Tied to the physical transport: USB and USART1 are the service ports.
    pub const fn is_diagnostic(self) -> bool {
        matches!(self, Self::Usb | Self::Usart1)
    }

    /// The peripheral behind a hardware UART. USB is brought up and down
    /// with VBUS instead and has none.
    pub const fn peripheral(self) -> Option<PeripheralId> {
        match self {
            Self::Usb => None,
            Self::Lpuart1 => Some(PeripheralId::Lpuart1),
            Self::Usart1 => Some(PeripheralId::Usart1),
            Self::Usart2 => Some(PeripheralId::Usart2),
        }
    }

    /// Short name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Lpuart1 => "lpuart1",
            Self::Usart1 => "usart1",
            Self::Usart2 => "usart2",
        }
    }
}

/// UART configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits
    pub data_bits: DataBits,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Drive the RS-485 transceiver's DE line around transmissions
    pub rs485: bool,
}

impl UartConfig {
    /// 8N1 at the given baud rate.
    pub const fn new_8n1(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            rs485: false,
        }
    }

    /// Same framing with the RS-485 driver-enable turned on.
    pub const fn with_rs485(mut self) -> Self {
        self.rs485 = true;
        self
    }
}

/// Data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    /// 7 data bits
    Seven,
    /// 8 data bits
    Eight,
    /// 9 data bits
    Nine,
}

/// Parity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// No parity
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    /// 1 stop bit
    One,
    /// 2 stop bits
    Two,
}
