//! Peripheral identities and the active-peripheral set
//!
//! Every driver marks its peripheral active on init and inactive on deinit.
//! The sleep manager snapshots the set before STOP2 to decide what must be
//! torn down and what must be brought back afterwards.

use core::fmt;

/// Peripherals tracked by the power manager.
///
/// The discriminant is the bit position inside [`PeripheralSet`], and the
/// declaration order is the order the `power` diagnostic prints them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PeripheralId {
    /// True random number generator
    Rng = 0,
    /// USB full-speed device (CDC virtual serial)
    Usb = 1,
    /// ADC1
    Adc1 = 2,
    /// bxCAN1
    Can1 = 3,
    /// Low-power UART (wake-from-STOP capable)
    Lpuart1 = 4,
    /// USART1 (diagnostic-capable)
    Usart1 = 5,
    /// USART2 (optionally RS-485)
    Usart2 = 6,
    /// I2C1
    I2c1 = 7,
    /// I2C3
    I2c3 = 8,
    /// SPI1
    Spi1 = 9,
    /// SPI2
    Spi2 = 10,
    /// SAI1 PDM microphone capture
    Sai1 = 11,
}

impl PeripheralId {
    /// All peripherals in print order.
    pub const ALL: [PeripheralId; 12] = [
        PeripheralId::Rng,
        PeripheralId::Usb,
        PeripheralId::Adc1,
        PeripheralId::Can1,
        PeripheralId::Lpuart1,
        PeripheralId::Usart1,
        PeripheralId::Usart2,
        PeripheralId::I2c1,
        PeripheralId::I2c3,
        PeripheralId::Spi1,
        PeripheralId::Spi2,
        PeripheralId::Sai1,
    ];

    /// Upper-case register-style name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rng => "RNG",
            Self::Usb => "USB",
            Self::Adc1 => "ADC1",
            Self::Can1 => "CAN1",
            Self::Lpuart1 => "LPUART1",
            Self::Usart1 => "USART1",
            Self::Usart2 => "USART2",
            Self::I2c1 => "I2C1",
            Self::I2c3 => "I2C3",
            Self::Spi1 => "SPI1",
            Self::Spi2 => "SPI2",
            Self::Sai1 => "SAI1",
        }
    }

    const fn bit(self) -> u16 {
        1u16 << (self as u8)
    }
}

/// Bitmask of currently initialised peripherals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct PeripheralSet(u16);

impl PeripheralSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Build a set from a list of peripherals.
    // Safety: i < ids.len() bounds both the index and the increment.
    #[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
    pub const fn of(ids: &[PeripheralId]) -> Self {
        let mut bits = 0u16;
        let mut i = 0;
        while i < ids.len() {
            bits |= ids[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// Raw bitmask.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Rebuild from a raw bitmask, dropping unknown bits.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & Self::of(&PeripheralId::ALL).0)
    }

    /// Add a peripheral.
    pub fn insert(&mut self, id: PeripheralId) {
        self.0 |= id.bit();
    }

    /// Remove a peripheral.
    pub fn remove(&mut self, id: PeripheralId) {
        self.0 &= !id.bit();
    }

    /// Whether `id` is in the set.
    pub const fn contains(self, id: PeripheralId) -> bool {
        self.0 & id.bit() != 0
    }

    /// Whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members of `self` that are not in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Members common to both sets.
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Iterate members in print order.
    pub fn iter(self) -> impl Iterator<Item = PeripheralId> {
        PeripheralId::ALL
            .into_iter()
            .filter(move |id| self.contains(*id))
    }
}

impl FromIterator<PeripheralId> for PeripheralSet {
    fn from_iter<I: IntoIterator<Item = PeripheralId>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Prints each member followed by a space, e.g. `LPUART1 USART1 `.
impl fmt::Display for PeripheralSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.iter() {
            f.write_str(id.name())?;
            f.write_str(" ")?;
        }
        Ok(())
    }
}
