//! Crate-local logging macros.
//!
//! Forward to `defmt` on hardware and to `tracing` in the simulator. With
//! neither backend the arguments are still evaluated by reference, so a
//! variable used only for logging does not trip `unused` warnings.
//!
//! Format strings must stay within the subset both backends accept: plain
//! `{}` placeholders over primitives and `&str`. Pass `.name()` for enums.

#![allow(unused_macros)]

#[cfg(feature = "defmt")]
macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => { ::defmt::trace!($s $(, $x)*) };
}
#[cfg(feature = "defmt")]
macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => { ::defmt::debug!($s $(, $x)*) };
}
#[cfg(feature = "defmt")]
macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => { ::defmt::info!($s $(, $x)*) };
}
#[cfg(feature = "defmt")]
macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => { ::defmt::warn!($s $(, $x)*) };
}
#[cfg(feature = "defmt")]
macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => { ::defmt::error!($s $(, $x)*) };
}

#[cfg(all(not(feature = "defmt"), feature = "emulator"))]
macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => { ::tracing::trace!($s $(, $x)*) };
}
#[cfg(all(not(feature = "defmt"), feature = "emulator"))]
macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => { ::tracing::debug!($s $(, $x)*) };
}
#[cfg(all(not(feature = "defmt"), feature = "emulator"))]
macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => { ::tracing::info!($s $(, $x)*) };
}
#[cfg(all(not(feature = "defmt"), feature = "emulator"))]
macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => { ::tracing::warn!($s $(, $x)*) };
}
#[cfg(all(not(feature = "defmt"), feature = "emulator"))]
macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => { ::tracing::error!($s $(, $x)*) };
}

#[cfg(not(any(feature = "defmt", feature = "emulator")))]
macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{ $( let _ = &$x; )* }};
}
#[cfg(not(any(feature = "defmt", feature = "emulator")))]
macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{ $( let _ = &$x; )* }};
}
#[cfg(not(any(feature = "defmt", feature = "emulator")))]
macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {{ $( let _ = &$x; )* }};
}
#[cfg(not(any(feature = "defmt", feature = "emulator")))]
macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {{ $( let _ = &$x; )* }};
}
#[cfg(not(any(feature = "defmt", feature = "emulator")))]
macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {{ $( let _ = &$x; )* }};
}
