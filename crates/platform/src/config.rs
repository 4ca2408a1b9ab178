//! Product identity
//!
//! Central naming and version constants. Anything that prints the product
//! name or version references these rather than hardcoding values.

/// The organisation that ships the node
pub const ORG_NAME: &str = "Sensor Node Project";

/// The product name
pub const PRODUCT_NAME: &str = "Sensor Node";

/// The product short name (used in log prefixes)
pub const PRODUCT_NAME_SHORT: &str = "node";

/// Firmware version (synchronized with Cargo.toml)
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Major version component
pub const VERSION_MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");

/// Minor version component
pub const VERSION_MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");

/// Patch version component
pub const VERSION_PATCH: &str = env!("CARGO_PKG_VERSION_PATCH");

/// Build-config line printed at boot and consumed by host tooling.
///
/// The host library scans the boot banner for the `firmware::info:` prefix
/// and parses the JSON object that follows it.
pub const BUILD_INFO: &str = concat!(
    "firmware::info:{\"org\":\"",
    "Sensor Node Project",
    "\",\"product\":\"",
    "Sensor Node",
    "\",\"version\":\"",
    env!("CARGO_PKG_VERSION"),
    "\",\"ver_major\":",
    env!("CARGO_PKG_VERSION_MAJOR"),
    ",\"ver_minor\":",
    env!("CARGO_PKG_VERSION_MINOR"),
    ",\"ver_patch\":",
    env!("CARGO_PKG_VERSION_PATCH"),
    "}"
);

/// Boot banner
pub const fn boot_banner() -> &'static str {
    "Sensor Node firmware"
}
