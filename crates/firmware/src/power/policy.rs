//! Application sleep veto.

use platform::UsbPresence;

use crate::config::NodeConfig;

/// Whether the application is willing to enter STOP2.
///
/// Serial traffic in the last few seconds or an attached USB host keeps the
/// node awake. A USB presence that cannot be sensed also keeps it awake.
pub fn app_sleep_allowed(serial_active: bool, usb: UsbPresence, config: &NodeConfig) -> bool {
    !serial_active && usb == UsbPresence::Absent && config.allow_stop2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NODE_CONFIG;

    #[test]
    fn quiet_unplugged_node_may_sleep() {
        assert!(app_sleep_allowed(false, UsbPresence::Absent, &NODE_CONFIG));
    }

    #[test]
    fn any_veto_keeps_node_awake() {
        assert!(!app_sleep_allowed(true, UsbPresence::Absent, &NODE_CONFIG));
        assert!(!app_sleep_allowed(false, UsbPresence::Present, &NODE_CONFIG));
        assert!(!app_sleep_allowed(false, UsbPresence::Unknown, &NODE_CONFIG));
        let no_stop = NodeConfig {
            allow_stop2: false,
            ..NODE_CONFIG
        };
        assert!(!app_sleep_allowed(false, UsbPresence::Absent, &no_stop));
    }
}
