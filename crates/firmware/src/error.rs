//! Firmware error types.
//!
//! [`Error`] is everything a request can fail with; its `Display` is the
//! exact text sent back on the wire. [`Fatal`] is a broken invariant. It is
//! never retried: the supervisor logs it and restarts the node.

use platform::power::PowerError;
use thiserror_no_std::Error;

use crate::sync::LockLevel;

/// Recoverable failures, rendered as their wire strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Transport failure or a disallowed I/O path
    #[error("{{io}}")]
    Io,
    /// A fixed-capacity buffer could not hold the data
    #[error("{{memory}}")]
    Memory,
    /// Diagnostic command received on a non-service port
    #[error("diagnostics not allowed on this port")]
    DiagnosticsNotAllowed,
    /// `{`-prefixed request; the JSON protocol is not part of this firmware
    #[error("JSON requests not implemented")]
    JsonNotImplemented,
    /// A bounded wait expired
    #[error("{{timeout}}")]
    Timeout,
    /// The resource is held elsewhere; try again later
    #[error("{{busy}}")]
    Busy,
    /// A broken invariant surfaced through a fallible path
    #[error("{0}")]
    Unrecoverable(#[from] Fatal),
}

impl Error {
    /// Short tag for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::Memory => "memory",
            Self::DiagnosticsNotAllowed => "diag-not-allowed",
            Self::JsonNotImplemented => "json",
            Self::Timeout => "timeout",
            Self::Busy => "busy",
            Self::Unrecoverable(f) => f.name(),
        }
    }

    /// The fatal cause, if this error must end in a restart.
    pub const fn fatal(&self) -> Option<Fatal> {
        match self {
            Self::Unrecoverable(f) => Some(*f),
            _ => None,
        }
    }
}

/// Invariant violations that force a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fatal {
    /// A lock was requested at or below a level the task already holds
    #[error("lock order: {attempted} while holding {held}")]
    LockOrder {
        /// Highest level held by the task
        held: LockLevel,
        /// Level it tried to take
        attempted: LockLevel,
    },
    /// A task tried to take a lock it already holds
    #[error("nested lock: {0}")]
    Reentrant(LockLevel),
    /// An internal table failed its consistency check
    #[error("corrupt table: {0}")]
    Corrupt(&'static str),
    /// Hardware did not come back after STOP2 or at boot
    #[error("{0}")]
    Power(PowerError),
}

impl Fatal {
    /// Short tag for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LockOrder { .. } => "lock-order",
            Self::Reentrant(_) => "lock-nested",
            Self::Corrupt(_) => "corrupt",
            Self::Power(_) => "power",
        }
    }
}

impl From<PowerError> for Fatal {
    fn from(e: PowerError) -> Self {
        Self::Power(e)
    }
}

#[cfg(test)]
mod tests {
    use std::string::ToString;

    use super::*;

    #[test]
    fn wire_strings() {
        assert_eq!(Error::Io.to_string(), "{io}");
        assert_eq!(Error::Memory.to_string(), "{memory}");
        assert_eq!(
            Error::JsonNotImplemented.to_string(),
            "JSON requests not implemented"
        );
        assert_eq!(
            Error::DiagnosticsNotAllowed.to_string(),
            "diagnostics not allowed on this port"
        );
    }

    #[test]
    fn fatal_converts_and_is_recoverable_from_error() {
        let e: Error = Fatal::Reentrant(LockLevel::SerialRx).into();
        assert_eq!(e.fatal(), Some(Fatal::Reentrant(LockLevel::SerialRx)));
        assert_eq!(Error::Busy.fatal(), None);
    }

    #[test]
    fn fatal_display_names_levels() {
        let f = Fatal::LockOrder {
            held: LockLevel::Queue,
            attempted: LockLevel::SerialTx,
        };
        assert_eq!(f.to_string(), "lock order: serial-tx while holding queue");
    }
}
