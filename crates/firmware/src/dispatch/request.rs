//! Request routing.
//!
//! A line starting with `{` is a JSON request, which this firmware does not
//! speak. Everything else is a diagnostic command, accepted only on the
//! service ports.

use platform::{PortId, SystemControl};

use super::diag::{self, DiagReply};
use crate::error::Error;
use crate::runtime::Runtime;

/// Route one request line from `port`.
pub fn process<W, S: SystemControl>(
    rt: &Runtime<'_, W>,
    system: &mut S,
    port: PortId,
    line: &[u8],
) -> Result<DiagReply, Error> {
    if line.first() == Some(&b'{') {
        return Err(Error::JsonNotImplemented);
    }
    if !port.is_diagnostic() {
        return Err(Error::DiagnosticsNotAllowed);
    }
    Ok(diag::process(rt, system, line))
}
