//! Request dispatch: line in, reply out.

pub mod diag;
pub mod req_task;
pub mod request;

pub use diag::{Command, DiagReply};
pub use req_task::{pass, process_port, run, REQUEST_PORTS};
