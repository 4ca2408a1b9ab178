//! Diagnostic commands.
//!
//! Plain-text commands on the service ports (USB and USART1). The first
//! word is matched case-insensitively against a fixed table and must be
//! followed by a space or the end of the line; the first match in table
//! order wins, so `t` is checked before `trace`.
//!
//! | Command            | Reply                                 |
//! |--------------------|---------------------------------------|
//! | `t`                | enables tracing, `trace is on`        |
//! | `trace [on\|off]`  | `trace is on` / `trace is off`        |
//! | `restart`          | resets after the reply settles        |
//! | `mem`              | task table, audio pool, SPL           |
//! | `power`            | `POWER: <active peripherals>`         |
//! | `bootloader`       | ROM bootloader after the reply        |
//! | `post`             | self-test summary                     |
//! | anything else      | `'<line as received>' ??`             |

use core::fmt::Write as _;

use platform::SystemControl;

use crate::runtime::Runtime;
use crate::supervisor::DeferredWork;
use crate::sync::TaskId;

/// Longest command kept after cleaning.
pub const CLEANED_BYTES: usize = 255;

/// Most words split out of a command. The last one keeps the remainder.
pub const MAX_ARGS: usize = 6;

/// Reply capacity.
pub const REPLY_BYTES: usize = 512;

/// Reply line separator.
const EOL: &str = "\r\n";

/// A recognised diagnostic command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Command {
    /// Shorthand for `trace on`
    T,
    /// Show or set tracing
    Trace,
    /// Reset the node
    Restart,
    /// Runtime statistics
    Mem,
    /// Active peripherals
    Power,
    /// Jump to the ROM bootloader
    Bootloader,
    /// Run the self test
    Post,
    /// Not in the table
    #[default]
    Unrecognized,
}

const TABLE: [(&str, Command); 7] = [
    ("t", Command::T),
    ("trace", Command::Trace),
    ("restart", Command::Restart),
    ("mem", Command::Mem),
    ("power", Command::Power),
    ("bootloader", Command::Bootloader),
    ("post", Command::Post),
];

/// `word` equals the start of `input` ignoring ASCII case, and `input`
/// ends or continues with a space right after it.
fn matches_word(word: &str, input: &[u8]) -> bool {
    let w = word.as_bytes();
    let Some(head) = input.get(..w.len()) else {
        return false;
    };
    head.iter().zip(w).all(|(a, b)| a & 0xdf == b & 0xdf)
        && matches!(input.get(w.len()), None | Some(b' '))
}

impl Command {
    /// Look up the first word of `line`.
    pub fn parse(line: &[u8]) -> Self {
        TABLE
            .iter()
            .find(|(word, _)| matches_word(word, line))
            .map_or(Self::Unrecognized, |&(_, cmd)| cmd)
    }
}

/// Keep printable ASCII (letters, digits, punctuation, space), up to
/// [`CLEANED_BYTES`].
pub fn clean(line: &[u8]) -> heapless::String<CLEANED_BYTES> {
    let mut out = heapless::String::new();
    for &b in line {
        let keep = b.is_ascii_alphanumeric() || b.is_ascii_punctuation() || b == b' ';
        if keep && out.push(char::from(b)).is_err() {
            break;
        }
    }
    out
}

/// Split on the first space or comma, repeatedly, into at most
/// [`MAX_ARGS`] words. Adjacent separators give empty words.
pub fn split_args(cmd: &str) -> heapless::Vec<&str, MAX_ARGS> {
    let mut args = heapless::Vec::new();
    let mut rest = cmd;
    loop {
        if args.len().saturating_add(1) == MAX_ARGS {
            let _ = args.push(rest);
            return args;
        }
        match rest.find([' ', ',']) {
            Some(at) => {
                let _ = args.push(rest.get(..at).unwrap_or_default());
                rest = rest.get(at.saturating_add(1)..).unwrap_or_default();
            }
            None => {
                let _ = args.push(rest);
                return args;
            }
        }
    }
}

/// Output of one diagnostic command.
#[derive(Debug, Default)]
pub struct DiagReply {
    /// The command that produced it
    pub command: Command,
    /// Reply text, lines separated by CR LF, without the final terminator
    pub text: heapless::String<REPLY_BYTES>,
    /// Action to take once the reply is out
    pub deferred: DeferredWork,
}

impl DiagReply {
    fn line(&mut self, args: core::fmt::Arguments<'_>) {
        if !self.text.is_empty() {
            let _ = self.text.push_str(EOL);
        }
        // Long output is cut at the reply capacity.
        let _ = self.text.write_fmt(args);
    }
}

/// Run one diagnostic command.
pub fn process<W, S: SystemControl>(
    rt: &Runtime<'_, W>,
    system: &mut S,
    line: &[u8],
) -> DiagReply {
    let cmd = Command::parse(line);
    let cleaned = clean(line);
    let args = split_args(&cleaned);
    let arg = |n: usize| args.get(n).copied().unwrap_or("");
    let mut reply = DiagReply {
        command: cmd,
        ..DiagReply::default()
    };

    match cmd {
        Command::T => {
            rt.debug.set_enabled(true);
            reply.line(format_args!("trace is on"));
        }
        Command::Trace => {
            let a = arg(1);
            if a.eq_ignore_ascii_case("on") {
                rt.debug.set_enabled(true);
            } else if a.eq_ignore_ascii_case("off") {
                rt.debug.set_enabled(false);
            }
            let state = if rt.debug.is_enabled() { "on" } else { "off" };
            reply.line(format_args!("trace is {state}"));
        }
        Command::Restart => {
            reply.line(format_args!("restarting"));
            reply.deferred = DeferredWork::Restart;
        }
        Command::Bootloader => {
            reply.line(format_args!("entering bootloader"));
            reply.deferred = DeferredWork::Bootloader;
        }
        Command::Mem => mem(rt, &mut reply),
        Command::Power => {
            reply.line(format_args!("POWER: {}", rt.peripherals.snapshot()));
        }
        Command::Post => {
            let report = system.self_test();
            reply.line(format_args!("{report}"));
        }
        Command::Unrecognized => {
            reply.line(format_args!("'{}' ??", Raw(line)));
        }
    }
    debug!("diag: {} -> {} bytes", arg(0), reply.text.len());
    reply
}

/// The line as received. Invalid UTF-8 shows as U+FFFD.
struct Raw<'a>(&'a [u8]);

impl core::fmt::Display for Raw<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for chunk in self.0.utf8_chunks() {
            f.write_str(chunk.valid())?;
            if !chunk.invalid().is_empty() {
                f.write_char(char::REPLACEMENT_CHARACTER)?;
            }
        }
        Ok(())
    }
}

fn mem<W>(rt: &Runtime<'_, W>, reply: &mut DiagReply) {
    let mut names: heapless::String<64> = heapless::String::new();
    for id in TaskId::ALL {
        if rt.tasks.is_registered(id) {
            let sep = if names.is_empty() { "" } else { " " };
            let _ = write!(names, "{sep}{}:{}", id.letter(), id.name());
        }
    }
    reply.line(format_args!("tasks: {names}"));
    let (_, idle) = rt.tasks.idle_trace(TaskId::Request);
    reply.line(format_args!("{idle}"));
    reply.line(format_args!(
        "uptime: {}ms slept: {}ms",
        rt.clock.now_ms(),
        rt.clock.slept_ms()
    ));
    reply.line(format_args!("{}", rt.pool.stats()));
    reply.line(format_args!("{}", rt.spl));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::audio::PdmPool;
    use crate::config::NODE_CONFIG;
    use crate::sync::TaskSet;
    use crate::time_base::MonotonicClock;
    use platform::mocks::{MockSerialWriter, MockSystem};
    use platform::{PeripheralId, UsbPresence};

    fn with_runtime(f: impl FnOnce(&Runtime<'_, MockSerialWriter>)) {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        let pool = PdmPool::new();
        let rt = Runtime::new(
            NODE_CONFIG,
            &clock,
            &tasks,
            &pool,
            core::array::from_fn(|_| MockSerialWriter::new()),
            UsbPresence::Absent,
        );
        f(&rt);
    }

    #[test]
    fn table_matching() {
        assert_eq!(Command::parse(b"t"), Command::T);
        assert_eq!(Command::parse(b"TRACE on"), Command::Trace);
        assert_eq!(Command::parse(b"Mem"), Command::Mem);
        assert_eq!(Command::parse(b"memory"), Command::Unrecognized);
        assert_eq!(Command::parse(b"t,x"), Command::Unrecognized);
        assert_eq!(Command::parse(b"bootloader now"), Command::Bootloader);
        assert_eq!(Command::parse(b""), Command::Unrecognized);
    }

    #[test]
    fn cleaning_drops_control_bytes_and_caps_length() {
        assert_eq!(clean(b"tr\x01ace\x7f on\t").as_str(), "trace on");
        let long = [b'a'; 400];
        assert_eq!(clean(&long).len(), CLEANED_BYTES);
    }

    #[test]
    fn argv_splits_on_space_or_comma() {
        assert_eq!(split_args("trace on").as_slice(), &["trace", "on"]);
        assert_eq!(split_args("a,b c").as_slice(), &["a", "b", "c"]);
        assert_eq!(split_args("a  b").as_slice(), &["a", "", "b"]);
        assert_eq!(split_args("").as_slice(), &[""]);
        assert_eq!(
            split_args("1 2 3 4 5 6 7").as_slice(),
            &["1", "2", "3", "4", "5", "6 7"]
        );
    }

    #[test]
    fn trace_commands_toggle_debug_output() {
        with_runtime(|rt| {
            let mut sys = MockSystem::new();
            assert_eq!(process(rt, &mut sys, b"trace").text.as_str(), "trace is off");
            assert_eq!(process(rt, &mut sys, b"t").text.as_str(), "trace is on");
            assert!(rt.debug.is_enabled());
            assert_eq!(
                process(rt, &mut sys, b"trace off").text.as_str(),
                "trace is off"
            );
            assert!(!rt.debug.is_enabled());
            assert_eq!(process(rt, &mut sys, b"trace ON").text.as_str(), "trace is on");
        });
    }

    #[test]
    fn unknown_command_is_echoed() {
        with_runtime(|rt| {
            let mut sys = MockSystem::new();
            let r = process(rt, &mut sys, b"hello\x02 world");
            assert_eq!(r.text.as_str(), "'hello\u{2} world' ??");
            assert_eq!(r.command, Command::Unrecognized);
            assert_eq!(r.deferred, DeferredWork::None);
            let r = process(rt, &mut sys, b"caf\xe9  x");
            assert_eq!(r.text.as_str(), "'caf\u{fffd}  x' ??");
        });
    }

    #[test]
    fn restart_and_bootloader_are_deferred() {
        with_runtime(|rt| {
            let mut sys = MockSystem::new();
            assert_eq!(process(rt, &mut sys, b"restart").deferred, DeferredWork::Restart);
            assert_eq!(
                process(rt, &mut sys, b"BOOTLOADER").deferred,
                DeferredWork::Bootloader
            );
            assert_eq!(sys.restarts, 0);
        });
    }

    #[test]
    fn power_lists_active_peripherals() {
        with_runtime(|rt| {
            let mut sys = MockSystem::new();
            rt.peripherals.remove(PeripheralId::Usart1);
            let r = process(rt, &mut sys, b"power");
            assert!(r.text.starts_with("POWER: "));
            assert!(r.text.contains("LPUART1"));
            assert!(!r.text.contains("USART1 "));
        });
    }

    #[test]
    fn post_reports_self_test() {
        with_runtime(|rt| {
            let mut sys = MockSystem::new();
            assert_eq!(
                process(rt, &mut sys, b"post").text.as_str(),
                "POST: 4 checks passed"
            );
        });
    }

    #[test]
    fn mem_lists_tasks_pool_and_spl() {
        with_runtime(|rt| {
            rt.tasks.register(TaskId::Serial, false);
            rt.tasks.register(TaskId::Request, false);
            let mut sys = MockSystem::new();
            let r = process(rt, &mut sys, b"mem");
            let lines: Vec<&str> = r.text.split("\r\n").collect();
            assert_eq!(lines[0], "tasks: U:serial R:request");
            assert!(lines[1].starts_with("NEXT:0ms R:run"));
            assert!(lines[2].starts_with("uptime: "));
            assert!(lines[3].starts_with("audio: gets:0"));
            assert!(lines[4].starts_with("spl: -"));
        });
    }
}
