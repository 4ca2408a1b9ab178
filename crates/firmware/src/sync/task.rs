//! Task identities.

use super::LockTracker;

/// The fixed set of firmware tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskId {
    /// Power management and the sleep decision
    Main = 0,
    /// Serial poller
    Serial = 1,
    /// Request processing
    Request = 2,
    /// Audio processing
    Audio = 3,
}

impl TaskId {
    /// Number of tasks.
    pub const COUNT: usize = 4;

    /// All tasks in table order.
    pub const ALL: [TaskId; Self::COUNT] =
        [TaskId::Main, TaskId::Serial, TaskId::Request, TaskId::Audio];

    /// Dense index for per-task tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Task name for logs and the `mem` command.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Serial => "serial",
            Self::Request => "request",
            Self::Audio => "audio",
        }
    }

    /// One-letter tag used in the idle trace line.
    pub const fn letter(self) -> char {
        match self {
            Self::Main => 'M',
            Self::Serial => 'U',
            Self::Request => 'R',
            Self::Audio => 'A',
        }
    }

    pub(crate) const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Main),
            1 => Some(Self::Serial),
            2 => Some(Self::Request),
            3 => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Per-task state threaded through every blocking call.
///
/// One per task, owned by that task's future.
#[derive(Debug)]
pub struct TaskContext {
    id: TaskId,
    locks: LockTracker,
}

impl TaskContext {
    /// Context for `id` holding no locks.
    pub const fn new(id: TaskId) -> Self {
        Self {
            id,
            locks: LockTracker::new(),
        }
    }

    /// The task this context belongs to.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Locks currently held.
    pub fn locks(&self) -> &LockTracker {
        &self.locks
    }
}
