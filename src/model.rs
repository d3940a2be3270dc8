/// Snapshot of one process as seen by a single enumeration pass.
///
/// Descriptors are ephemeral: each `ProcessSource::snapshot` call produces a
/// fresh set and the previous one is superseded.
#[derive(Debug, Clone)]
pub struct ProcessDescriptor {
    pub pid: u32,
    pub ppid: u32,
    /// Cumulative CPU time (user + system) consumed since process start,
    /// in milliseconds. Monotonic while the process lives.
    pub cpu_time: u64,
    /// Process start time in backend-specific units (jiffies since boot on
    /// Linux, epoch seconds elsewhere). Only meaningful when comparing two
    /// values from the same backend.
    pub start_time: Option<u64>,
    /// Executable path or argv[0]. Only populated when the filter asks for
    /// it -- reading it costs an extra kernel round-trip per process.
    pub command: Option<String>,
}

/// Selects which processes an enumeration pass produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessFilter {
    /// 0 enumerates every process on the system.
    pub target_pid: u32,
    /// With a nonzero target, also include every transitive descendant.
    pub include_children: bool,
    /// Populate `ProcessDescriptor::command`.
    pub read_command: bool,
}

impl ProcessFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn pid(target_pid: u32) -> Self {
        Self {
            target_pid,
            ..Self::default()
        }
    }

    pub fn tree(target_pid: u32) -> Self {
        Self {
            target_pid,
            include_children: true,
            ..Self::default()
        }
    }

    pub fn with_command(mut self) -> Self {
        self.read_command = true;
        self
    }
}
