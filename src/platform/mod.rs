use crate::error::Result;
use crate::model::{ProcessDescriptor, ProcessFilter};

/// Platform-specific view of the live process table.
///
/// `snapshot` is a one-shot enumeration: every call re-reads the kernel's
/// process table and returns a fresh set of descriptors. A pid that vanishes
/// between listing and detail read is silently skipped; only failures to open
/// the enumeration itself are reported.
pub trait ProcessSource: Send + Sync {
    fn snapshot(&self, filter: &ProcessFilter) -> Result<Vec<ProcessDescriptor>>;

    /// Immediate parent of `pid`, or an error if the pid cannot be read.
    fn parent_pid(&self, pid: u32) -> Result<u32>;

    /// Start time of `pid` in the backend's native units, used by the
    /// ancestry walk to detect pid reuse. None when unreadable.
    fn start_time(&self, pid: u32) -> Option<u64>;
}

/// Number of logical CPUs, never less than one.
pub fn num_cpus() -> usize {
    use sysinfo::{CpuRefreshKind, RefreshKind, System};
    let sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    sys.cpus().len().max(1)
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "freebsd")]
mod freebsd;

pub fn create_source() -> Box<dyn ProcessSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxSource::new())
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacosSource::new())
    }
    #[cfg(target_os = "freebsd")]
    {
        Box::new(freebsd::FreebsdSource::new())
    }
}
