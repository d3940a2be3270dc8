use super::ProcessSource;
use crate::ancestry;
use crate::error::{CpucapError, Result};
use crate::model::{ProcessDescriptor, ProcessFilter};

use procfs::process::Process;

/// Convert utime+stime (clock ticks) into milliseconds.
fn ticks_to_ms(ticks: u64) -> u64 {
    let tps = procfs::ticks_per_second().max(1);
    ticks.saturating_mul(1000) / tps
}

/// Read one descriptor from /proc. Returns None for zombies, dead
/// processes, and pids that vanished mid-read.
fn read_descriptor(proc: &Process, read_command: bool) -> Option<ProcessDescriptor> {
    let stat = proc.stat().ok()?;
    if stat.state == 'Z' || stat.state == 'X' {
        return None;
    }

    let command = if read_command {
        // exe() is the resolved binary path but needs ptrace-level access;
        // fall back to argv[0], then the kernel's comm field.
        proc.exe()
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| proc.cmdline().ok().and_then(|c| c.into_iter().next()))
            .or_else(|| Some(stat.comm.clone()))
    } else {
        None
    };

    Some(ProcessDescriptor {
        pid: stat.pid as u32,
        ppid: stat.ppid as u32,
        cpu_time: ticks_to_ms(stat.utime + stat.stime),
        start_time: Some(stat.starttime),
        command,
    })
}

pub struct LinuxSource;

impl LinuxSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for LinuxSource {
    fn snapshot(&self, filter: &ProcessFilter) -> Result<Vec<ProcessDescriptor>> {
        // Exact-pid mode: a single targeted read, empty when the pid is gone.
        if filter.target_pid != 0 && !filter.include_children {
            let descr = Process::new(filter.target_pid as i32)
                .ok()
                .and_then(|p| read_descriptor(&p, filter.read_command));
            return Ok(descr.into_iter().collect());
        }

        let all = procfs::process::all_processes()
            .map_err(|e| CpucapError::Platform(e.to_string()))?;

        let mut out = Vec::new();
        for proc_result in all {
            let proc = match proc_result {
                Ok(p) => p,
                Err(_) => continue, // vanished between listing and open
            };
            let descr = match read_descriptor(&proc, filter.read_command) {
                Some(d) => d,
                None => continue,
            };
            if filter.target_pid != 0
                && descr.pid != filter.target_pid
                && !ancestry::is_descendant_of(self, descr.pid, filter.target_pid)
            {
                continue;
            }
            out.push(descr);
        }

        Ok(out)
    }

    fn parent_pid(&self, pid: u32) -> Result<u32> {
        let proc = Process::new(pid as i32)
            .map_err(|_| CpucapError::ProcessNotFound(pid))?;
        let stat = proc
            .stat()
            .map_err(|_| CpucapError::ProcessNotFound(pid))?;
        Ok(stat.ppid as u32)
    }

    fn start_time(&self, pid: u32) -> Option<u64> {
        let proc = Process::new(pid as i32).ok()?;
        proc.stat().ok().map(|s| s.starttime)
    }
}
