use super::ProcessSource;
use crate::ancestry;
use crate::error::{CpucapError, Result};
use crate::model::{ProcessDescriptor, ProcessFilter};

use libproc::libproc::proc_pid::{listpids, pidinfo, pidpath, ProcType};
use libproc::libproc::task_info::TaskAllInfo;

// pbi_status value for a zombie, from <sys/proc.h>.
const SZOMB: u32 = 5;

/// Read one descriptor via proc_pidinfo. Returns None for zombies and for
/// pids that exited (or became unreadable) after the bulk listing.
fn read_descriptor(pid: u32, read_command: bool) -> Option<ProcessDescriptor> {
    let info = pidinfo::<TaskAllInfo>(pid as i32, 0).ok()?;
    if info.pbsd.pbi_status == SZOMB {
        return None;
    }

    // ptinfo times are nanoseconds of user+system CPU.
    let cpu_ns = info.ptinfo.pti_total_user + info.ptinfo.pti_total_system;

    let command = if read_command {
        pidpath(pid as i32).ok()
    } else {
        None
    };

    Some(ProcessDescriptor {
        pid,
        ppid: info.pbsd.pbi_ppid,
        cpu_time: cpu_ns / 1_000_000,
        start_time: Some(info.pbsd.pbi_start_tvsec),
        command,
    })
}

pub struct MacosSource;

impl MacosSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacosSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for MacosSource {
    fn snapshot(&self, filter: &ProcessFilter) -> Result<Vec<ProcessDescriptor>> {
        if filter.target_pid != 0 && !filter.include_children {
            return Ok(read_descriptor(filter.target_pid, filter.read_command)
                .into_iter()
                .collect());
        }

        // One bulk pid listing, then a per-pid info query for each entry.
        let pids = listpids(ProcType::ProcAllPIDS)
            .map_err(|e| CpucapError::Platform(e.to_string()))?;

        let mut out = Vec::new();
        for pid in pids {
            if pid == 0 {
                continue; // kernel_task placeholder entries
            }
            let descr = match read_descriptor(pid, filter.read_command) {
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
        pidinfo::<TaskAllInfo>(pid as i32, 0)
            .map(|info| info.pbsd.pbi_ppid)
            .map_err(|_| CpucapError::ProcessNotFound(pid))
    }

    fn start_time(&self, pid: u32) -> Option<u64> {
        pidinfo::<TaskAllInfo>(pid as i32, 0)
            .ok()
            .map(|info| info.pbsd.pbi_start_tvsec)
    }
}
