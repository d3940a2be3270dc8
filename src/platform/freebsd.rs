use super::ProcessSource;
use crate::ancestry;
use crate::error::{CpucapError, Result};
use crate::model::{ProcessDescriptor, ProcessFilter};

use std::ffi::CStr;
use std::mem;
use std::os::raw::c_void;
use std::ptr;

// ki_stat value for a zombie, from <sys/proc.h>.
const SZOMB: u8 = 5;

// MAXPATHLEN on FreeBSD.
const MAXPATHLEN: usize = 1024;

/// Fetch the whole kernel process table in one bulk sysctl call.
///
/// The size probe and the data read race against process churn, so the
/// buffer is padded and the call retried once if the table grew in between.
fn kinfo_all() -> Result<Vec<libc::kinfo_proc>> {
    let name = [libc::CTL_KERN, libc::KERN_PROC, libc::KERN_PROC_PROC];
    let entry_size = mem::size_of::<libc::kinfo_proc>();

    for _ in 0..2 {
        let mut size: libc::size_t = 0;
        // SAFETY: size probe with a null output buffer is the documented
        // sysctl calling convention.
        let ret = unsafe {
            libc::sysctl(
                name.as_ptr(),
                name.len() as libc::c_uint,
                ptr::null_mut(),
                &mut size,
                ptr::null(),
                0,
            )
        };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        // Leave headroom for processes spawned between the two calls.
        let capacity = size as usize / entry_size + 16;
        let mut buf: Vec<libc::kinfo_proc> = Vec::with_capacity(capacity);
        let mut len: libc::size_t = (capacity * entry_size) as libc::size_t;

        // SAFETY: buf has room for `len` bytes of kinfo_proc entries; the
        // kernel writes back how many bytes it actually filled.
        let ret = unsafe {
            libc::sysctl(
                name.as_ptr(),
                name.len() as libc::c_uint,
                buf.as_mut_ptr() as *mut c_void,
                &mut len,
                ptr::null(),
                0,
            )
        };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOMEM) {
                continue; // table grew past our headroom, retry
            }
            return Err(err.into());
        }

        // SAFETY: the kernel filled `len` bytes with whole entries.
        unsafe { buf.set_len(len as usize / entry_size) };
        return Ok(buf);
    }

    Err(CpucapError::Platform(
        "kern.proc table kept growing during read".to_string(),
    ))
}

/// Fetch a single kinfo_proc entry, or None if the pid is gone.
fn kinfo_pid(pid: u32) -> Option<libc::kinfo_proc> {
    let name = [
        libc::CTL_KERN,
        libc::KERN_PROC,
        libc::KERN_PROC_PID,
        pid as libc::c_int,
    ];
    // SAFETY: fixed-size single-entry read; zeroed kinfo_proc is valid.
    unsafe {
        let mut info: libc::kinfo_proc = mem::zeroed();
        let mut len = mem::size_of::<libc::kinfo_proc>() as libc::size_t;
        let ret = libc::sysctl(
            name.as_ptr(),
            name.len() as libc::c_uint,
            &mut info as *mut libc::kinfo_proc as *mut c_void,
            &mut len,
            ptr::null(),
            0,
        );
        if ret != 0 || len == 0 {
            None
        } else {
            Some(info)
        }
    }
}

/// Resolve the executable path via kern.proc.pathname, falling back to the
/// in-kernel command name when the binary was deleted or is inaccessible.
fn command_for(pid: u32, info: &libc::kinfo_proc) -> Option<String> {
    let name = [
        libc::CTL_KERN,
        libc::KERN_PROC,
        libc::KERN_PROC_PATHNAME,
        pid as libc::c_int,
    ];
    let mut buf = [0i8; MAXPATHLEN];
    let mut len = buf.len() as libc::size_t;
    // SAFETY: buffer is MAXPATHLEN bytes; the kernel NUL-terminates.
    let ret = unsafe {
        libc::sysctl(
            name.as_ptr(),
            name.len() as libc::c_uint,
            buf.as_mut_ptr() as *mut c_void,
            &mut len,
            ptr::null(),
            0,
        )
    };
    if ret == 0 && buf[0] != 0 {
        // SAFETY: NUL-terminated by the kernel within MAXPATHLEN.
        let path = unsafe { CStr::from_ptr(buf.as_ptr()) };
        return Some(path.to_string_lossy().into_owned());
    }

    // SAFETY: ki_comm is a NUL-terminated fixed-size array.
    let comm = unsafe { CStr::from_ptr(info.ki_comm.as_ptr()) };
    Some(comm.to_string_lossy().into_owned())
}

fn descriptor_from(info: &libc::kinfo_proc, read_command: bool) -> Option<ProcessDescriptor> {
    if info.ki_stat as u8 == SZOMB || info.ki_pid <= 0 {
        return None;
    }
    let pid = info.ki_pid as u32;
    Some(ProcessDescriptor {
        pid,
        ppid: info.ki_ppid as u32,
        // ki_runtime is total user+system time in microseconds.
        cpu_time: info.ki_runtime / 1000,
        start_time: Some(info.ki_start.tv_sec as u64),
        command: if read_command {
            command_for(pid, info)
        } else {
            None
        },
    })
}

pub struct FreebsdSource;

impl FreebsdSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FreebsdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for FreebsdSource {
    fn snapshot(&self, filter: &ProcessFilter) -> Result<Vec<ProcessDescriptor>> {
        if filter.target_pid != 0 && !filter.include_children {
            return Ok(kinfo_pid(filter.target_pid)
                .and_then(|info| descriptor_from(&info, filter.read_command))
                .into_iter()
                .collect());
        }

        let table = kinfo_all()?;
        let mut out = Vec::new();
        for info in &table {
            let descr = match descriptor_from(info, filter.read_command) {
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
        kinfo_pid(pid)
            .map(|info| info.ki_ppid as u32)
            .ok_or(CpucapError::ProcessNotFound(pid))
    }

    fn start_time(&self, pid: u32) -> Option<u64> {
        kinfo_pid(pid).map(|info| info.ki_start.tv_sec as u64)
    }
}
