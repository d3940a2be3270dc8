//! Persistent measurement state for one monitored target.
//!
//! A `ProcessGroup` re-enumerates its target every controller cycle and
//! reconciles the snapshot against a table of per-pid records. Records carry
//! the exponentially smoothed CPU-usage estimate across cycles; a pid that
//! misses one enumeration keeps its history and is only dropped when a
//! signal-delivery failure proves the process is actually gone.

use std::collections::HashMap;
use std::time::Instant;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::debug;

use crate::ancestry;
use crate::error::Result;
use crate::model::ProcessFilter;
use crate::platform::{create_source, num_cpus, ProcessSource};

/// Exponential-moving-average weight for new CPU-usage samples. Biased
/// toward stability: one spiky sample should not swing the duty cycle.
pub const SMOOTHING: f64 = 0.08;

// Deltas below this are dominated by scheduler noise; skip estimation but
// still refresh membership.
const MIN_SAMPLE_INTERVAL_MS: f64 = 20.0;

/// One process's persistent state, owned by the table.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    /// Cumulative CPU time at the last sampled cycle, milliseconds.
    pub cpu_time: u64,
    /// Smoothed fraction of one CPU, None until two samples exist.
    pub cpu_usage: Option<f64>,
}

/// Pid-keyed store of records. The map owns every record; membership lists
/// refer to them by pid.
#[derive(Debug, Default)]
pub struct ProcessTable {
    records: HashMap<u32, ProcessRecord>,
}

impl ProcessTable {
    pub fn find(&self, pid: u32) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    pub fn find_mut(&mut self, pid: u32) -> Option<&mut ProcessRecord> {
        self.records.get_mut(&pid)
    }

    pub fn insert(&mut self, record: ProcessRecord) {
        self.records.insert(record.pid, record);
    }

    pub fn remove(&mut self, pid: u32) -> bool {
        self.records.remove(&pid).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The monitored target: a process, optionally with all its descendants.
pub struct ProcessGroup {
    source: Box<dyn ProcessSource>,
    table: ProcessTable,
    /// Pids found by the most recent enumeration; what the controller
    /// signals this cycle. Always a subset of the table's keys.
    members: Vec<u32>,
    target_pid: u32,
    include_children: bool,
    /// Last cycle whose delta met the minimum sampling interval.
    last_update: Instant,
    ncpu: f64,
}

impl ProcessGroup {
    /// Create the group and run one immediate update to seed the member
    /// list. Usage estimates stay unknown until a second sampled cycle.
    pub fn open(target_pid: u32, include_children: bool) -> Result<Self> {
        Self::with_source(create_source(), target_pid, include_children)
    }

    fn with_source(
        source: Box<dyn ProcessSource>,
        target_pid: u32,
        include_children: bool,
    ) -> Result<Self> {
        let mut group = Self {
            source,
            table: ProcessTable::default(),
            members: Vec::new(),
            target_pid,
            include_children,
            last_update: Instant::now(),
            ncpu: num_cpus() as f64,
        };
        group.update()?;
        Ok(group)
    }

    /// Advance one sampling cycle: enumerate, reconcile, estimate.
    pub fn update(&mut self) -> Result<()> {
        self.update_at(Instant::now())
    }

    fn update_at(&mut self, now: Instant) -> Result<()> {
        let filter = ProcessFilter {
            target_pid: self.target_pid,
            include_children: self.include_children,
            read_command: false,
        };
        let snapshot = self.source.snapshot(&filter)?;

        let dt_ms = now.duration_since(self.last_update).as_secs_f64() * 1000.0;
        let sampled = dt_ms >= MIN_SAMPLE_INTERVAL_MS;

        self.members.clear();
        for descr in snapshot {
            match self.table.find_mut(descr.pid) {
                None => {
                    self.table.insert(ProcessRecord {
                        pid: descr.pid,
                        ppid: descr.ppid,
                        cpu_time: descr.cpu_time,
                        cpu_usage: None,
                    });
                }
                Some(record) => {
                    record.ppid = descr.ppid;
                    if sampled {
                        let delta = descr.cpu_time.saturating_sub(record.cpu_time) as f64;
                        let raw = (delta / dt_ms).clamp(0.0, self.ncpu);
                        record.cpu_usage = Some(match record.cpu_usage {
                            None => raw,
                            Some(prev) => (1.0 - SMOOTHING) * prev + SMOOTHING * raw,
                        });
                        record.cpu_time = descr.cpu_time;
                    }
                    // Below the minimum interval the estimate and stored
                    // cpu_time stay untouched; the pid still counts as a
                    // member this cycle.
                }
            }
            self.members.push(descr.pid);
        }

        if sampled {
            self.last_update = now;
        }
        Ok(())
    }

    /// Sum of the known usage estimates of the current members, or None
    /// when no member has produced an estimate yet (first cycles).
    pub fn aggregate_usage(&self) -> Option<f64> {
        let mut total = None;
        for pid in &self.members {
            if let Some(usage) = self.table.find(*pid).and_then(|r| r.cpu_usage) {
                *total.get_or_insert(0.0) += usage;
            }
        }
        total
    }

    /// Drop a pid from both the membership and the table. Called when a
    /// signal-delivery failure shows the process is gone.
    pub fn remove(&mut self, pid: u32) {
        self.members.retain(|&p| p != pid);
        if self.table.remove(pid) {
            debug!(pid, "removed exited process from group");
        }
    }

    pub fn members(&self) -> &[u32] {
        &self.members
    }

    pub fn record(&self, pid: u32) -> Option<&ProcessRecord> {
        self.table.find(pid)
    }

    pub fn ncpu(&self) -> f64 {
        self.ncpu
    }
}

// ---------------------------------------------------------------------------
// Target lookup primitives
// ---------------------------------------------------------------------------

/// Result of probing a pid with the null signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessProbe {
    /// Exists and is signalable by this user.
    Alive,
    /// No such process.
    Dead,
    /// Exists but we lack permission to signal it.
    Forbidden,
}

/// Existence check without side effects: signal 0 reports delivery
/// permission without delivering anything.
///
/// Pid 0 and values that would wrap negative in kill(2) address whole
/// process groups rather than a single process; no such target can exist,
/// so they probe as dead instead of being passed to the kernel.
pub fn find_by_pid(pid: u32) -> ProcessProbe {
    if pid == 0 || pid > i32::MAX as u32 {
        return ProcessProbe::Dead;
    }
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => ProcessProbe::Alive,
        Err(Errno::EPERM) => ProcessProbe::Forbidden,
        Err(_) => ProcessProbe::Dead,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameLookup {
    Found(u32),
    /// A process matched but cannot be signaled by this user.
    Forbidden(u32),
    NotFound,
}

/// Find a process by executable name: full-path comparison when `name` is
/// absolute, basename comparison otherwise. When several pids match and one
/// descends from another match, the descendant wins -- shells that wrap and
/// then exec the real binary leave both in the table briefly.
pub fn find_by_name(name: &str) -> Result<NameLookup> {
    let source = create_source();
    find_by_name_in(&*source, name)
}

fn find_by_name_in(source: &dyn ProcessSource, name: &str) -> Result<NameLookup> {
    let snapshot = source.snapshot(&ProcessFilter::all().with_command())?;
    let absolute = name.starts_with('/');

    let mut matches: Vec<u32> = Vec::new();
    for descr in &snapshot {
        let Some(command) = descr.command.as_deref() else {
            continue;
        };
        let hit = if absolute {
            command == name
        } else {
            basename(command) == basename(name)
        };
        if hit {
            matches.push(descr.pid);
        }
    }

    let Some(mut best) = matches.first().copied() else {
        return Ok(NameLookup::NotFound);
    };
    for &candidate in &matches[1..] {
        if ancestry::is_descendant_of(source, candidate, best) {
            best = candidate;
        }
    }

    Ok(match find_by_pid(best) {
        ProcessProbe::Alive => NameLookup::Found(best),
        ProcessProbe::Forbidden => NameLookup::Forbidden(best),
        ProcessProbe::Dead => NameLookup::NotFound,
    })
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
