//! The throttling feedback loop.
//!
//! Each cycle splits an adaptive time slot into a work slice and a sleep
//! slice according to `workingrate`, the fraction of the slot the group may
//! run. Measured usage above the limit drives the rate down next cycle,
//! usage below drives it up, so the duty cycle converges geometrically onto
//! the target instead of chasing each sample.

use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysinfo::System;
use tracing::debug;

use crate::error::Result;
use crate::group::ProcessGroup;
use crate::quit;

/// Base control-cycle length, microseconds.
pub const BASE_TIME_SLOT_US: f64 = 100_000.0;

const EPS: f64 = 1e-12;
const MAX_SLOT_FACTOR: f64 = 5.0;
const LOAD_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Proportional feedback step for the duty-cycle ratio.
///
/// Unknown usage (no samples yet) seeds the rate at `limit / ncpu`; known
/// usage rescales the current rate by `limit / usage`. The clamp keeps the
/// rate strictly inside (0, 1) so neither slice collapses permanently.
fn adjust_workingrate(current: f64, usage: Option<f64>, limit: f64, ncpu: f64) -> f64 {
    match usage {
        None => (limit / ncpu).clamp(EPS, 1.0 - EPS),
        Some(u) => (current * limit / u.max(EPS)).clamp(EPS, 1.0 - EPS),
    }
}

/// Rescale the time slot from the 1-minute load average. Under heavy
/// external load larger slots cut signal-delivery overhead relative to
/// scheduling granularity; the 0.6/0.4 blend damps oscillation from noisy
/// load samples.
fn blend_time_slot(current_us: f64, load_one: f64, ncpu: f64) -> f64 {
    let candidate = (current_us * (load_one / ncpu) / 0.3)
        .clamp(BASE_TIME_SLOT_US, MAX_SLOT_FACTOR * BASE_TIME_SLOT_US);
    0.6 * current_us + 0.4 * candidate
}

/// Drives one `ProcessGroup`: measure, adjust, SIGSTOP/SIGCONT.
pub struct Limiter {
    group: ProcessGroup,
    /// Target usage as a fraction of one CPU; may exceed 1 on
    /// multi-core machines.
    limit: f64,
    ncpu: f64,
    workingrate: f64,
    time_slot_us: f64,
    sleeping: bool,
    last_load_check: Instant,
}

impl Limiter {
    pub fn new(group: ProcessGroup, limit: f64) -> Self {
        let ncpu = group.ncpu();
        Self {
            group,
            limit,
            ncpu,
            workingrate: (limit / ncpu).clamp(EPS, 1.0 - EPS),
            time_slot_us: BASE_TIME_SLOT_US,
            sleeping: false,
            last_load_check: Instant::now(),
        }
    }

    /// Run until the target group empties or a quit signal is observed.
    /// Whatever the exit reason, every remaining member is resumed before
    /// control returns -- a process must never be left stopped.
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_loop();
        self.resume_all();
        result
    }

    fn run_loop(&mut self) -> Result<()> {
        while !quit::requested() {
            self.group.update()?;
            if self.group.members().is_empty() {
                debug!("target group is empty, stopping");
                break;
            }

            let usage = self.group.aggregate_usage();
            self.workingrate = adjust_workingrate(self.workingrate, usage, self.limit, self.ncpu);
            self.adapt_time_slot();

            let slot = Duration::from_micros(self.time_slot_us as u64);
            let work = Duration::from_micros((self.time_slot_us * self.workingrate) as u64);
            let sleep = slot.saturating_sub(work);
            debug!(
                usage = ?usage,
                workingrate = self.workingrate,
                slot_us = self.time_slot_us as u64,
                members = self.group.members().len(),
                "control cycle"
            );

            if self.sleeping && !work.is_zero() {
                self.signal_members(Signal::SIGCONT);
                self.sleeping = false;
            }
            if !work.is_zero() {
                thread::sleep(work);
            }
            if !sleep.is_zero() {
                if !self.sleeping {
                    self.signal_members(Signal::SIGSTOP);
                    self.sleeping = true;
                }
                thread::sleep(sleep);
            }
        }
        Ok(())
    }

    /// Re-derive the slot length from system load, at most once per second.
    fn adapt_time_slot(&mut self) {
        if self.last_load_check.elapsed() < LOAD_CHECK_INTERVAL {
            return;
        }
        self.last_load_check = Instant::now();
        let load_one = System::load_average().one;
        self.time_slot_us = blend_time_slot(self.time_slot_us, load_one, self.ncpu);
    }

    /// Deliver `sig` to every member. A delivery failure means that process
    /// exited; prune it and carry on with the rest.
    fn signal_members(&mut self, sig: Signal) {
        let members: Vec<u32> = self.group.members().to_vec();
        for pid in members {
            if let Err(errno) = kill(Pid::from_raw(pid as i32), sig) {
                debug!(pid, %errno, "signal failed, pruning member");
                self.group.remove(pid);
            }
        }
    }

    fn resume_all(&mut self) {
        for pid in self.group.members().to_vec() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGCONT);
        }
        self.sleeping = false;
    }
}

impl Drop for Limiter {
    fn drop(&mut self) {
        self.resume_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_usage_seeds_rate_from_limit() {
        let rate = adjust_workingrate(0.9, None, 0.5, 4.0);
        assert!((rate - 0.125).abs() < 1e-9);
    }

    #[test]
    fn overshoot_drives_rate_down() {
        // Running at 0.8 of a CPU against a 0.4 limit halves the rate.
        let rate = adjust_workingrate(0.6, Some(0.8), 0.4, 4.0);
        assert!((rate - 0.3).abs() < 1e-9);
    }

    #[test]
    fn undershoot_drives_rate_up() {
        let rate = adjust_workingrate(0.3, Some(0.2), 0.4, 4.0);
        assert!((rate - 0.6).abs() < 1e-9);
    }

    #[test]
    fn rate_stays_inside_unit_interval() {
        let high = adjust_workingrate(0.9, Some(1e-15), 1.0, 1.0);
        assert!(high < 1.0);
        let low = adjust_workingrate(1e-13, Some(10.0), 1e-12, 1.0);
        assert!(low > 0.0);
    }

    #[test]
    fn feedback_converges_geometrically() {
        // Model a process that always consumes its whole work slice: with
        // measured usage proportional to the rate, the fixed point is the
        // rate whose usage equals the limit.
        let limit = 0.25;
        let ncpu = 1.0;
        let full_speed = 1.0; // usage at workingrate 1.0
        let mut rate = adjust_workingrate(0.0, None, limit, ncpu);
        for _ in 0..20 {
            let usage = full_speed * rate;
            rate = adjust_workingrate(rate, Some(usage), limit, ncpu);
        }
        let steady_usage = full_speed * rate;
        assert!(
            (steady_usage - limit).abs() < 0.01,
            "did not converge: {}",
            steady_usage
        );
    }

    #[test]
    fn idle_load_keeps_slot_at_base() {
        let slot = blend_time_slot(BASE_TIME_SLOT_US, 0.0, 4.0);
        assert!((slot - BASE_TIME_SLOT_US).abs() < 1e-6);
    }

    #[test]
    fn slot_is_clamped_under_extreme_load() {
        let mut slot = BASE_TIME_SLOT_US;
        for _ in 0..100 {
            slot = blend_time_slot(slot, 1000.0, 1.0);
        }
        assert!(slot <= MAX_SLOT_FACTOR * BASE_TIME_SLOT_US + 1e-6);
        assert!(slot >= BASE_TIME_SLOT_US);
    }

    #[test]
    fn slot_moves_gradually() {
        // One noisy load sample shifts the slot by at most 40% of the gap.
        let slot = blend_time_slot(BASE_TIME_SLOT_US, 10.0, 1.0);
        let candidate = MAX_SLOT_FACTOR * BASE_TIME_SLOT_US;
        let expected = 0.6 * BASE_TIME_SLOT_US + 0.4 * candidate;
        assert!((slot - expected).abs() < 1e-6);
    }
}
