use clap::{ArgGroup, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "cpucap",
    version,
    about = "Throttle the CPU usage of a running process via SIGSTOP/SIGCONT duty cycling"
)]
#[command(group(ArgGroup::new("target").required(true).args(["pid", "exe"])))]
pub struct CliArgs {
    /// CPU limit as a percentage of one core (may exceed 100 on multi-core systems)
    #[arg(short = 'l', long = "limit", value_name = "PERCENT")]
    pub limit: f64,

    /// Target process ID
    #[arg(short = 'p', long = "pid", value_name = "PID")]
    pub pid: Option<u32>,

    /// Target executable name, or absolute path for an exact match
    #[arg(short = 'e', long = "exe", value_name = "NAME")]
    pub exe: Option<String>,

    /// Also throttle the target's descendants
    #[arg(short = 'i', long = "include-children")]
    pub include_children: bool,

    /// Exit instead of waiting when no matching target exists
    #[arg(short = 'z', long = "lazy")]
    pub lazy: bool,

    /// Verbose progress output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl CliArgs {
    /// Validated target pid: positive and within the kernel's signed pid
    /// range. Pid 0 and negative (wrapped) values address whole process
    /// groups in kill(2), which must never reach the limiter.
    pub fn target_pid(&self) -> Result<Option<u32>, String> {
        match self.pid {
            None => Ok(None),
            Some(0) => Err("PID must be positive".to_string()),
            Some(pid) if pid > i32::MAX as u32 => {
                Err(format!("PID {} is out of range", pid))
            }
            Some(pid) => Ok(Some(pid)),
        }
    }

    /// Validated limit as a fraction of one CPU (0.5 = half a core).
    pub fn limit_fraction(&self, ncpu: usize) -> Result<f64, String> {
        let max_percent = 100.0 * ncpu as f64;
        if !self.limit.is_finite() || self.limit <= 0.0 || self.limit > max_percent {
            return Err(format!(
                "limit must be within (0, {}] percent, got {}",
                max_percent, self.limit
            ));
        }
        Ok(self.limit / 100.0)
    }
}
