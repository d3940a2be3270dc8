//! cpucap -- throttle the CPU usage of a running process.
//!
//! Periodically suspends and resumes a target process (and optionally its
//! descendants) with SIGSTOP/SIGCONT, at a duty cycle derived from live
//! CPU-usage measurement. The target program is never modified.
//!
//! - [`platform`] -- per-OS process enumeration behind one trait
//! - [`ancestry`] -- parent-chain walking with a pid-reuse guard
//! - [`group`] -- persistent per-pid usage records for one target
//! - [`controller`] -- the feedback loop emitting the signals
//! - [`quit`] -- process-wide SIGINT/SIGTERM flag

pub mod ancestry;
pub mod cli;
pub mod controller;
pub mod error;
pub mod group;
pub mod model;
pub mod platform;
pub mod quit;

pub use controller::Limiter;
pub use error::{CpucapError, Result};
pub use group::{find_by_name, find_by_pid, NameLookup, ProcessGroup, ProcessProbe};
pub use model::{ProcessDescriptor, ProcessFilter};
pub use platform::{create_source, num_cpus, ProcessSource};
