use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cpucap::cli::CliArgs;
use cpucap::error::{CpucapError, Result};
use cpucap::{find_by_name, find_by_pid, num_cpus, quit, Limiter, NameLookup, ProcessGroup, ProcessProbe};

// How long to wait between lookups while the target does not exist yet.
const RESCAN_INTERVAL: Duration = Duration::from_secs(2);

fn main() {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "cpucap=debug" } else { "cpucap=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(args: CliArgs) -> Result<()> {
    let ncpu = num_cpus();
    let limit = args.limit_fraction(ncpu).map_err(CpucapError::InvalidLimit)?;
    // Reject pid 0 and wrapping values before anything can signal them.
    args.target_pid().map_err(CpucapError::InvalidPid)?;
    quit::install()?;

    loop {
        if quit::requested() {
            return Ok(());
        }

        match resolve_target(&args)? {
            Some(pid) => {
                info!(pid, limit, include_children = args.include_children, "throttling");
                let group = ProcessGroup::open(pid, args.include_children)?;
                Limiter::new(group, limit).run()?;
                // Target exited (or quit was requested). A pid target is a
                // one-shot; a name target may come back unless we are lazy.
                if quit::requested() || args.lazy || args.exe.is_none() {
                    return Ok(());
                }
            }
            None if args.lazy => {
                return Err(match args.pid {
                    Some(pid) => CpucapError::ProcessNotFound(pid),
                    None => CpucapError::Platform(format!(
                        "no process matching '{}'",
                        args.exe.as_deref().unwrap_or_default()
                    )),
                });
            }
            None => std::thread::sleep(RESCAN_INTERVAL),
        }
    }
}

/// Resolve the CLI target to a live pid, or None if it does not exist yet.
fn resolve_target(args: &CliArgs) -> Result<Option<u32>> {
    if let Some(pid) = args.pid {
        return match find_by_pid(pid) {
            ProcessProbe::Alive => Ok(Some(pid)),
            ProcessProbe::Dead => Ok(None),
            ProcessProbe::Forbidden => Err(CpucapError::PermissionDenied(format!(
                "cannot signal PID {}",
                pid
            ))),
        };
    }

    // clap's target group guarantees exe is set when pid is not.
    let name = args.exe.as_deref().unwrap_or_default();
    match find_by_name(name)? {
        NameLookup::Found(pid) => Ok(Some(pid)),
        NameLookup::NotFound => Ok(None),
        NameLookup::Forbidden(pid) => Err(CpucapError::PermissionDenied(format!(
            "found '{}' as PID {} but cannot signal it",
            name, pid
        ))),
    }
}
