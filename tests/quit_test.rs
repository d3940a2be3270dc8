//! End-to-end shutdown behavior: a quit signal must stop the control loop
//! and leave the throttled target running, never stopped.

use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use cpucap::{quit, Limiter, ProcessGroup};

#[cfg(target_os = "linux")]
fn process_state(pid: u32) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // State is the first field after the parenthesized comm.
    let rest = stat.rsplit(')').next()?;
    rest.split_whitespace().next()?.chars().next()
}

#[test]
fn sigint_stops_the_loop_and_resumes_the_target() {
    quit::install().expect("install quit handler");

    let mut child = Command::new("sh")
        .args(["-c", "while :; do :; done"])
        .spawn()
        .expect("spawn spinner");
    let pid = child.id();

    let group = ProcessGroup::open(pid, false).expect("open group");
    let handle = thread::spawn(move || {
        let mut limiter = Limiter::new(group, 0.1);
        limiter.run()
    });

    // Let the limiter reach its stop/continue rhythm, then interrupt
    // ourselves the way a user would.
    thread::sleep(Duration::from_secs(1));
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(std::process::id() as i32),
        nix::sys::signal::Signal::SIGINT,
    )
    .expect("raise SIGINT");

    // Worst-case latency is one time slot; give it a generous margin.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(handle.is_finished(), "limiter ignored the quit flag");
    handle.join().unwrap().expect("limiter run result");
    assert!(quit::requested());

    // The whole point of the shutdown path: the child must not be left
    // SIGSTOPped.
    #[cfg(target_os = "linux")]
    {
        thread::sleep(Duration::from_millis(200));
        let state = process_state(pid).expect("read child state");
        assert_ne!(state, 'T', "child was left stopped after shutdown");
    }

    let _ = child.kill();
    let _ = child.wait();
}
