use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

use cpucap::ancestry::is_descendant_of;
use cpucap::{
    create_source, find_by_name, find_by_pid, NameLookup, ProcessGroup, ProcessProbe,
    ProcessSource,
};

fn kill_tree(group: &mut ProcessGroup, child: &mut Child) {
    let _ = group.update();
    for pid in group.members().to_vec() {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGKILL,
        );
    }
    let _ = child.kill();
    let _ = child.wait();
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[test]
fn self_group_has_exactly_one_member() {
    let my_pid = std::process::id();
    let group = ProcessGroup::open(my_pid, false).expect("open group on self");

    assert_eq!(group.members(), &[my_pid]);

    let record = group.record(my_pid).expect("record for self");
    let parent = create_source().parent_pid(my_pid).expect("own parent pid");
    assert_eq!(record.pid, my_pid);
    assert_eq!(record.ppid, parent);
    // No second sample yet: the estimate must still be unknown.
    assert_eq!(record.cpu_usage, None);
}

#[test]
fn child_tree_excludes_the_parent() {
    // sh plus one background sleep: exactly two members, never us.
    let mut child = Command::new("sh")
        .args(["-c", "sleep 30 & wait"])
        .spawn()
        .expect("spawn child tree");
    let root = child.id();

    let mut group = ProcessGroup::open(root, true).expect("open tree group");

    // Give the shell a moment to fork the sleep.
    let deadline = Instant::now() + Duration::from_secs(3);
    while group.members().len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
        group.update().expect("update tree group");
    }

    let members = group.members().to_vec();
    assert_eq!(members.len(), 2, "expected shell + sleep, got {:?}", members);
    assert!(members.contains(&root));
    assert!(!members.contains(&std::process::id()));

    let source = create_source();
    for &pid in &members {
        assert!(
            pid == root || is_descendant_of(&*source, pid, root),
            "pid {} is not part of the tree rooted at {}",
            pid,
            root
        );
    }

    kill_tree(&mut group, &mut child);
}

// ---------------------------------------------------------------------------
// Ancestry
// ---------------------------------------------------------------------------

#[test]
fn self_is_descendant_of_init_but_not_of_self() {
    let source = create_source();
    let my_pid = std::process::id();
    assert!(is_descendant_of(&*source, my_pid, 1));
    assert!(!is_descendant_of(&*source, my_pid, my_pid));
}

#[test]
fn spawned_child_descends_from_us() {
    let mut child = Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep");
    let source = create_source();

    assert!(is_descendant_of(&*source, child.id(), std::process::id()));
    assert!(!is_descendant_of(&*source, std::process::id(), child.id()));

    let _ = child.kill();
    let _ = child.wait();
}

// ---------------------------------------------------------------------------
// Lookup primitives
// ---------------------------------------------------------------------------

#[test]
fn find_by_pid_probes_existence() {
    assert_eq!(find_by_pid(std::process::id()), ProcessProbe::Alive);
    // Far beyond any default pid_max.
    assert_eq!(find_by_pid(99_999_999), ProcessProbe::Dead);
}

#[test]
fn find_by_pid_never_probes_process_groups() {
    // kill(0) would probe our own process group and report it alive;
    // pids beyond i32::MAX wrap negative and address groups the same way.
    assert_eq!(find_by_pid(0), ProcessProbe::Dead);
    assert_eq!(find_by_pid(u32::MAX), ProcessProbe::Dead);
    assert_eq!(find_by_pid(i32::MAX as u32 + 1), ProcessProbe::Dead);
}

#[test]
fn find_by_name_locates_spawned_binary() {
    let mut child = Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep");

    match find_by_name("sleep").expect("enumerate for name lookup") {
        NameLookup::Found(pid) => {
            assert_eq!(find_by_pid(pid), ProcessProbe::Alive);
        }
        other => panic!("expected to find a sleep process, got {:?}", other),
    }

    let _ = child.kill();
    let _ = child.wait();

    match find_by_name("surely-no-such-binary-name").expect("lookup") {
        NameLookup::NotFound => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}
